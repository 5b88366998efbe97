//! Library workflows end to end against the in-memory application

mod common;

use common::{config, FakeLibrary, FakeOptions};
use shelfwalk_e2e::library::{self, BookFixture, RunTag, SEEDED_PATRON, SEEDED_TITLE};
use shelfwalk_e2e::{ErrorKind, StepStatus, TestSuite};

fn suite(fake: &FakeLibrary, output: &std::path::Path) -> TestSuite {
    TestSuite::new(config(output), fake.factory())
}

#[tokio::test(start_paused = true)]
async fn add_book_round_trip_appears_in_catalog() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();
    let suite = suite(&fake, dir.path());

    let result = suite.run_one(&library::add_book(&BookFixture::gatsby())).await;

    assert!(result.passed(), "{:?}", result.verdict);
    assert!(result.steps.iter().all(|s| s.status == StepStatus::Passed));

    let state = fake.state.lock();
    let book = state.find("The Great Gatsby").expect("book stored");
    assert_eq!(book.author, "F. Scott Fitzgerald");
    assert_eq!(book.isbn, "9780743273565");
    assert_eq!(book.total, 3);
}

#[tokio::test(start_paused = true)]
async fn borrow_confirms_and_leaves_other_rows_alone() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();
    let suite = suite(&fake, dir.path());

    let result = suite
        .run_one(&library::borrow_book(SEEDED_TITLE, SEEDED_PATRON))
        .await;
    assert!(result.passed(), "{:?}", result.verdict);

    let state = fake.state.lock();
    assert_eq!(state.borrows, vec![(SEEDED_PATRON.to_string(), 1)]);
    assert_eq!(state.find(SEEDED_TITLE).unwrap().available, 2);
    assert_eq!(state.find("1984").unwrap().available, 2);
    assert_eq!(state.find("Pride and Prejudice").unwrap().available, 1);
}

#[tokio::test(start_paused = true)]
async fn journey_uses_fresh_data_each_run() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();
    let suite = suite(&fake, dir.path());

    let first = BookFixture::unique(&RunTag::next());
    let second = BookFixture::unique(&RunTag::next());
    assert_ne!(first.isbn, second.isbn);

    for book in [&first, &second] {
        let result = suite.run_one(&library::user_journey(book)).await;
        assert!(result.passed(), "{:?}", result.verdict);
    }

    let state = fake.state.lock();
    assert_eq!(state.find(&first.title).unwrap().available, 0);
    assert_eq!(state.find(&second.title).unwrap().available, 0);
}

#[tokio::test(start_paused = true)]
async fn ui_elements_visible_on_every_page() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();

    let result = suite(&fake, dir.path()).run_one(&library::ui_elements()).await;
    assert!(result.passed(), "{:?}", result.verdict);
}

#[tokio::test(start_paused = true)]
async fn missing_nav_item_fails_naming_it() {
    let fake = FakeLibrary::with_options(FakeOptions {
        hidden_nav: vec![library::NAV_RETURN.to_string()],
        ..Default::default()
    });
    let dir = tempfile::tempdir().unwrap();

    let result = suite(&fake, dir.path()).run_one(&library::ui_elements()).await;

    let failure = result.verdict.failure().expect("scenario must fail");
    assert_eq!(failure.kind, ErrorKind::AssertionFailure);
    assert!(failure.reason.contains("Return Book"), "{}", failure.reason);
    assert_eq!(failure.step_index, Some(4));
    assert!(failure.elapsed_ms >= 15_000);

    assert_eq!(result.steps[4].status, StepStatus::Failed);
    assert!(result.steps[5..].iter().all(|s| s.status == StepStatus::Skipped));
}

#[tokio::test(start_paused = true)]
async fn duplicate_isbn_surfaces_as_assertion_failure_with_banner() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();
    let suite = suite(&fake, dir.path());
    let scenario = library::add_book(&BookFixture::gatsby());

    assert!(suite.run_one(&scenario).await.passed());
    let second = suite.run_one(&scenario).await;

    let failure = second.verdict.failure().expect("duplicate must fail");
    assert_eq!(failure.kind, ErrorKind::AssertionFailure);
    assert!(failure.reason.contains(".flash-success"));
    assert_eq!(failure.snapshot.url.as_deref(), Some("http://localhost:5000/add_book"));
    assert_eq!(
        failure.snapshot.banners,
        vec!["A book with this ISBN already exists.".to_string()]
    );
    let shot = failure.snapshot.screenshot.as_ref().expect("screenshot captured");
    assert!(shot.starts_with(dir.path().join("screenshots")));
    assert!(shot.exists());
}

#[tokio::test(start_paused = true)]
async fn builtin_suite_passes_in_registration_order() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();
    let mut suite = suite(&fake, dir.path());
    suite.register_all(library::builtin_scenarios()).unwrap();

    let report = suite.run().await;

    assert_eq!(report.total, 4);
    assert!(report.all_passed(), "{:?}", report.failures().collect::<Vec<_>>());
    let names: Vec<_> = report.scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "add_book_and_verify_catalog",
            "borrow_book_workflow",
            "complete_user_journey",
            "ui_elements_visibility",
        ]
    );
    assert_eq!(fake.stats.opened(), 4);
    assert_eq!(fake.stats.closed(), 4);
}

#[tokio::test(start_paused = true)]
async fn builtin_suite_passes_again_against_the_same_library() {
    let fake = FakeLibrary::new();
    let dir = tempfile::tempdir().unwrap();

    for run in 1..=2 {
        let mut suite = suite(&fake, dir.path());
        suite.register_all(library::builtin_scenarios()).unwrap();
        let report = suite.run().await;
        assert!(
            report.all_passed(),
            "run {}: {:?}",
            run,
            report.failures().collect::<Vec<_>>()
        );
    }

    let state = fake.state.lock();
    let added = state
        .books
        .iter()
        .filter(|b| b.title.starts_with("Catalog Test Book"))
        .count();
    assert_eq!(added, 2);
}
