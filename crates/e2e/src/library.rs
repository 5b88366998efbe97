//! Built-in scenarios for the library management application
//!
//! Routes: `/` (home with navigation), `/add_book`, `/catalog` (table with a
//! per-row borrow form) and `/return`. Outcomes are reported in a
//! `.flash-success` banner.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::spec::{Locator, Scenario, TextPattern};

pub const FLASH_SUCCESS: &str = ".flash-success";
/// Navigation link texts
pub const NAV_ADD_BOOK: &str = "➕ Add Book";
pub const NAV_CATALOG: &str = "📖 Catalog";
pub const NAV_RETURN: &str = "↩️ Return Book";
pub const SUBMIT: &str = "button[type='submit']";
pub const BORROW_BUTTON: &str = "button:has-text('Borrow')";

/// Seeded book the borrow scenario relies on
pub const SEEDED_TITLE: &str = "To Kill a Mockingbird";
pub const SEEDED_PATRON: &str = "123456";

const ADDED: &str = "success|added";
const BORROWED: &str = "success|borrowed";

fn input(name: &str) -> Locator {
    Locator::css(format!("input[name='{}']", name))
}

fn nav(label: &str) -> Locator {
    Locator::text(label)
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Six-digit suffix unique within this process and, in practice, across runs
///
/// Derived from the wall clock plus an in-process counter so two scenarios
/// created in the same millisecond still differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTag(String);

impl RunTag {
    pub fn next() -> Self {
        let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
        let counter = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        RunTag(format!("{:06}", millis.wrapping_add(counter) % 1_000_000))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Values entered in the add-book form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFixture {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub total_copies: String,
    /// Patron who borrows the book in the journey
    pub patron_id: String,
}

impl BookFixture {
    pub fn gatsby() -> Self {
        Self {
            title: "The Great Gatsby".to_string(),
            author: "F. Scott Fitzgerald".to_string(),
            isbn: "9780743273565".to_string(),
            total_copies: "3".to_string(),
            patron_id: SEEDED_PATRON.to_string(),
        }
    }

    pub fn unique(tag: &RunTag) -> Self {
        let id = tag.as_str();
        Self {
            title: format!("Journey Test Book {}", id),
            author: format!("Journey Author {}", id),
            isbn: format!("978{}0000", id),
            total_copies: "1".to_string(),
            // Patron IDs are exactly six digits
            patron_id: format!("99{}", &id[id.len() - 4..]),
        }
    }

    /// Book the add-book scenario creates; differs from the journey's by prefix
    pub fn catalog_entry(tag: &RunTag) -> Self {
        let id = tag.as_str();
        Self {
            title: format!("Catalog Test Book {}", id),
            author: format!("Catalog Author {}", id),
            isbn: format!("979{}0000", id),
            total_copies: "3".to_string(),
            patron_id: SEEDED_PATRON.to_string(),
        }
    }
}

fn fill_book_form(scenario: Scenario, book: &BookFixture) -> Scenario {
    scenario
        .fill(input("title"), &book.title)
        .fill(input("author"), &book.author)
        .fill(input("isbn"), &book.isbn)
        .fill(input("total_copies"), &book.total_copies)
        .click(Locator::css(SUBMIT))
        .settle()
}

fn borrow_from_row(scenario: Scenario, title: &str, patron_id: &str) -> Scenario {
    scenario
        .fill(input("patron_id").within_row("tr", title), patron_id)
        .click(Locator::css(BORROW_BUTTON).within_row("tr", title))
        .settle()
        .assert_visible(Locator::css(FLASH_SUCCESS))
        .assert_text(Locator::css(FLASH_SUCCESS), TextPattern::regex(BORROWED))
}

/// Add a book through the form and find it in the catalog
pub fn add_book(book: &BookFixture) -> Scenario {
    let scenario = Scenario::new(
        "add_book_and_verify_catalog",
        "Add a new book, then verify it appears in the catalog",
    )
    .tag("library")
    .tag("catalog")
    .navigate("/")
    .settle()
    .click(nav(NAV_ADD_BOOK))
    .settle();

    fill_book_form(scenario, book)
        .assert_visible(Locator::css(FLASH_SUCCESS))
        .assert_text(Locator::css(FLASH_SUCCESS), TextPattern::regex(ADDED))
        .click(nav(NAV_CATALOG))
        .settle()
        .assert_visible(Locator::css("table"))
        .assert_text(Locator::css("tbody"), TextPattern::literal(&book.title))
        .assert_text(Locator::css("tbody"), TextPattern::literal(&book.author))
        .assert_text(Locator::css("tbody"), TextPattern::literal(&book.isbn))
        .assert_row(&book.title, [&book.author, &book.isbn])
}

/// Borrow a seeded book from its catalog row
pub fn borrow_book(title: &str, patron_id: &str) -> Scenario {
    let scenario = Scenario::new(
        "borrow_book_workflow",
        "Borrow a book from its catalog row and expect a confirmation",
    )
    .tag("library")
    .tag("borrow")
    .navigate("/catalog")
    .settle()
    .assert_visible(Locator::css("table"))
    .assert_visible(Locator::css("tbody"))
    .assert_visible(Locator::css(format!("tr:has-text('{}')", title)).first());

    borrow_from_row(scenario, title, patron_id)
}

/// Add, verify and borrow a freshly created book
pub fn user_journey(book: &BookFixture) -> Scenario {
    let scenario = Scenario::new(
        "complete_user_journey",
        "Add a uniquely named book, find it in the catalog and borrow it",
    )
    .tag("library")
    .tag("journey")
    .navigate("/add_book")
    .settle();

    let scenario = fill_book_form(scenario, book)
        .navigate("/catalog")
        .settle()
        .assert_visible(Locator::css("table"))
        .assert_text(Locator::css("tbody"), TextPattern::literal(&book.title))
        .assert_text(Locator::css("tbody"), TextPattern::literal(&book.author));

    borrow_from_row(scenario, &book.title, &book.patron_id)
}

/// Every page shows the controls users need
pub fn ui_elements() -> Scenario {
    Scenario::new(
        "ui_elements_visibility",
        "Navigation, add-book form, return form and catalog controls are visible",
    )
    .tag("library")
    .tag("ui")
    .navigate("/")
    .settle()
    .assert_visible(nav(NAV_ADD_BOOK))
    .assert_visible(nav(NAV_CATALOG))
    .assert_visible(nav(NAV_RETURN))
    .click(nav(NAV_ADD_BOOK))
    .settle()
    .assert_visible(input("title"))
    .assert_visible(input("author"))
    .assert_visible(input("isbn"))
    .assert_visible(input("total_copies"))
    .assert_visible(Locator::css(SUBMIT))
    .click(nav(NAV_RETURN))
    .settle()
    .assert_visible(input("patron_id"))
    .assert_visible(input("book_id"))
    .assert_visible(Locator::css(SUBMIT))
    .click(nav(NAV_CATALOG))
    .settle()
    .assert_visible(Locator::css("table"))
    .assert_visible(Locator::css("tbody"))
    .assert_visible(input("patron_id").first())
    .assert_visible(Locator::css(BORROW_BUTTON).first())
}

/// The four library scenarios, with fresh books for this run
pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        add_book(&BookFixture::catalog_entry(&RunTag::next())),
        borrow_book(SEEDED_TITLE, SEEDED_PATRON),
        user_journey(&BookFixture::unique(&RunTag::next())),
        ui_elements(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Step;

    #[test]
    fn test_run_tags_are_unique_six_digits() {
        let a = RunTag::next();
        let b = RunTag::next();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 6);
        assert!(a.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_unique_fixture_shape() {
        let tag = RunTag("042017".to_string());
        let book = BookFixture::unique(&tag);
        assert_eq!(book.title, "Journey Test Book 042017");
        assert_eq!(book.author, "Journey Author 042017");
        assert_eq!(book.isbn, "9780420170000");
        assert_eq!(book.patron_id, "992017");

        let entry = BookFixture::catalog_entry(&tag);
        assert_eq!(entry.title, "Catalog Test Book 042017");
        assert_eq!(entry.isbn, "9790420170000");
        assert_ne!(entry.isbn, book.isbn);
    }

    #[test]
    fn test_builtin_scenarios_are_valid() {
        let scenarios = builtin_scenarios();
        assert_eq!(scenarios.len(), 4);
        for scenario in &scenarios {
            scenario.validate().unwrap();
        }
    }

    #[test]
    fn test_borrow_targets_the_named_row() {
        let scenario = borrow_book(SEEDED_TITLE, SEEDED_PATRON);
        let click = scenario
            .steps
            .iter()
            .find_map(|s| match s {
                Step::Click { locator } => Some(locator.clone()),
                _ => None,
            })
            .unwrap();
        let scope = click.within.unwrap();
        assert_eq!(scope.root, "tr");
        assert_eq!(scope.has_text, SEEDED_TITLE);
    }
}
