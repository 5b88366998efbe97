//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use shelfwalk_e2e::{Report, ScenarioResult, Verdict};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() && format == OutputFormat::Table {
        println!("No scenarios found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

fn status_cell(result: &ScenarioResult) -> Cell {
    match result.verdict {
        Verdict::Pass => Cell::new("PASS").fg(Color::Green),
        Verdict::Fail(_) => Cell::new("FAIL").fg(Color::Red),
    }
}

/// Print the run report: one row per scenario, then failure details.
pub fn print_report(report: &Report, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        return;
    }

    let mut summary = table();
    summary.set_header(vec!["Scenario", "Status", "Duration", "Failed step", "Kind"]);
    for result in &report.scenarios {
        let failure = result.verdict.failure();
        summary.add_row(vec![
            Cell::new(&result.name),
            status_cell(result),
            Cell::new(format!("{} ms", result.duration_ms)),
            Cell::new(
                failure
                    .and_then(|f| f.step_name.clone())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(failure.map(|f| f.kind.to_string()).unwrap_or_else(|| "-".to_string())),
        ]);
    }
    println!("{summary}");

    for (name, failure) in report.failures() {
        println!();
        print_error(&format!("{}: {}", name, failure.reason));
        if let Some(url) = &failure.snapshot.url {
            println!("   url:        {}", url);
        }
        for banner in &failure.snapshot.banners {
            println!("   banner:     {}", banner);
        }
        if !failure.snapshot.dom_excerpt.is_empty() {
            println!("   page:       {}", failure.snapshot.dom_excerpt);
        }
        if let Some(path) = &failure.snapshot.screenshot {
            println!("   screenshot: {}", path.display());
        }
    }

    println!();
    let line = format!(
        "{} passed, {} failed ({} ms)",
        report.passed, report.failed, report.duration_ms
    );
    if report.all_passed() {
        print_success(&line);
    } else {
        print_error(&line);
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("⚠️  {}", message);
}
