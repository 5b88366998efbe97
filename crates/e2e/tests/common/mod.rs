//! In-memory stand-in for the library management application
//!
//! Implements `PageBackend` by rendering each route to a flat list of
//! elements. Selector support is exact-match on the CSS strings the scenarios
//! use, which is all the engine needs to exercise its own rules.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use shelfwalk_e2e::backend::text_matches;
use shelfwalk_e2e::{
    E2eError, E2eResult, ElementState, Locator, NetworkStatus, PageBackend, PageFactory, SuiteConfig,
    Target, Viewport,
};

pub const BASE_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone)]
pub struct Book {
    pub id: usize,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub total: u32,
    pub available: u32,
}

/// Server-side state shared by every tab
#[derive(Debug, Default)]
pub struct LibraryState {
    pub books: Vec<Book>,
    pub borrows: Vec<(String, usize)>,
}

impl LibraryState {
    pub fn seeded() -> Self {
        let mut state = LibraryState::default();
        for (title, author, isbn, copies) in [
            ("To Kill a Mockingbird", "Harper Lee", "9780061120084", 3),
            ("1984", "George Orwell", "9780451524935", 2),
            ("Pride and Prejudice", "Jane Austen", "9780141439518", 1),
        ] {
            state.add(title, author, isbn, copies);
        }
        state
    }

    fn add(&mut self, title: &str, author: &str, isbn: &str, copies: u32) -> usize {
        let id = self.books.len() + 1;
        self.books.push(Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            isbn: isbn.to_string(),
            total: copies,
            available: copies,
        });
        id
    }

    pub fn find(&self, title: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.title == title)
    }
}

/// Faults and latency injected into the fake
#[derive(Debug, Clone, Default)]
pub struct FakeOptions {
    /// How long every request keeps the network busy
    pub latency: Duration,
    /// Navigation labels left out of the nav bar
    pub hidden_nav: Vec<String>,
    /// Routes whose load never completes
    pub hanging_routes: Vec<String>,
    /// Routes whose load panics
    pub panicking_routes: Vec<String>,
    pub disabled_submit: bool,
    /// Make `open_page` fail
    pub refuse_pages: bool,
}

#[derive(Debug, Default)]
pub struct PageStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl PageStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory for fake tabs onto one shared library
#[derive(Clone)]
pub struct FakeLibrary {
    pub state: Arc<Mutex<LibraryState>>,
    pub options: FakeOptions,
    pub stats: Arc<PageStats>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::with_options(FakeOptions {
            latency: Duration::from_millis(120),
            ..Default::default()
        })
    }

    pub fn with_options(options: FakeOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(LibraryState::seeded())),
            options,
            stats: Arc::new(PageStats::default()),
        }
    }

    pub fn factory(&self) -> Arc<dyn PageFactory> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl PageFactory for FakeLibrary {
    async fn open_page(&self, _viewport: Viewport) -> E2eResult<Box<dyn PageBackend>> {
        if self.options.refuse_pages {
            return Err(E2eError::Browser("browser context limit reached".to_string()));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            library: self.clone(),
            route: None,
            flash: None,
            fields: HashMap::new(),
            busy_until: Instant::now(),
            closed: false,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    None,
    Nav(&'static str),
    Input(String),
    SubmitAddBook,
    SubmitReturn,
    Borrow(usize),
}

#[derive(Debug, Clone)]
struct Element {
    selectors: Vec<String>,
    text: String,
    visible: bool,
    enabled: bool,
    /// Elements with children are skipped by `text=` targets
    container: bool,
    row: Option<usize>,
    action: Action,
}

impl Element {
    fn new(selectors: &[&str], text: impl Into<String>) -> Self {
        Element {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            text: text.into(),
            visible: true,
            enabled: true,
            container: false,
            row: None,
            action: Action::None,
        }
    }

    fn container(mut self) -> Self {
        self.container = true;
        self
    }

    fn in_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    fn matches(&self, target: &Target) -> bool {
        match target {
            Target::Css(css) => self.selectors.iter().any(|s| s == css),
            Target::CssWithText { css, text } => {
                self.selectors.iter().any(|s| s == css) && text_matches(&self.text, text)
            }
            Target::Text(text) => !self.container && text_matches(&self.text, text),
        }
    }
}

fn input(name: &str, key: String) -> Element {
    let selector = format!("input[name='{}']", name);
    Element::new(&[selector.as_str(), "input"], "").action(Action::Input(key))
}

const NAV: [(&str, &str); 4] = [
    ("🏠 Home", "/"),
    ("📖 Catalog", "/catalog"),
    ("➕ Add Book", "/add_book"),
    ("↩️ Return Book", "/return"),
];

pub struct FakePage {
    library: FakeLibrary,
    route: Option<String>,
    flash: Option<(&'static str, String)>,
    fields: HashMap<String, String>,
    busy_until: Instant,
    closed: bool,
}

impl FakePage {
    fn ensure_open(&self) -> E2eResult<()> {
        if self.closed {
            return Err(E2eError::Browser("page is closed".to_string()));
        }
        Ok(())
    }

    fn request(&mut self) {
        self.busy_until = Instant::now() + self.library.options.latency;
    }

    /// Load a route, showing `flash` on the new page.
    async fn load(&mut self, route: &str, flash: Option<(&'static str, String)>) {
        let options = &self.library.options;
        if options.panicking_routes.iter().any(|r| r == route) {
            panic!("renderer crashed on {}", route);
        }
        let hangs = options.hanging_routes.iter().any(|r| r == route);
        self.request();
        if hangs {
            std::future::pending::<()>().await;
        }
        self.route = Some(route.to_string());
        self.flash = flash;
        self.fields.clear();
    }

    fn render(&self) -> Vec<Element> {
        let Some(route) = self.route.as_deref() else {
            return Vec::new();
        };
        let options = &self.library.options;
        let mut page: Vec<Element> = NAV
            .iter()
            .filter(|(label, _)| !options.hidden_nav.iter().any(|h| h == label))
            .map(|(label, route)| Element::new(&["a", "nav a"], *label).action(Action::Nav(*route)))
            .collect();

        if let Some((class, message)) = &self.flash {
            page.push(Element::new(&[*class, ".flash"], message.clone()));
        }

        let submit = |action: Action| {
            let mut button = Element::new(&["button[type='submit']", "button"], "Submit").action(action);
            button.enabled = !options.disabled_submit;
            button
        };

        match route {
            "/" => page.push(Element::new(&["h1"], "Library Management System")),
            "/add_book" => {
                page.push(Element::new(&["h2"], "Add New Book"));
                for name in ["title", "author", "isbn", "total_copies"] {
                    page.push(input(name, name.to_string()));
                }
                page.push(submit(Action::SubmitAddBook));
            }
            "/return" => {
                page.push(Element::new(&["h2"], "Return Book"));
                page.push(input("patron_id", "patron_id".to_string()));
                page.push(input("book_id", "book_id".to_string()));
                page.push(submit(Action::SubmitReturn));
            }
            "/catalog" => {
                let state = self.library.state.lock();
                let rows: Vec<String> = state
                    .books
                    .iter()
                    .map(|b| {
                        format!(
                            "{} {} {} {} {}/{} Borrow",
                            b.id, b.title, b.author, b.isbn, b.available, b.total
                        )
                    })
                    .collect();
                let all = rows.join("\n");
                page.push(Element::new(&["table"], format!("ID Title Author ISBN Available Actions\n{}", all)).container());
                page.push(Element::new(&["tr", "table tr", "thead tr"], "ID Title Author ISBN Available Actions").container());
                page.push(Element::new(&["tbody"], all).container());
                for (book, text) in state.books.iter().zip(rows) {
                    page.push(Element::new(&["tr", "table tr", "tbody tr"], text).container().in_row(book.id));
                    for cell in [book.title.clone(), book.author.clone(), book.isbn.clone()] {
                        page.push(Element::new(&["td"], cell).in_row(book.id));
                    }
                    page.push(input("patron_id", format!("patron_id:{}", book.id)).in_row(book.id));
                    page.push(
                        Element::new(&["button"], "Borrow")
                            .in_row(book.id)
                            .action(Action::Borrow(book.id)),
                    );
                }
            }
            _ => page.push(Element::new(&["h1"], "Not Found")),
        }
        page
    }

    /// Elements a locator designates, in document order
    fn matching(&self, locator: &Locator) -> Vec<Element> {
        let page = self.render();
        let row = match &locator.within {
            None => None,
            Some(scope) => {
                let root = Target::from_css(&scope.root);
                match page
                    .iter()
                    .find(|el| el.matches(&root) && text_matches(&el.text, &scope.has_text))
                {
                    Some(el) => el.row,
                    None => return Vec::new(),
                }
            }
        };
        page.into_iter()
            .filter(|el| row.is_none() || el.row == row)
            .filter(|el| el.matches(&locator.target))
            .collect()
    }

    fn pick(&self, locator: &Locator, index: usize) -> E2eResult<Element> {
        self.matching(locator)
            .into_iter()
            .nth(index)
            .ok_or_else(|| E2eError::Browser(format!("{} vanished", locator)))
    }

    fn field(&self, key: &str) -> String {
        self.fields.get(key).cloned().unwrap_or_default()
    }

    async fn submit_add_book(&mut self) {
        let (title, author, isbn) = (self.field("title"), self.field("author"), self.field("isbn"));
        let copies: u32 = self.field("total_copies").parse().unwrap_or(0);
        let outcome = {
            let mut state = self.library.state.lock();
            if title.is_empty() || author.is_empty() || isbn.len() != 13 || copies == 0 {
                Err("Please fill in every field with valid values.".to_string())
            } else if state.books.iter().any(|b| b.isbn == isbn) {
                Err("A book with this ISBN already exists.".to_string())
            } else {
                state.add(&title, &author, &isbn, copies);
                Ok(format!("Book \"{}\" has been successfully added to the catalog.", title))
            }
        };
        match outcome {
            Ok(message) => self.load("/catalog", Some((".flash-success", message))).await,
            Err(message) => self.load("/add_book", Some((".flash-error", message))).await,
        }
    }

    async fn borrow(&mut self, book_id: usize) {
        let patron = self.field(&format!("patron_id:{}", book_id));
        let outcome = {
            let mut guard = self.library.state.lock();
            let state = &mut *guard;
            let valid_patron = patron.len() == 6 && patron.chars().all(|c| c.is_ascii_digit());
            match state.books.iter_mut().find(|b| b.id == book_id) {
                _ if !valid_patron => Err("Invalid patron ID. Must be exactly 6 digits.".to_string()),
                Some(book) if book.available > 0 => {
                    book.available -= 1;
                    let title = book.title.clone();
                    state.borrows.push((patron.clone(), book_id));
                    Ok(format!("Successfully borrowed \"{}\". Due date: 2026-11-02.", title))
                }
                Some(_) => Err("This book is currently not available.".to_string()),
                None => Err("Book not found.".to_string()),
            }
        };
        match outcome {
            Ok(message) => self.load("/catalog", Some((".flash-success", message))).await,
            Err(message) => self.load("/catalog", Some((".flash-error", message))).await,
        }
    }
}

#[async_trait]
impl PageBackend for FakePage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        self.ensure_open()?;
        let parsed = reqwest::Url::parse(url).map_err(|e| E2eError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let route = parsed.path().to_string();
        self.load(&route, None).await;
        Ok(())
    }

    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementState>> {
        self.ensure_open()?;
        Ok(self
            .matching(locator)
            .into_iter()
            .map(|el| ElementState {
                visible: el.visible,
                enabled: el.enabled,
                text: el.text,
            })
            .collect())
    }

    async fn fill(&mut self, locator: &Locator, index: usize, value: &str) -> E2eResult<()> {
        self.ensure_open()?;
        match self.pick(locator, index)?.action {
            Action::Input(key) => {
                self.fields.insert(key, value.to_string());
                Ok(())
            }
            _ => Err(E2eError::Browser(format!("{} is not an input", locator))),
        }
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> E2eResult<()> {
        self.ensure_open()?;
        match self.pick(locator, index)?.action {
            Action::Nav(route) => self.load(route, None).await,
            Action::SubmitAddBook => self.submit_add_book().await,
            Action::SubmitReturn => {
                let message = format!("Book {} returned by patron {}.", self.field("book_id"), self.field("patron_id"));
                self.load("/return", Some((".flash-success", message))).await
            }
            Action::Borrow(id) => self.borrow(id).await,
            Action::None | Action::Input(_) => {}
        }
        Ok(())
    }

    async fn network_status(&mut self) -> E2eResult<NetworkStatus> {
        self.ensure_open()?;
        let now = Instant::now();
        let busy = now < self.busy_until;
        Ok(NetworkStatus {
            inflight: usize::from(busy),
            last_activity: if busy { now } else { self.busy_until },
            document_ready: !busy,
        })
    }

    async fn current_url(&mut self) -> E2eResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.route.as_ref().map(|r| format!("{}{}", BASE_URL, r)))
    }

    async fn body_text(&mut self) -> E2eResult<String> {
        self.ensure_open()?;
        Ok(self
            .render()
            .into_iter()
            .filter(|el| !el.container && !el.text.is_empty())
            .map(|el| el.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn screenshot(&mut self) -> E2eResult<Vec<u8>> {
        self.ensure_open()?;
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if !self.closed {
            self.closed = true;
            self.library.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Suite configuration pointing at the fake, artifacts under `output`
pub fn config(output: &std::path::Path) -> SuiteConfig {
    SuiteConfig {
        base_url: BASE_URL.to_string(),
        output_dir: output.to_path_buf(),
        ..Default::default()
    }
}
