//! Scenario model and declarative YAML loading

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::config::Viewport;
use crate::error::{E2eError, E2eResult};

/// A complete scenario, built in code or parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport override for this scenario
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Scenario budget override in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to base)
    Navigate { url: String },

    /// Fill an input field
    Fill { locator: Locator, value: String },

    /// Click an element
    Click { locator: Locator },

    /// Wait until the page is settled
    WaitForSettled {
        #[serde(default)]
        until: SettleStrategy,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert an element is visible
    AssertVisible { locator: Locator },

    /// Assert an element's rendered text matches a pattern
    AssertText { locator: Locator, pattern: TextPattern },

    /// Assert the row containing `row_text` also contains every field
    AssertTableRow {
        #[serde(default = "default_table")]
        table: String,
        row_text: String,
        fields: Vec<String>,
    },

    /// Capture a screenshot into the artifacts directory
    Screenshot { name: String },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_table() -> String {
    "table".to_string()
}

impl Step {
    /// Short label used in logs and reports
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::Fill { locator, .. } => format!("fill:{}", locator),
            Step::Click { locator } => format!("click:{}", locator),
            Step::WaitForSettled { until, .. } => format!("wait:{}", until),
            Step::AssertVisible { locator } => format!("assert_visible:{}", locator),
            Step::AssertText { locator, .. } => format!("assert_text:{}", locator),
            Step::AssertTableRow { table, row_text, .. } => {
                format!("assert_row:{}[{}]", table, row_text)
            }
            Step::Screenshot { name } => format!("screenshot:{}", name),
            Step::Log { message } => {
                let end = message
                    .char_indices()
                    .nth(30)
                    .map(|(i, _)| i)
                    .unwrap_or(message.len());
                format!("log:{}", &message[..end])
            }
        }
    }

    /// Steps that may start a page load or form submission
    pub fn may_navigate(&self) -> bool {
        matches!(self, Step::Navigate { .. } | Step::Click { .. })
    }

    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Step::AssertVisible { .. } | Step::AssertText { .. } | Step::AssertTableRow { .. }
        )
    }
}

/// What the element matcher looks for
///
/// Written as a plain CSS selector, or `text=<literal>` for the innermost element
/// whose normalised text contains the literal (case-insensitive).
/// A CSS selector may end in `:has-text('literal')` to keep only matches whose
/// text contains the literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    Css(String),
    CssWithText { css: String, text: String },
    Text(String),
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c: char| c == '\'' || c == '"')
}

impl Target {
    /// Parse a CSS selector, splitting off a trailing `:has-text(...)` filter.
    pub fn from_css(css: &str) -> Target {
        let css = css.trim();
        if let Some((base, rest)) = css.rsplit_once(":has-text(") {
            if let Some(inner) = rest.strip_suffix(')') {
                let text = unquote(inner);
                if !base.is_empty() && !text.is_empty() {
                    return Target::CssWithText {
                        css: base.to_string(),
                        text: text.to_string(),
                    };
                }
            }
        }
        Target::Css(css.to_string())
    }
}

impl TryFrom<String> for Target {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let trimmed = raw.trim();
        if let Some(text) = trimmed.strip_prefix("text=") {
            let text = unquote(text);
            if text.is_empty() {
                return Err("text= selector needs a literal".to_string());
            }
            return Ok(Target::Text(text.to_string()));
        }
        if trimmed.is_empty() {
            return Err("empty selector".to_string());
        }
        Ok(Target::from_css(trimmed))
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Css(css) => f.write_str(css),
            Target::CssWithText { css, text } => write!(f, "{}:has-text('{}')", css, text),
            Target::Text(text) => write!(f, "text={}", text),
        }
    }
}

/// The first `root` element whose text contains `has_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowScope {
    #[serde(default = "default_row_root")]
    pub root: String,
    pub has_text: String,
}

fn default_row_root() -> String {
    "tr".to_string()
}

impl fmt::Display for RowScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:has-text({:?})", self.root, self.has_text)
    }
}

/// Typed element locator: a target, an optional row scope and an explicit
/// first-match opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocatorRepr")]
pub struct Locator {
    pub target: Target,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within: Option<RowScope>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub first: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocatorRepr {
    Short(Target),
    Full {
        target: Target,
        #[serde(default)]
        within: Option<RowScope>,
        #[serde(default)]
        first: bool,
    },
}

impl From<LocatorRepr> for Locator {
    fn from(repr: LocatorRepr) -> Self {
        match repr {
            LocatorRepr::Short(target) => Locator {
                target,
                within: None,
                first: false,
            },
            LocatorRepr::Full {
                target,
                within,
                first,
            } => Locator {
                target,
                within,
                first,
            },
        }
    }
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator {
            target: Target::from_css(&selector.into()),
            within: None,
            first: false,
        }
    }

    pub fn text(literal: impl Into<String>) -> Self {
        Locator {
            target: Target::Text(literal.into()),
            within: None,
            first: false,
        }
    }

    /// Resolve relative to the first `root` element containing `has_text`.
    pub fn within(mut self, scope: RowScope) -> Self {
        self.within = Some(scope);
        self
    }

    pub fn within_row(self, root: impl Into<String>, has_text: impl Into<String>) -> Self {
        self.within(RowScope {
            root: root.into(),
            has_text: has_text.into(),
        })
    }

    /// Accept several matches and use the first one.
    pub fn first(mut self) -> Self {
        self.first = true;
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.within {
            write!(f, "{} >> ", scope)?;
        }
        write!(f, "{}", self.target)?;
        if self.first {
            f.write_str(" >> first")?;
        }
        Ok(())
    }
}

/// Expected text: literal substring or case-insensitive regular expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PatternRepr", rename_all = "snake_case")]
pub enum TextPattern {
    Literal(String),
    Regex(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Plain(String),
    Tagged(TaggedPattern),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedPattern {
    Literal(String),
    Regex(String),
}

impl From<PatternRepr> for TextPattern {
    fn from(repr: PatternRepr) -> Self {
        match repr {
            PatternRepr::Plain(s) | PatternRepr::Tagged(TaggedPattern::Literal(s)) => {
                TextPattern::Literal(s)
            }
            PatternRepr::Tagged(TaggedPattern::Regex(s)) => TextPattern::Regex(s),
        }
    }
}

impl TextPattern {
    pub fn literal(s: impl Into<String>) -> Self {
        TextPattern::Literal(s.into())
    }

    pub fn regex(s: impl Into<String>) -> Self {
        TextPattern::Regex(s.into())
    }

    fn compile(pattern: &str) -> E2eResult<Regex> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| E2eError::SpecParse(format!("invalid pattern /{}/: {}", pattern, e)))
    }

    pub fn matches(&self, text: &str) -> E2eResult<bool> {
        match self {
            TextPattern::Literal(lit) => Ok(text.contains(lit.as_str())),
            TextPattern::Regex(pattern) => Ok(Self::compile(pattern)?.is_match(text)),
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextPattern::Literal(lit) => write!(f, "{:?}", lit),
            TextPattern::Regex(pattern) => write!(f, "/{}/i", pattern),
        }
    }
}

/// When a page counts as settled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleStrategy {
    /// No request in flight for the quiet window
    #[default]
    NetworkIdle,
    /// Document finished loading
    Load,
    /// Element present and visible
    Visible(Locator),
}

impl fmt::Display for SettleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleStrategy::NetworkIdle => f.write_str("networkidle"),
            SettleStrategy::Load => f.write_str("load"),
            SettleStrategy::Visible(locator) => write!(f, "visible({})", locator),
        }
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tags: Vec::new(),
            viewport: None,
            timeout_ms: None,
            steps: Vec::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn navigate(self, url: impl Into<String>) -> Self {
        self.step(Step::Navigate { url: url.into() })
    }

    pub fn fill(self, locator: Locator, value: impl Into<String>) -> Self {
        self.step(Step::Fill {
            locator,
            value: value.into(),
        })
    }

    pub fn click(self, locator: Locator) -> Self {
        self.step(Step::Click { locator })
    }

    /// Wait for network idle with the default budget
    pub fn settle(self) -> Self {
        self.step(Step::WaitForSettled {
            until: SettleStrategy::NetworkIdle,
            timeout_ms: None,
        })
    }

    pub fn assert_visible(self, locator: Locator) -> Self {
        self.step(Step::AssertVisible { locator })
    }

    pub fn assert_text(self, locator: Locator, pattern: TextPattern) -> Self {
        self.step(Step::AssertText { locator, pattern })
    }

    pub fn assert_row(
        self,
        row_text: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.step(Step::AssertTableRow {
            table: default_table(),
            row_text: row_text.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }

    pub fn log(self, message: impl Into<String>) -> Self {
        self.step(Step::Log {
            message: message.into(),
        })
    }

    /// Check the scenario is runnable.
    ///
    /// Besides basic shape checks, every assertion that follows a navigation or
    /// click must be preceded by a settle step, otherwise it would observe the DOM
    /// of a page transition still in progress.
    pub fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{}: no steps", self.name)));
        }

        let mut unsettled: Option<usize> = None;
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::AssertText {
                    pattern: TextPattern::Regex(p),
                    ..
                } => {
                    TextPattern::compile(p)
                        .map_err(|e| E2eError::SpecParse(format!("{}: step {}: {}", self.name, i + 1, e)))?;
                }
                Step::AssertTableRow { fields, row_text, .. } => {
                    if fields.is_empty() || row_text.is_empty() {
                        return Err(E2eError::SpecParse(format!(
                            "{}: step {}: row assertion needs row_text and fields",
                            self.name,
                            i + 1
                        )));
                    }
                }
                _ => {}
            }

            if step.may_navigate() {
                unsettled = Some(i);
            } else if matches!(step, Step::WaitForSettled { .. }) {
                unsettled = None;
            } else if step.is_assertion() {
                if let Some(action) = unsettled {
                    return Err(E2eError::SpecParse(format!(
                        "{}: step {} ({}) asserts after step {} ({}) without waiting for the page to settle",
                        self.name,
                        i + 1,
                        step.name(),
                        action + 1,
                        self.steps[action].name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let in_file = |reason: &dyn fmt::Display| {
            E2eError::SpecParse(format!("{}: {}", path.display(), reason))
        };
        let content = std::fs::read_to_string(path).map_err(|e| in_file(&e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            E2eError::Yaml(inner) => in_file(&inner),
            E2eError::SpecParse(reason) => in_file(&reason),
            other => in_file(&other),
        })
    }

    /// Load all scenarios from a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
