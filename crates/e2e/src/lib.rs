//! Shelfwalk E2E engine
//!
//! Drives a real browser through user workflows of the library management
//! application and reports a verdict per scenario.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TestSuite                                                  │
//! │    ├── register(Scenario)      validated at registration    │
//! │    ├── run() -> Report         serial or bounded parallel   │
//! │    └── run_one()               fresh context, always closed │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    └── steps in order, first failure stops the scenario     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ExecutionContext (one tab per scenario)                    │
//! │    ├── PageDriver       navigate / fill / click             │
//! │    ├── WaitStrategy     network idle / load / visible       │
//! │    └── AssertionEngine  visible / text / table row          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageBackend (trait)                                        │
//! │    └── CdpPage          Chromium over DevTools protocol     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod backend;
pub mod cdp;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod library;
pub mod runner;
pub mod server;
pub mod spec;
pub mod suite;
pub mod wait;

pub use assertions::AssertionEngine;
pub use backend::{ElementState, NetworkStatus, PageBackend, PageFactory, PageSnapshot};
pub use cdp::CdpBrowser;
pub use config::{SuiteConfig, Viewport};
pub use context::ExecutionContext;
pub use driver::PageDriver;
pub use error::{E2eError, E2eResult, ErrorKind};
pub use runner::{Failure, ScenarioRunner, StepRecord, StepStatus, Verdict};
pub use server::AppServer;
pub use spec::{Locator, RowScope, Scenario, SettleStrategy, Step, Target, TextPattern};
pub use suite::{Report, ScenarioResult, TestSuite};
pub use wait::WaitStrategy;
