//! CLI Commands

pub mod list;
pub mod run;

use std::path::PathBuf;

use clap::Args;
use shelfwalk_e2e::{library, E2eResult, Scenario};
use tracing::debug;

/// Which scenarios a command operates on
#[derive(Args, Debug, Default)]
pub struct ScenarioArgs {
    /// Directory of YAML scenario files
    #[arg(long, env = "SHELFWALK_SPECS")]
    pub specs: Option<PathBuf>,

    /// Include the built-in library scenarios (default when --specs is absent)
    #[arg(long)]
    pub builtin: bool,

    /// Only scenarios carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Only scenarios whose name contains this text
    #[arg(long)]
    pub name: Option<String>,
}

impl ScenarioArgs {
    /// Collect scenarios from the selected sources, then apply the filters.
    pub fn select(&self) -> E2eResult<Vec<Scenario>> {
        let mut scenarios = Vec::new();
        if self.builtin || self.specs.is_none() {
            scenarios.extend(library::builtin_scenarios());
        }
        if let Some(dir) = &self.specs {
            debug!("Loading scenarios from {}", dir.display());
            scenarios.extend(Scenario::load_all(dir)?);
        }

        if let Some(tag) = &self.tag {
            scenarios.retain(|s| s.has_tag(tag));
        }
        if let Some(name) = &self.name {
            scenarios.retain(|s| s.name.contains(name.as_str()));
        }
        Ok(scenarios)
    }
}
