//! List Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use shelfwalk_e2e::Scenario;

use super::ScenarioArgs;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub scenarios: ScenarioArgs,
}

/// Scenario display wrapper for serialization
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub tags: Vec<String>,
    pub steps: usize,
    pub description: String,
}

impl From<&Scenario> for ScenarioDisplay {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
            steps: scenario.steps.len(),
            description: scenario.description.clone(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Tags", "Steps", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tags.join(", "),
            self.steps.to_string(),
            self.description.clone(),
        ]
    }
}

pub async fn execute(args: ListArgs, format: OutputFormat) -> Result<()> {
    let scenarios = args.scenarios.select()?;
    let items: Vec<ScenarioDisplay> = scenarios.iter().map(ScenarioDisplay::from).collect();
    print_list(&items, format);
    Ok(())
}
