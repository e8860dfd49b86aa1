use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Matter {
    pub version: u32,
    pub matter: MatterInfo,
    pub parties: Parties,
    #[serde(default)]
    pub incident_date: Option<NaiveDate>,
    pub narrative: String,
    #[serde(default)]
    pub damages: Vec<DamageItem>,
    #[serde(default = "default_deadline_days")]
    pub deadline_days: u32,
    pub output: OutputSpec,
}

fn default_deadline_days() -> u32 {
    14
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatterInfo {
    pub reference: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub governing_law: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parties {
    pub claimant: Party,
    pub respondent: Party,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DamageItem {
    pub label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSpec {
    pub directory: PathBuf,
    #[serde(default = "default_output_filename")]
    pub filename: String,
}

fn default_output_filename() -> String {
    "{reference}.md".to_string()
}

impl Matter {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read matter file: {}", path.display()))?;
        let matter: Matter = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse matter YAML: {}", path.display()))?;
        Ok(matter)
    }

    pub fn damages_total(&self) -> f64 {
        self.damages.iter().map(|item| item.amount).sum()
    }
}

impl OutputSpec {
    pub fn resolve_path(&self, reference: &str) -> PathBuf {
        let file_name = self.filename.replace("{reference}", reference);
        self.directory.join(file_name)
    }
}
