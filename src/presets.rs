use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct PresetMatter {
    version: u32,
    matter: PresetInfo,
    parties: PresetParties,
    #[serde(skip_serializing_if = "Option::is_none")]
    incident_date: Option<String>,
    narrative: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    damages: Vec<PresetDamage>,
    deadline_days: u32,
    output: PresetOutput,
}

#[derive(Debug, Clone, Serialize)]
struct PresetInfo {
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    governing_law: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PresetParties {
    claimant: PresetParty,
    respondent: PresetParty,
}

#[derive(Debug, Clone, Serialize)]
struct PresetParty {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PresetDamage {
    label: String,
    amount: f64,
}

#[derive(Debug, Clone, Serialize)]
struct PresetOutput {
    directory: PathBuf,
    filename: String,
}

pub fn render_preset(name: &str) -> Result<String> {
    let preset = match name {
        "demand-letter" => demand_letter_preset(),
        "minimal" => minimal_preset(),
        other => anyhow::bail!("Unknown preset '{other}'. Known presets: demand-letter, minimal"),
    };
    Ok(serde_yaml::to_string(&preset)?)
}

pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let rendered = render_preset(name)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write preset matter: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

fn demand_letter_preset() -> PresetMatter {
    PresetMatter {
        version: 1,
        matter: PresetInfo {
            reference: "ACME-2025-014".into(),
            jurisdiction: Some("State of Columbia".into()),
            governing_law: Some("Columbia Commercial Code".into()),
        },
        parties: PresetParties {
            claimant: PresetParty {
                name: "Acme Industrial Supply Ltd".into(),
                address: Some("12 Foundry Row, Ironton".into()),
            },
            respondent: PresetParty {
                name: "Brightline Logistics LLC".into(),
                address: Some("400 Harbor Drive, Port Vale".into()),
            },
        },
        incident_date: Some("2025-03-18".into()),
        narrative: "Under the parties' supply agreement dated January 2025, Brightline \
                    Logistics agreed to collect and deliver palletized industrial fittings \
                    on a fortnightly schedule. The March consignment arrived eleven days \
                    late, and four crates were damaged in transit and their contents \
                    destroyed. Invoices 1204 and 1207 covering the replacement shipment \
                    remain unpaid despite two written reminders."
            .into(),
        damages: vec![
            PresetDamage {
                label: "Unpaid invoices 1204 and 1207".into(),
                amount: 18450.00,
            },
            PresetDamage {
                label: "Replacement of damaged crates".into(),
                amount: 2310.75,
            },
        ],
        deadline_days: 21,
        output: PresetOutput {
            directory: PathBuf::from("./out/letters"),
            filename: "{reference}-demand.md".into(),
        },
    }
}

fn minimal_preset() -> PresetMatter {
    PresetMatter {
        version: 1,
        matter: PresetInfo {
            reference: "MATTER-0001".into(),
            jurisdiction: None,
            governing_law: None,
        },
        parties: PresetParties {
            claimant: PresetParty {
                name: "Claimant Name".into(),
                address: None,
            },
            respondent: PresetParty {
                name: "Respondent Name".into(),
                address: None,
            },
        },
        incident_date: None,
        narrative: "Describe what happened here, in plain language, with enough detail \
                    for the drafted sections to stand on their own."
            .into(),
        damages: Vec::new(),
        deadline_days: 14,
        output: PresetOutput {
            directory: PathBuf::from("./out"),
            filename: "{reference}.md".into(),
        },
    }
}
