use chrono::Utc;
use serde::Serialize;

use crate::error::PipelineError;
use crate::matter::Matter;
use crate::pipeline::Pipeline;
use crate::stages::word_count;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_matter(matter: &Matter) -> ValidationReport {
    let mut report = ValidationReport::default();

    if matter.version != 1 {
        report
            .errors
            .push(format!("Unsupported matter version: {}", matter.version));
    }

    if matter.matter.reference.trim().is_empty() {
        report
            .errors
            .push("Matter reference cannot be empty".into());
    }

    if matter.parties.claimant.name.trim().is_empty() {
        report.errors.push("Claimant name cannot be empty".into());
    }
    if matter.parties.respondent.name.trim().is_empty() {
        report.errors.push("Respondent name cannot be empty".into());
    }

    if matter.narrative.trim().is_empty() {
        report.errors.push("Narrative cannot be empty".into());
    } else if word_count(&matter.narrative) < 20 {
        report.warnings.push(format!(
            "Narrative is very short ({} words); drafted sections will be thin",
            word_count(&matter.narrative)
        ));
    }

    for (idx, item) in matter.damages.iter().enumerate() {
        if item.label.trim().is_empty() {
            report
                .errors
                .push(format!("Damage entry {} has an empty label", idx + 1));
        }
        if !item.amount.is_finite() || item.amount < 0.0 {
            report.errors.push(format!(
                "Damage entry {} ('{}') has an invalid amount: {}",
                idx + 1,
                item.label,
                item.amount
            ));
        }
    }
    if matter.damages.is_empty() {
        report
            .warnings
            .push("No damages itemized; the relief section will demand confirmation only".into());
    }

    if matter.deadline_days == 0 {
        report
            .warnings
            .push("Response deadline of 0 days leaves the respondent no time to comply".into());
    }

    if let Some(date) = matter.incident_date
        && date > Utc::now().date_naive()
    {
        report
            .warnings
            .push(format!("Incident date {date} is in the future"));
    }

    if matter.output.directory.as_os_str().is_empty() {
        report.errors.push("Output directory cannot be empty".into());
    }
    if matter.output.filename.trim().is_empty() {
        report.errors.push("Output filename cannot be empty".into());
    }

    report
}

pub fn validate_selection(pipeline: &Pipeline, identifiers: &[String]) -> ValidationReport {
    let mut report = ValidationReport::default();
    match pipeline.resolve_selection(identifiers) {
        Ok(_) => {}
        Err(PipelineError::UnknownStages { identifiers, known }) => {
            for identifier in identifiers {
                report.errors.push(format!(
                    "Unknown stage identifier '{}'. Known stages: {}",
                    identifier,
                    known.join(", ")
                ));
            }
        }
        Err(other) => report.errors.push(other.to_string()),
    }
    report
}
