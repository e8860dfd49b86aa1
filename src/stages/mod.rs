use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use serde_json::{Value, json};

use crate::drafting::{DraftBackend, DraftRequest};
use crate::error::PipelineError;
use crate::matter::Matter;
use crate::pipeline::{Pipeline, PipelineContext, Stage, StageOutput};
use crate::snapshot::SnapshotStore;
use crate::step::StageLog;

pub const WORDS_METRIC: &str = "words";

pub fn default_pipeline(
    matter: Arc<Matter>,
    backend: Arc<dyn DraftBackend>,
    store: Arc<dyn SnapshotStore>,
) -> Result<Pipeline, PipelineError> {
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(IntakeStage {
            matter: matter.clone(),
        }),
        Box::new(ClassifyStage),
        Box::new(CaptionStage {
            store: store.clone(),
        }),
        Box::new(FactsStage {
            backend,
            store: store.clone(),
        }),
        Box::new(ClaimsStage {
            store: store.clone(),
        }),
        Box::new(ReliefStage {
            store: store.clone(),
        }),
        Box::new(AssembleStage { matter, store }),
    ];
    Pipeline::new(stages, WORDS_METRIC)
}

struct IntakeStage {
    matter: Arc<Matter>,
}

impl Stage for IntakeStage {
    fn key(&self) -> &'static str {
        "intake"
    }

    fn label(&self) -> &str {
        "Matter intake"
    }

    fn run(&self, _ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let matter = &self.matter;
        let reference = matter.matter.reference.trim().to_string();
        let claimant = matter.parties.claimant.name.trim().to_string();
        let respondent = matter.parties.respondent.name.trim().to_string();
        let total = matter.damages_total();

        log.say(format!("normalized matter profile {reference}"));
        log.say(format!(
            "itemized {} damage entr{} totalling {total:.2}",
            matter.damages.len(),
            if matter.damages.len() == 1 { "y" } else { "ies" },
        ));

        let body = format!("Matter {reference}: {claimant} v. {respondent}.");
        let damages: Vec<Value> = matter
            .damages
            .iter()
            .map(|item| json!({ "label": item.label, "amount": item.amount }))
            .collect();

        let mut output = StageOutput::text(&body)
            .with_field("reference", Value::String(reference))
            .with_field("claimant", Value::String(claimant))
            .with_field("respondent", Value::String(respondent))
            .with_field("narrative", Value::String(matter.narrative.clone()))
            .with_field("damages", Value::Array(damages))
            .with_field("damages_total", json!(total))
            .with_field("deadline_days", json!(matter.deadline_days))
            .with_extra(WORDS_METRIC, json!(word_count(&body)))
            .with_extra("damage_items", json!(matter.damages.len()));
        if let Some(jurisdiction) = &matter.matter.jurisdiction {
            output = output.with_field("jurisdiction", Value::String(jurisdiction.clone()));
        }
        if let Some(governing_law) = &matter.matter.governing_law {
            output = output.with_field("governing_law", Value::String(governing_law.clone()));
        }
        if let Some(date) = matter.incident_date {
            output = output.with_field(
                "incident_date",
                Value::String(date.format("%B %-d, %Y").to_string()),
            );
        }
        Ok(output)
    }
}

struct ClaimPattern {
    category: &'static str,
    title: &'static str,
    phrases: &'static [&'static str],
}

static CLAIM_PATTERNS: Lazy<Vec<ClaimPattern>> = Lazy::new(|| {
    vec![
        ClaimPattern {
            category: "breach_of_contract",
            title: "Breach of Contract",
            phrases: &["contract", "agreement", "invoice", "unpaid", "breach"],
        },
        ClaimPattern {
            category: "negligence",
            title: "Negligence",
            phrases: &["negligen", "duty of care", "careless", "failed to exercise"],
        },
        ClaimPattern {
            category: "property_damage",
            title: "Property Damage",
            phrases: &["damaged", "destroyed", "repair", "broken"],
        },
        ClaimPattern {
            category: "personal_injury",
            title: "Personal Injury",
            phrases: &["injur", "medical", "hospital"],
        },
        ClaimPattern {
            category: "misrepresentation",
            title: "Misrepresentation",
            phrases: &["misrepresent", "false statement", "misled", "deceiv"],
        },
    ]
});

struct ClassifyStage;

impl Stage for ClassifyStage {
    fn key(&self) -> &'static str {
        "classify"
    }

    fn label(&self) -> &str {
        "Claim classification"
    }

    fn requires(&self) -> &[&'static str] {
        &["intake"]
    }

    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let narrative = field_str(ctx, "intake", "narrative")?;
        let haystack = narrative.to_lowercase();

        let mut matched: Vec<&ClaimPattern> = CLAIM_PATTERNS
            .iter()
            .filter(|pattern| pattern.phrases.iter().any(|phrase| haystack.contains(phrase)))
            .collect();
        if matched.is_empty() {
            log.say("no claim patterns matched; tagging a general claim");
            static GENERAL: ClaimPattern = ClaimPattern {
                category: "general_claim",
                title: "General Claim",
                phrases: &[],
            };
            matched.push(&GENERAL);
        }

        let titles: Vec<&str> = matched.iter().map(|pattern| pattern.title).collect();
        log.say(format!(
            "narrative matched {} claim categor{}: {}",
            matched.len(),
            if matched.len() == 1 { "y" } else { "ies" },
            titles.join(", ")
        ));

        let body = format!(
            "Narrative matched {} claim categor{}: {}.",
            matched.len(),
            if matched.len() == 1 { "y" } else { "ies" },
            titles.join(", ")
        );
        Ok(StageOutput::text(&body)
            .with_field(
                "categories",
                Value::Array(
                    matched
                        .iter()
                        .map(|pattern| Value::String(pattern.category.to_string()))
                        .collect(),
                ),
            )
            .with_field(
                "titles",
                Value::Array(
                    titles
                        .iter()
                        .map(|title| Value::String((*title).to_string()))
                        .collect(),
                ),
            )
            .with_extra(WORDS_METRIC, json!(word_count(&body)))
            .with_extra("matches", json!(matched.len())))
    }
}

struct CaptionStage {
    store: Arc<dyn SnapshotStore>,
}

impl Stage for CaptionStage {
    fn key(&self) -> &'static str {
        "caption"
    }

    fn label(&self) -> &str {
        "Caption"
    }

    fn requires(&self) -> &[&'static str] {
        &["intake"]
    }

    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let reference = field_str(ctx, "intake", "reference")?;
        let claimant = field_str(ctx, "intake", "claimant")?;
        let respondent = field_str(ctx, "intake", "respondent")?;

        let mut lines = vec![
            "# Letter of Demand".to_string(),
            String::new(),
            format!("**Matter:** {reference}"),
            format!("**Claimant:** {claimant}"),
            format!("**Respondent:** {respondent}"),
        ];
        if let Some(jurisdiction) = ctx.field("intake", "jurisdiction").and_then(Value::as_str) {
            lines.push(format!("**Jurisdiction:** {jurisdiction}"));
        }
        if let Some(law) = ctx.field("intake", "governing_law").and_then(Value::as_str) {
            lines.push(format!("**Governing law:** {law}"));
        }
        let body = lines.join("\n");

        self.store
            .put("caption.md", body.as_bytes())
            .context("Failed to persist caption section")?;
        log.say(format!("drafted caption for matter {reference}"));

        Ok(StageOutput::text(&body).with_extra(WORDS_METRIC, json!(word_count(&body))))
    }
}

struct FactsStage {
    backend: Arc<dyn DraftBackend>,
    store: Arc<dyn SnapshotStore>,
}

impl Stage for FactsStage {
    fn key(&self) -> &'static str {
        "facts"
    }

    fn label(&self) -> &str {
        "Statement of facts"
    }

    fn requires(&self) -> &[&'static str] {
        &["intake"]
    }

    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let narrative = field_str(ctx, "intake", "narrative")?;
        let lead_in = match ctx.field("intake", "incident_date").and_then(Value::as_str) {
            Some(date) => {
                format!("The events giving rise to this demand began on {date}.")
            }
            None => "The following facts give rise to this demand.".to_string(),
        };

        log.say(format!(
            "drafting statement of facts from narrative ({} words)",
            word_count(narrative)
        ));
        let drafted = self
            .backend
            .draft(&DraftRequest {
                section: "facts",
                lead_in,
                source: narrative.to_string(),
            })
            .context("Failed to draft statement of facts")?;

        let body = format!("## Statement of Facts\n\n{drafted}");
        self.store
            .put("facts.md", body.as_bytes())
            .context("Failed to persist facts section")?;

        Ok(StageOutput::text(&body).with_extra(WORDS_METRIC, json!(word_count(&body))))
    }
}

struct ClaimsStage {
    store: Arc<dyn SnapshotStore>,
}

impl Stage for ClaimsStage {
    fn key(&self) -> &'static str {
        "claims"
    }

    fn label(&self) -> &str {
        "Claims"
    }

    fn requires(&self) -> &[&'static str] {
        &["intake", "classify"]
    }

    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let respondent = field_str(ctx, "intake", "respondent")?;
        let categories = field_array(ctx, "classify", "categories")?;
        let titles = field_array(ctx, "classify", "titles")?;

        let mut paragraphs = vec!["## Claims".to_string()];
        for (index, (category, title)) in categories.iter().zip(titles.iter()).enumerate() {
            let category = category
                .as_str()
                .ok_or_else(|| anyhow!("claim category at position {index} is not a string"))?;
            let title = title.as_str().unwrap_or(category);
            paragraphs.push(format!(
                "{}. **{title}.** {}",
                index + 1,
                claim_clause(category, respondent)
            ));
        }
        let body = paragraphs.join("\n\n");

        self.store
            .put("claims.md", body.as_bytes())
            .context("Failed to persist claims section")?;
        log.say(format!("drafted {} claim(s)", categories.len()));

        Ok(StageOutput::text(&body)
            .with_extra(WORDS_METRIC, json!(word_count(&body)))
            .with_extra("claims", json!(categories.len())))
    }
}

fn claim_clause(category: &str, respondent: &str) -> String {
    match category {
        "breach_of_contract" => format!(
            "{respondent} failed to perform its obligations under the parties' agreement, \
             and that failure has caused the losses itemized below."
        ),
        "negligence" => format!(
            "{respondent} owed the claimant a duty of care, breached that duty, and the \
             breach caused recoverable loss."
        ),
        "property_damage" => format!(
            "{respondent} is responsible for damage to the claimant's property and is \
             liable for the cost of repair or replacement."
        ),
        "personal_injury" => format!(
            "{respondent} is liable for the injuries described above and the associated \
             medical and related expenses."
        ),
        "misrepresentation" => format!(
            "{respondent} made statements the claimant relied upon that were false or \
             misleading, causing the claimant loss."
        ),
        _ => format!("{respondent} is liable to the claimant on the facts set out above."),
    }
}

struct ReliefStage {
    store: Arc<dyn SnapshotStore>,
}

impl Stage for ReliefStage {
    fn key(&self) -> &'static str {
        "relief"
    }

    fn label(&self) -> &str {
        "Relief and demand"
    }

    fn requires(&self) -> &[&'static str] {
        &["intake", "claims"]
    }

    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let claimant = field_str(ctx, "intake", "claimant")?;
        let damages = field_array(ctx, "intake", "damages")?;
        let total = ctx
            .field("intake", "damages_total")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let deadline_days = ctx
            .field("intake", "deadline_days")
            .and_then(Value::as_u64)
            .unwrap_or(14);

        let mut paragraphs = vec!["## Relief Sought".to_string()];
        if damages.is_empty() {
            paragraphs.push(format!(
                "{claimant} demands written confirmation, within {deadline_days} days of the \
                 date of this letter, that the conduct described above has ceased."
            ));
        } else {
            let mut items = Vec::with_capacity(damages.len());
            for (index, item) in damages.iter().enumerate() {
                let label = item
                    .get("label")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("damage entry at position {index} has no label"))?;
                let amount = item.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                items.push(format!("{}. {label}: {amount:.2}", index + 1));
            }
            paragraphs.push(items.join("\n"));
            paragraphs.push(format!(
                "{claimant} demands payment of the total sum of {total:.2} within \
                 {deadline_days} days of the date of this letter."
            ));
        }
        paragraphs.push(
            "All rights and remedies are expressly reserved, including the right to commence \
             proceedings without further notice."
                .to_string(),
        );
        let body = paragraphs.join("\n\n");

        self.store
            .put("relief.md", body.as_bytes())
            .context("Failed to persist relief section")?;
        log.say(format!(
            "itemized relief for {} damage entr{}",
            damages.len(),
            if damages.len() == 1 { "y" } else { "ies" },
        ));

        Ok(StageOutput::text(&body)
            .with_extra(WORDS_METRIC, json!(word_count(&body)))
            .with_extra("demand_total", Value::String(format!("{total:.2}"))))
    }
}

struct AssembleStage {
    matter: Arc<Matter>,
    store: Arc<dyn SnapshotStore>,
}

impl Stage for AssembleStage {
    fn key(&self) -> &'static str {
        "assemble"
    }

    fn label(&self) -> &str {
        "Assemble document"
    }

    fn requires(&self) -> &[&'static str] {
        &["intake", "caption", "facts", "claims", "relief"]
    }

    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> Result<StageOutput> {
        let sections = ["caption", "facts", "claims", "relief"];
        let mut document = String::new();
        for key in sections {
            if !document.is_empty() {
                document.push_str("\n\n");
            }
            document.push_str(ctx.require(key)?.body.trim_end());
        }
        document.push('\n');
        log.say(format!("assembled {} sections", sections.len()));

        let reference = field_str(ctx, "intake", "reference")?;
        let path = self.matter.output.resolve_path(reference);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
        fs::write(&path, &document)
            .with_context(|| format!("Failed to write assembled document: {}", path.display()))?;
        self.store
            .put("document.md", document.as_bytes())
            .context("Failed to persist assembled document")?;
        log.say(format!("wrote {}", path.display()));

        Ok(StageOutput::text(&document)
            .with_field(
                "output_path",
                Value::String(path.to_string_lossy().to_string()),
            )
            .with_field("size_bytes", json!(document.len()))
            .with_extra(WORDS_METRIC, json!(word_count(&document))))
    }
}

pub fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn field_str<'a>(ctx: &'a PipelineContext, key: &str, name: &str) -> Result<&'a str> {
    ctx.require(key)?
        .fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("stage '{key}' output is missing text field '{name}'"))
}

fn field_array<'a>(ctx: &'a PipelineContext, key: &str, name: &str) -> Result<&'a Vec<Value>> {
    ctx.require(key)?
        .fields
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("stage '{key}' output is missing list field '{name}'"))
}
