use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::alias::AliasTable;
use crate::error::{MissingPrerequisite, PipelineError};
use crate::observability::MetricsCollector;
use crate::step::{self, StageLog, StepStatus, StepSummary};

pub trait Stage: Send + Sync {
    fn key(&self) -> &'static str;
    fn label(&self) -> &str;
    fn requires(&self) -> &[&'static str] {
        &[]
    }
    fn run(&self, ctx: &PipelineContext, log: &mut StageLog<'_>) -> anyhow::Result<StageOutput>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageOutput {
    pub body: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl StageOutput {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            fields: Map::new(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineContext {
    entries: BTreeMap<String, StageOutput>,
}

impl PipelineContext {
    pub fn get(&self, key: &str) -> Option<&StageOutput> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn require(&self, key: &str) -> anyhow::Result<&StageOutput> {
        self.entries
            .get(key)
            .ok_or_else(|| anyhow!("no pipeline output recorded under key '{key}'"))
    }

    pub fn field(&self, key: &str, name: &str) -> Option<&Value> {
        self.entries
            .get(key)
            .and_then(|output| output.fields.get(name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Each key is written exactly once, by the stage that owns it. The
    // construction-time key checks make a second write unreachable.
    fn insert(&mut self, key: String, output: StageOutput) {
        let previous = self.entries.insert(key, output);
        debug_assert!(previous.is_none());
    }
}

pub type StepCallback = Box<dyn FnMut(&StepSummary) -> anyhow::Result<()>>;

#[derive(Default)]
pub struct RunOptions {
    pub steps: Option<Vec<String>>,
    pub continue_on_error: bool,
    pub on_step_complete: Option<StepCallback>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub total_stages: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_extra_metric: u64,
}

impl Aggregate {
    pub fn tally<'a>(
        summaries: impl IntoIterator<Item = &'a StepSummary>,
        metric_key: &str,
    ) -> Self {
        let mut aggregate = Self::default();
        for summary in summaries {
            aggregate.total_stages += 1;
            match summary.status {
                StepStatus::Completed => {
                    aggregate.completed += 1;
                    aggregate.total_extra_metric += summary
                        .extra
                        .get(metric_key)
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                }
                StepStatus::Skipped => aggregate.skipped += 1,
                StepStatus::Failed => aggregate.failed += 1,
            }
        }
        aggregate
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub context: PipelineContext,
    pub summaries: BTreeMap<String, StepSummary>,
    pub completed_at: DateTime<Utc>,
    pub aggregate: Aggregate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    aliases: AliasTable,
    metric_key: &'static str,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.key()).collect::<Vec<_>>(),
            )
            .field("aliases", &self.aliases)
            .field("metric_key", &self.metric_key)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        stages: Vec<Box<dyn Stage>>,
        metric_key: &'static str,
    ) -> Result<Self, PipelineError> {
        let mut declared: HashSet<&str> = HashSet::with_capacity(stages.len());
        for stage in &stages {
            for requirement in stage.requires() {
                if !declared.contains(requirement) {
                    return Err(PipelineError::UnknownRequirement {
                        stage: stage.key().to_string(),
                        requirement: requirement.to_string(),
                    });
                }
            }
            if !declared.insert(stage.key()) {
                return Err(PipelineError::DuplicateStageKey(stage.key().to_string()));
            }
        }

        let aliases = AliasTable::build(stages.iter().map(|s| (s.key(), s.label())));
        Ok(Self {
            stages,
            aliases,
            metric_key,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    pub fn stage_keys(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.key()).collect()
    }

    pub fn aliases_for(&self, key: &str) -> Vec<String> {
        self.aliases.spellings_for(key)
    }

    pub fn resolve_selection(&self, identifiers: &[String]) -> Result<Vec<String>, PipelineError> {
        self.aliases.resolve(identifiers)
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub fn run(
        &self,
        mut options: RunOptions,
        progress: &mut dyn FnMut(&str),
    ) -> Result<PipelineResult, PipelineError> {
        let selected: Option<HashSet<String>> = match options.steps.as_deref() {
            None | Some([]) => None,
            Some(identifiers) => Some(self.aliases.resolve(identifiers)?.into_iter().collect()),
        };

        self.metrics.reset();
        let run_started = Instant::now();
        let mut ctx = PipelineContext::default();
        let mut summaries: BTreeMap<String, StepSummary> = BTreeMap::new();
        let mut stopped_at = None;
        let mut reason = None;
        let mut any_failed = false;

        for stage in &self.stages {
            let key = stage.key();

            if let Some(selection) = &selected
                && !selection.contains(key)
            {
                debug!(stage = key, "Stage not selected; skipping");
                self.metrics.record_step(StepStatus::Skipped);
                summaries.insert(key.to_string(), StepSummary::skipped(key, stage.label()));
                continue;
            }

            let missing: Vec<String> = stage
                .requires()
                .iter()
                .filter(|requirement| !ctx.contains(requirement))
                .map(|requirement| requirement.to_string())
                .collect();
            if !missing.is_empty() {
                let err = MissingPrerequisite {
                    key: key.to_string(),
                    missing,
                };
                warn!(stage = key, "{err}");
                any_failed = true;
                self.metrics.record_step(StepStatus::Failed);
                self.metrics.record_halt();
                summaries.insert(
                    key.to_string(),
                    StepSummary::failed(key, stage.label(), 0.0, Vec::new(), err.to_string()),
                );
                stopped_at = Some(stage.label().to_string());
                reason = Some(format!("missing prerequisite: {err}"));
                break;
            }

            let timer = self.metrics.start_stage(key);
            let outcome = step::execute(stage.as_ref(), &ctx, progress);
            drop(timer);

            match outcome.result {
                Ok(output) => {
                    let summary = StepSummary::completed(
                        key,
                        stage.label(),
                        outcome.duration_ms,
                        outcome.logs,
                        output.extra.clone(),
                    );
                    ctx.insert(key.to_string(), output);
                    self.metrics.record_step(StepStatus::Completed);
                    self.notify(&summary, &mut options);
                    summaries.insert(key.to_string(), summary);
                }
                Err(err) => {
                    warn!(stage = key, error = %err.source, "Stage failed");
                    any_failed = true;
                    self.metrics.record_step(StepStatus::Failed);
                    summaries.insert(
                        key.to_string(),
                        StepSummary::failed(
                            key,
                            stage.label(),
                            outcome.duration_ms,
                            outcome.logs,
                            format!("{:#}", err.source),
                        ),
                    );
                    if !options.continue_on_error {
                        stopped_at = Some(stage.label().to_string());
                        reason = Some(err.to_string());
                        self.metrics.record_halt();
                        break;
                    }
                }
            }
        }

        self.metrics.record_total_duration(run_started.elapsed());

        Ok(PipelineResult {
            success: !any_failed,
            aggregate: Aggregate::tally(summaries.values(), self.metric_key),
            context: ctx,
            summaries,
            completed_at: Utc::now(),
            stopped_at,
            reason,
        })
    }

    // Telemetry must never be able to abort or alter the run.
    fn notify(&self, summary: &StepSummary, options: &mut RunOptions) {
        if let Some(callback) = options.on_step_complete.as_mut()
            && let Err(err) = callback(summary)
        {
            warn!(
                stage = summary.stage_key.as_str(),
                error = %err,
                "Step callback failed; continuing run"
            );
        }
    }
}
