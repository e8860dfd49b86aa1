use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::StageError;
use crate::pipeline::{PipelineContext, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub stage_key: String,
    pub label: String,
    pub status: StepStatus,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl StepSummary {
    pub fn skipped(stage_key: &str, label: &str) -> Self {
        Self {
            stage_key: stage_key.to_string(),
            label: label.to_string(),
            status: StepStatus::Skipped,
            duration_ms: 0.0,
            error: None,
            logs: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn completed(
        stage_key: &str,
        label: &str,
        duration_ms: f64,
        logs: Vec<String>,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            stage_key: stage_key.to_string(),
            label: label.to_string(),
            status: StepStatus::Completed,
            duration_ms,
            error: None,
            logs,
            extra,
        }
    }

    pub fn failed(
        stage_key: &str,
        label: &str,
        duration_ms: f64,
        logs: Vec<String>,
        error: String,
    ) -> Self {
        Self {
            stage_key: stage_key.to_string(),
            label: label.to_string(),
            status: StepStatus::Failed,
            duration_ms,
            error: Some(error),
            logs,
            extra: Map::new(),
        }
    }
}

pub struct StageLog<'a> {
    stage_key: &'a str,
    lines: Vec<String>,
    sink: &'a mut dyn FnMut(&str),
}

impl StageLog<'_> {
    pub fn say(&mut self, line: impl Into<String>) {
        let line = line.into();
        (self.sink)(&line);
        debug!(stage = self.stage_key, "{line}");
        self.lines.push(line);
    }
}

pub(crate) struct StageOutcome {
    pub result: Result<crate::pipeline::StageOutput, StageError>,
    pub duration_ms: f64,
    pub logs: Vec<String>,
}

pub(crate) fn execute(
    stage: &dyn Stage,
    ctx: &PipelineContext,
    sink: &mut dyn FnMut(&str),
) -> StageOutcome {
    let mut log = StageLog {
        stage_key: stage.key(),
        lines: Vec::new(),
        sink,
    };
    let started = Instant::now();
    let result = stage.run(ctx, &mut log).map_err(|source| StageError {
        key: stage.key().to_string(),
        source,
    });
    let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
    StageOutcome {
        result,
        duration_ms,
        logs: log.lines,
    }
}
