use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::step::StepStatus;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageMetrics>,
    pub total_duration_ms: f64,
    pub steps_completed: u64,
    pub steps_skipped: u64,
    pub steps_failed: u64,
    pub runs_halted: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn start_stage(&self, stage_key: &str) -> StageTimer {
        StageTimer {
            stage: stage_key.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_step(&self, status: StepStatus) {
        if let Ok(mut guard) = self.inner.lock() {
            match status {
                StepStatus::Completed => guard.steps_completed += 1,
                StepStatus::Skipped => guard.steps_skipped += 1,
                StepStatus::Failed => guard.steps_failed += 1,
            }
        }
    }

    pub fn record_halt(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.runs_halted += 1;
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl StageTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration = self.started_at.elapsed();
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.stages.entry(self.stage.clone()).or_default();
            metrics.calls += 1;
            let duration_ms = duration.as_secs_f64() * 1_000.0;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(
            stage = self.stage.as_str(),
            duration_ms = duration.as_secs_f64() * 1_000.0,
            "Stage duration recorded"
        );
        self.recorded = true;
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        stage_count = snapshot.stages.len(),
        steps_completed = snapshot.steps_completed,
        steps_skipped = snapshot.steps_skipped,
        steps_failed = snapshot.steps_failed,
        runs_halted = snapshot.runs_halted,
        "Assembly metrics summary"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Stage metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str("# HELP docket_steps_completed_total Total number of completed steps\n");
        output.push_str("# TYPE docket_steps_completed_total counter\n");
        output.push_str(&format!(
            "docket_steps_completed_total {}\n",
            self.steps_completed
        ));
        output.push_str("# HELP docket_steps_skipped_total Total number of skipped steps\n");
        output.push_str("# TYPE docket_steps_skipped_total counter\n");
        output.push_str(&format!(
            "docket_steps_skipped_total {}\n",
            self.steps_skipped
        ));
        output.push_str("# HELP docket_steps_failed_total Total number of failed steps\n");
        output.push_str("# TYPE docket_steps_failed_total counter\n");
        output.push_str(&format!("docket_steps_failed_total {}\n", self.steps_failed));
        output.push_str("# HELP docket_runs_halted_total Runs terminated before the last stage\n");
        output.push_str("# TYPE docket_runs_halted_total counter\n");
        output.push_str(&format!("docket_runs_halted_total {}\n", self.runs_halted));
        output.push_str("# HELP docket_stage_calls_total Stage invocation count\n");
        output.push_str("# TYPE docket_stage_calls_total counter\n");
        output.push_str(
            "# HELP docket_stage_duration_seconds_total Accumulated stage duration in seconds\n",
        );
        output.push_str("# TYPE docket_stage_duration_seconds_total counter\n");
        output.push_str(
            "# HELP docket_stage_duration_seconds_max Maximum stage duration in seconds\n",
        );
        output.push_str("# TYPE docket_stage_duration_seconds_max gauge\n");
        for (stage, metrics) in &self.stages {
            output.push_str(&format!(
                "docket_stage_calls_total{{stage=\"{}\"}} {}\n",
                stage, metrics.calls
            ));
            output.push_str(&format!(
                "docket_stage_duration_seconds_total{{stage=\"{}\"}} {:.6}\n",
                stage,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "docket_stage_duration_seconds_max{{stage=\"{}\"}} {:.6}\n",
                stage,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output.push_str("# HELP docket_run_duration_seconds Total assembly run duration\n");
        output.push_str("# TYPE docket_run_duration_seconds gauge\n");
        output.push_str(&format!(
            "docket_run_duration_seconds {:.6}\n",
            self.total_duration_ms / 1_000.0
        ));
        output
    }
}
