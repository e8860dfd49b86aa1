use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use docket_assemble::error::PipelineError;
use docket_assemble::pipeline::{Pipeline, PipelineContext, RunOptions, Stage, StageOutput};
use docket_assemble::step::{StageLog, StepStatus};
use serde_json::json;

struct ScriptedStage {
    key: &'static str,
    requires: &'static [&'static str],
    fails: bool,
    words: u64,
    runs: Option<Arc<AtomicUsize>>,
}

impl ScriptedStage {
    fn ok(key: &'static str, words: u64) -> Box<Self> {
        Box::new(Self {
            key,
            requires: &[],
            fails: false,
            words,
            runs: None,
        })
    }

    fn failing(key: &'static str) -> Box<Self> {
        Box::new(Self {
            key,
            requires: &[],
            fails: true,
            words: 0,
            runs: None,
        })
    }

    fn requiring(key: &'static str, requires: &'static [&'static str]) -> Box<Self> {
        Box::new(Self {
            key,
            requires,
            fails: false,
            words: 1,
            runs: None,
        })
    }

    fn counted(key: &'static str, runs: Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            key,
            requires: &[],
            fails: false,
            words: 1,
            runs: Some(runs),
        })
    }
}

impl Stage for ScriptedStage {
    fn key(&self) -> &'static str {
        self.key
    }

    fn label(&self) -> &str {
        self.key
    }

    fn requires(&self) -> &[&'static str] {
        self.requires
    }

    fn run(&self, _ctx: &PipelineContext, log: &mut StageLog<'_>) -> anyhow::Result<StageOutput> {
        if let Some(runs) = &self.runs {
            runs.fetch_add(1, Ordering::SeqCst);
        }
        if self.fails {
            bail!("scripted failure in {}", self.key);
        }
        log.say(format!("{} running", self.key));
        Ok(StageOutput::text(format!("{} section", self.key))
            .with_extra("words", json!(self.words)))
    }
}

fn pipeline(stages: Vec<Box<dyn Stage>>) -> Pipeline {
    Pipeline::new(stages, "words").unwrap()
}

fn discard(_line: &str) {}

#[test]
fn all_stages_complete_in_order() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 10),
        ScriptedStage::ok("s2", 20),
        ScriptedStage::ok("s3", 30),
    ]);

    let result = pipeline.run(RunOptions::default(), &mut discard).unwrap();

    assert!(result.success);
    assert_eq!(result.summaries.len(), 3);
    for key in ["s1", "s2", "s3"] {
        assert_eq!(result.summaries[key].status, StepStatus::Completed);
        assert!(result.context.contains(key));
    }
    assert_eq!(result.aggregate.total_stages, 3);
    assert_eq!(result.aggregate.completed, 3);
    assert_eq!(result.aggregate.skipped, 0);
    assert_eq!(result.aggregate.failed, 0);
    assert_eq!(result.aggregate.total_extra_metric, 60);
    assert!(result.stopped_at.is_none());
    assert!(result.reason.is_none());
}

#[test]
fn failure_halts_the_walk_by_default() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 1),
        ScriptedStage::failing("s2"),
        ScriptedStage::ok("s3", 1),
    ]);

    let result = pipeline.run(RunOptions::default(), &mut discard).unwrap();

    assert!(!result.success);
    assert_eq!(result.summaries.len(), 2);
    assert_eq!(result.summaries["s1"].status, StepStatus::Completed);
    assert_eq!(result.summaries["s2"].status, StepStatus::Failed);
    assert!(!result.summaries.contains_key("s3"));
    assert_eq!(result.stopped_at.as_deref(), Some("s2"));
    let reason = result.reason.unwrap();
    assert!(reason.contains("s2"), "unexpected reason: {reason}");
    assert!(
        result.summaries["s2"]
            .error
            .as_deref()
            .unwrap()
            .contains("scripted failure"),
    );
    assert_eq!(result.aggregate.total_stages, 2);
    assert_eq!(result.aggregate.failed, 1);
}

#[test]
fn continue_on_error_runs_later_stages() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 1),
        ScriptedStage::failing("s2"),
        ScriptedStage::ok("s3", 1),
    ]);

    let options = RunOptions {
        continue_on_error: true,
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(!result.success);
    assert_eq!(result.summaries.len(), 3);
    assert_eq!(result.summaries["s3"].status, StepStatus::Completed);
    assert!(result.stopped_at.is_none());
    assert_eq!(result.aggregate.completed, 2);
    assert_eq!(result.aggregate.failed, 1);
}

#[test]
fn selection_skips_without_halting() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 1),
        ScriptedStage::ok("s2", 1),
        ScriptedStage::ok("s3", 1),
    ]);

    let options = RunOptions {
        steps: Some(vec!["s1".into(), "s3".into()]),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(result.success);
    assert_eq!(result.summaries["s1"].status, StepStatus::Completed);
    assert_eq!(result.summaries["s2"].status, StepStatus::Skipped);
    assert_eq!(result.summaries["s3"].status, StepStatus::Completed);
    let skipped = &result.summaries["s2"];
    assert_eq!(skipped.duration_ms, 0.0);
    assert!(skipped.logs.is_empty());
    assert!(!result.context.contains("s2"));
    assert_eq!(result.aggregate.skipped, 1);
}

#[test]
fn empty_selection_means_all_stages() {
    let pipeline = pipeline(vec![ScriptedStage::ok("s1", 1), ScriptedStage::ok("s2", 1)]);

    let options = RunOptions {
        steps: Some(Vec::new()),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(result.success);
    assert_eq!(result.aggregate.completed, 2);
}

#[test]
fn full_selection_matches_no_selection() {
    let build = || {
        pipeline(vec![
            ScriptedStage::ok("s1", 5),
            ScriptedStage::ok("s2", 7),
            ScriptedStage::ok("s3", 9),
        ])
    };

    let unselected = build().run(RunOptions::default(), &mut discard).unwrap();
    let options = RunOptions {
        steps: Some(vec!["s1".into(), "s2".into(), "s3".into()]),
        ..RunOptions::default()
    };
    let selected = build().run(options, &mut discard).unwrap();

    assert_eq!(unselected.success, selected.success);
    assert_eq!(unselected.aggregate, selected.aggregate);
    for key in ["s1", "s2", "s3"] {
        assert_eq!(
            unselected.summaries[key].status,
            selected.summaries[key].status
        );
    }
}

#[test]
fn alias_spellings_select_like_canonical_keys() {
    let pipeline = pipeline(vec![ScriptedStage::ok("s1", 1), ScriptedStage::ok("s2", 1)]);

    let options = RunOptions {
        steps: Some(vec!["S1".into(), "STEP2".into()]),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(result.success);
    assert_eq!(result.summaries["s1"].status, StepStatus::Completed);
    assert_eq!(result.summaries["s2"].status, StepStatus::Completed);
}

#[test]
fn unknown_selection_fails_before_any_stage_runs() {
    let runs = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(vec![ScriptedStage::counted("s1", runs.clone())]);

    let options = RunOptions {
        steps: Some(vec!["s9".into()]),
        ..RunOptions::default()
    };
    let err = pipeline.run(options, &mut discard).unwrap_err();

    match err {
        PipelineError::UnknownStages { identifiers, .. } => {
            assert_eq!(identifiers, vec!["s9".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_prerequisite_halts_even_with_continue_on_error() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("base", 1),
        ScriptedStage::requiring("dependent", &["base"]),
    ]);

    let options = RunOptions {
        steps: Some(vec!["dependent".into()]),
        continue_on_error: true,
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(!result.success);
    assert_eq!(result.summaries["base"].status, StepStatus::Skipped);
    assert_eq!(result.summaries["dependent"].status, StepStatus::Failed);
    assert!(
        result.summaries["dependent"]
            .error
            .as_deref()
            .unwrap()
            .contains("base"),
    );
    assert_eq!(result.stopped_at.as_deref(), Some("dependent"));
    assert!(
        result
            .reason
            .as_deref()
            .unwrap()
            .contains("missing prerequisite"),
    );
}

#[test]
fn prerequisite_check_passes_when_upstream_completed() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("base", 1),
        ScriptedStage::requiring("dependent", &["base"]),
    ]);

    let result = pipeline.run(RunOptions::default(), &mut discard).unwrap();
    assert!(result.success);
    assert_eq!(result.summaries["dependent"].status, StepStatus::Completed);
}

#[test]
fn callback_errors_never_alter_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = calls.clone();
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 1),
        ScriptedStage::ok("s2", 1),
        ScriptedStage::ok("s3", 1),
    ]);

    let options = RunOptions {
        on_step_complete: Some(Box::new(move |_summary| {
            calls_seen.fetch_add(1, Ordering::SeqCst);
            bail!("telemetry sink unavailable");
        })),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(result.success);
    assert_eq!(result.aggregate.completed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn callback_fires_only_for_completed_stages() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 1),
        ScriptedStage::failing("s2"),
        ScriptedStage::ok("s3", 1),
    ]);

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_in_callback = seen.clone();
    let options = RunOptions {
        continue_on_error: true,
        on_step_complete: Some(Box::new(move |summary| {
            seen_in_callback
                .lock()
                .unwrap()
                .push(summary.stage_key.clone());
            Ok(())
        })),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();

    assert!(!result.success);
    assert_eq!(*seen.lock().unwrap(), vec!["s1".to_string(), "s3".into()]);
}

#[test]
fn stage_logs_are_buffered_and_forwarded_live() {
    let pipeline = pipeline(vec![ScriptedStage::ok("s1", 1)]);

    let mut streamed = Vec::new();
    let mut progress = |line: &str| streamed.push(line.to_string());
    let result = pipeline.run(RunOptions::default(), &mut progress).unwrap();

    assert_eq!(streamed, vec!["s1 running".to_string()]);
    assert_eq!(result.summaries["s1"].logs, streamed);
}

#[test]
fn failed_stage_still_reports_a_duration() {
    let pipeline = pipeline(vec![ScriptedStage::failing("s1")]);

    let result = pipeline.run(RunOptions::default(), &mut discard).unwrap();
    assert!(result.summaries["s1"].duration_ms >= 0.0);
    assert!(result.summaries["s1"].error.is_some());
}

#[test]
fn extra_metric_sums_only_completed_stages() {
    let pipeline = pipeline(vec![
        ScriptedStage::ok("s1", 100),
        ScriptedStage::failing("s2"),
        ScriptedStage::ok("s3", 50),
    ]);

    let options = RunOptions {
        continue_on_error: true,
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut discard).unwrap();
    assert_eq!(result.aggregate.total_extra_metric, 150);
}

#[test]
fn duplicate_stage_keys_are_rejected_at_construction() {
    let err = Pipeline::new(
        vec![ScriptedStage::ok("s1", 1), ScriptedStage::ok("s1", 1)],
        "words",
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateStageKey(key) if key == "s1"));
}

#[test]
fn requirements_must_name_an_earlier_stage() {
    let err = Pipeline::new(
        vec![
            ScriptedStage::requiring("first", &["second"]),
            ScriptedStage::ok("second", 1),
        ],
        "words",
    )
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnknownRequirement { stage, requirement }
            if stage == "first" && requirement == "second"
    ));
}
