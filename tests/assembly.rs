use std::fs;
use std::sync::Arc;

use docket_assemble::drafting::TemplateBackend;
use docket_assemble::matter::Matter;
use docket_assemble::pipeline::RunOptions;
use docket_assemble::presets::render_preset;
use docket_assemble::snapshot::{FsSnapshotStore, NullSnapshotStore};
use docket_assemble::stages;
use docket_assemble::step::StepStatus;
use serde_json::Value;
use tempfile::tempdir;

fn preset_matter() -> Matter {
    serde_yaml::from_str(&render_preset("demand-letter").unwrap()).unwrap()
}

#[test]
fn full_run_assembles_and_writes_the_document() {
    let temp = tempdir().unwrap();
    let mut matter = preset_matter();
    matter.output.directory = temp.path().join("out");

    let pipeline = stages::default_pipeline(
        Arc::new(matter),
        Arc::new(TemplateBackend),
        Arc::new(FsSnapshotStore::new(temp.path().join("snapshots"))),
    )
    .unwrap();

    let mut progress = Vec::new();
    let mut sink = |line: &str| progress.push(line.to_string());
    let result = pipeline.run(RunOptions::default(), &mut sink).unwrap();

    assert!(result.success, "reason: {:?}", result.reason);
    assert_eq!(result.summaries.len(), 7);
    for summary in result.summaries.values() {
        assert_eq!(summary.status, StepStatus::Completed, "{}", summary.stage_key);
    }
    assert!(!progress.is_empty());

    let document_path = temp.path().join("out").join("ACME-2025-014-demand.md");
    assert!(document_path.is_file());
    let document = fs::read_to_string(&document_path).unwrap();
    assert!(document.contains("# Letter of Demand"));
    assert!(document.contains("## Statement of Facts"));
    assert!(document.contains("## Claims"));
    assert!(document.contains("## Relief Sought"));
    assert!(document.contains("Breach of Contract"));
    assert!(document.contains("20760.75")); // 18450.00 + 2310.75 in the demand line

    assert_eq!(
        result.context.field("assemble", "output_path").and_then(Value::as_str),
        Some(document_path.to_string_lossy().as_ref())
    );

    for snapshot in ["caption.md", "facts.md", "claims.md", "relief.md", "document.md"] {
        assert!(
            temp.path().join("snapshots").join(snapshot).is_file(),
            "missing snapshot {snapshot}"
        );
    }

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.steps_completed, 7);
    assert_eq!(snapshot.steps_failed, 0);
    assert!(snapshot.stages.contains_key("assemble"));
    let prometheus = snapshot.to_prometheus();
    assert!(prometheus.contains("docket_stage_calls_total{stage=\"assemble\"}"));
    assert!(prometheus.contains("docket_steps_completed_total 7"));
}

#[test]
fn partial_run_skips_drafting_and_writes_nothing() {
    let temp = tempdir().unwrap();
    let mut matter = preset_matter();
    matter.output.directory = temp.path().join("out");

    let pipeline = stages::default_pipeline(
        Arc::new(matter),
        Arc::new(TemplateBackend),
        Arc::new(NullSnapshotStore),
    )
    .unwrap();

    let options = RunOptions {
        steps: Some(vec!["intake".into(), "classify".into()]),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut |_line: &str| {}).unwrap();

    assert!(result.success);
    assert_eq!(result.summaries["intake"].status, StepStatus::Completed);
    assert_eq!(result.summaries["classify"].status, StepStatus::Completed);
    for key in ["caption", "facts", "claims", "relief", "assemble"] {
        assert_eq!(result.summaries[key].status, StepStatus::Skipped);
    }
    assert!(!temp.path().join("out").exists());

    let categories: Vec<&str> = result
        .context
        .field("classify", "categories")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(categories.contains(&"breach_of_contract"));
    assert!(categories.contains(&"property_damage"));
}

#[test]
fn selecting_assemble_without_its_inputs_halts_with_prerequisite_reason() {
    let temp = tempdir().unwrap();
    let mut matter = preset_matter();
    matter.output.directory = temp.path().join("out");

    let pipeline = stages::default_pipeline(
        Arc::new(matter),
        Arc::new(TemplateBackend),
        Arc::new(NullSnapshotStore),
    )
    .unwrap();

    let options = RunOptions {
        steps: Some(vec!["assemble".into()]),
        ..RunOptions::default()
    };
    let result = pipeline.run(options, &mut |_line: &str| {}).unwrap();

    assert!(!result.success);
    assert_eq!(result.summaries["assemble"].status, StepStatus::Failed);
    assert!(
        result
            .reason
            .as_deref()
            .unwrap()
            .contains("missing prerequisite"),
    );
    assert!(!temp.path().join("out").exists());
}
