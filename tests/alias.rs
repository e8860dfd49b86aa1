use docket_assemble::error::PipelineError;
use docket_assemble::pipeline::{Pipeline, PipelineContext, Stage, StageOutput};
use docket_assemble::step::StageLog;

struct NamedStage {
    key: &'static str,
    label: &'static str,
}

impl Stage for NamedStage {
    fn key(&self) -> &'static str {
        self.key
    }

    fn label(&self) -> &str {
        self.label
    }

    fn run(&self, _ctx: &PipelineContext, _log: &mut StageLog<'_>) -> anyhow::Result<StageOutput> {
        Ok(StageOutput::text(self.key))
    }
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        vec![
            Box::new(NamedStage {
                key: "intake",
                label: "Matter intake",
            }),
            Box::new(NamedStage {
                key: "review",
                label: "Final review",
            }),
        ],
        "words",
    )
    .unwrap()
}

fn resolve(identifiers: &[&str]) -> Result<Vec<String>, PipelineError> {
    let identifiers: Vec<String> = identifiers.iter().map(|s| s.to_string()).collect();
    pipeline().resolve_selection(&identifiers)
}

#[test]
fn canonical_keys_resolve_to_themselves() {
    assert_eq!(resolve(&["intake", "review"]).unwrap(), vec!["intake", "review"]);
}

#[test]
fn spellings_are_case_and_punctuation_insensitive() {
    let resolved = resolve(&["INTAKE", "In-Take", "  intake  ", "in_take"]).unwrap();
    assert_eq!(resolved, vec!["intake"; 4]);
}

#[test]
fn numeric_and_prefixed_forms_resolve_by_position() {
    let resolved = resolve(&["1", "01", "step1", "stage1", "s1"]).unwrap();
    assert_eq!(resolved, vec!["intake"; 5]);

    let resolved = resolve(&["2", "02", "Step 2", "STAGE-2", "s2"]).unwrap();
    assert_eq!(resolved, vec!["review"; 5]);
}

#[test]
fn labels_are_accepted_spellings() {
    let resolved = resolve(&["Matter intake", "final-review"]).unwrap();
    assert_eq!(resolved, vec!["intake", "review"]);
}

#[test]
fn resolution_is_deterministic() {
    let first = resolve(&["Step 2", "intake"]).unwrap();
    let second = resolve(&["Step 2", "intake"]).unwrap();
    assert_eq!(first, second);
}

#[test]
fn every_unresolvable_identifier_is_reported_at_once() {
    let err = resolve(&["intake", "bogus", "also bad"]).unwrap_err();
    match err {
        PipelineError::UnknownStages { identifiers, known } => {
            assert_eq!(identifiers, vec!["bogus".to_string(), "also bad".into()]);
            assert_eq!(known, vec!["intake".to_string(), "review".into()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn alias_listing_covers_generated_forms() {
    let pipeline = pipeline();
    let aliases = pipeline.aliases_for("review");
    for expected in ["review", "finalreview", "2", "02", "step2", "stage2", "s2"] {
        assert!(
            aliases.iter().any(|alias| alias == expected),
            "missing alias '{expected}' in {aliases:?}"
        );
    }
}
