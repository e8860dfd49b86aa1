use anyhow::Result;

pub struct DraftRequest<'a> {
    pub section: &'a str,
    pub lead_in: String,
    pub source: String,
}

pub trait DraftBackend: Send + Sync {
    fn draft(&self, request: &DraftRequest<'_>) -> Result<String>;
}

// Deterministic phrasebook renderer. A hosted generation service would plug
// in behind the same trait, with its own retry and timeout discipline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateBackend;

impl DraftBackend for TemplateBackend {
    fn draft(&self, request: &DraftRequest<'_>) -> Result<String> {
        let mut paragraphs = Vec::new();
        if !request.lead_in.trim().is_empty() {
            paragraphs.push(request.lead_in.trim().to_string());
        }
        let source = reflow(&request.source);
        if !source.is_empty() {
            paragraphs.push(source);
        }
        Ok(paragraphs.join("\n\n"))
    }
}

fn reflow(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
