use std::collections::HashMap;

use crate::error::PipelineError;

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    spellings: HashMap<String, String>,
    known: Vec<String>,
}

impl AliasTable {
    pub(crate) fn build<'a>(stages: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut table = Self::default();
        for (position, (key, label)) in stages.into_iter().enumerate() {
            let ordinal = position + 1;
            table.known.push(key.to_string());
            table.insert(key, key);
            table.insert(label, key);
            table.insert(&ordinal.to_string(), key);
            table.insert(&format!("{ordinal:02}"), key);
            table.insert(&format!("step{ordinal}"), key);
            table.insert(&format!("stage{ordinal}"), key);
            table.insert(&format!("s{ordinal}"), key);
        }
        table
    }

    // First spelling wins; canonical keys are inserted before generated forms.
    fn insert(&mut self, spelling: &str, key: &str) {
        let normalized = normalize(spelling);
        if normalized.is_empty() {
            return;
        }
        self.spellings.entry(normalized).or_insert_with(|| key.to_string());
    }

    pub fn resolve(&self, identifiers: &[String]) -> Result<Vec<String>, PipelineError> {
        let mut resolved = Vec::with_capacity(identifiers.len());
        let mut unknown = Vec::new();
        for identifier in identifiers {
            match self.spellings.get(&normalize(identifier)) {
                Some(key) => resolved.push(key.clone()),
                None => unknown.push(identifier.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(resolved)
        } else {
            Err(PipelineError::UnknownStages {
                identifiers: unknown,
                known: self.known.clone(),
            })
        }
    }

    pub fn spellings_for(&self, key: &str) -> Vec<String> {
        let mut matches: Vec<String> = self
            .spellings
            .iter()
            .filter(|(_, canonical)| canonical.as_str() == key)
            .map(|(spelling, _)| spelling.clone())
            .collect();
        matches.sort();
        matches
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}
