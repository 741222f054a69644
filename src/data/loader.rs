// ============================================================
// Layer 4 — Instance Loader
// ============================================================
// Loads preprocessed DROP instances from JSON.
//
// Accepted inputs:
//   - one .json file holding an array of instances or a single
//     instance
//   - a directory: every .json file in it, in file-name order
//
// After parsing, each instance is completed:
//   - missing token → char offset tables are rebuilt by locating
//     each token in the raw text
//   - instances with answer texts but no passage spans get their
//     spans from `find_valid_spans`
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::data::spans::find_valid_spans;
use crate::domain::instance::DropInstance;
use crate::domain::traits::InstanceSource;

#[derive(Deserialize)]
#[serde(untagged)]
enum InstanceFile {
    Many(Vec<DropInstance>),
    One(Box<DropInstance>),
}

impl InstanceFile {
    fn into_instances(self) -> Vec<DropInstance> {
        match self {
            InstanceFile::Many(instances) => instances,
            InstanceFile::One(instance) => vec![*instance],
        }
    }
}

pub struct JsonInstanceLoader {
    path: String,
}

impl JsonInstanceLoader {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl InstanceSource for JsonInstanceLoader {
    fn load_all(&self) -> Result<Vec<DropInstance>> {
        let path = Path::new(&self.path);

        if !path.exists() {
            tracing::warn!("Data path '{}' does not exist, returning no instances", self.path);
            return Ok(Vec::new());
        }

        let mut instances = Vec::new();
        if path.is_dir() {
            let mut files: Vec<_> = fs::read_dir(path)
                .with_context(|| format!("Cannot read directory '{}'", self.path))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect();
            files.sort();

            for file in files {
                match load_file(&file) {
                    Ok(loaded) => {
                        tracing::debug!("Loaded {} instances from {}", loaded.len(), file.display());
                        instances.extend(loaded);
                    }
                    Err(e) => tracing::warn!("Skipping '{}': {:#}", file.display(), e),
                }
            }
        } else {
            instances = load_file(path)?;
        }

        let instances: Vec<DropInstance> = instances.into_iter().map(prepare_instance).collect();
        tracing::info!("Loaded {} instances", instances.len());
        Ok(instances)
    }
}

fn load_file(path: &Path) -> Result<Vec<DropInstance>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    let file: InstanceFile = serde_json::from_str(&text)
        .with_context(|| format!("Cannot parse instances in '{}'", path.display()))?;
    Ok(file.into_instances())
}

/// Fill in the derived fields an instance file may omit.
pub fn prepare_instance(mut instance: DropInstance) -> DropInstance {
    if instance.question_token_offsets.len() != instance.question_tokens.len() {
        instance.question_token_offsets = token_offsets(&instance.question, &instance.question_tokens);
    }
    if instance.passage_token_offsets.len() != instance.passage_tokens.len() {
        instance.passage_token_offsets = token_offsets(&instance.passage, &instance.passage_tokens);
    }

    if !instance.answer.has_passage_spans() && !instance.answer.texts.is_empty() {
        let spans = find_valid_spans(&instance.passage_tokens, &instance.answer.texts);
        if spans.is_empty() {
            tracing::debug!(query_id = %instance.query_id, "No passage span matches the answer texts");
        }
        instance.answer.passage_spans = spans;
    }
    instance
}

/// Char offsets `[start, end)` of each token, searched left to
/// right. A token missing from the text gets an empty range at
/// the current position.
pub fn token_offsets(text: &str, tokens: &[String]) -> Vec<[usize; 2]> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = 0;

    tokens
        .iter()
        .map(|token| {
            let needle: Vec<char> = token.chars().collect();
            let found = (cursor..chars.len())
                .find(|&i| !needle.is_empty() && chars[i..].starts_with(&needle));
            match found {
                Some(start) => {
                    cursor = start + needle.len();
                    [start, cursor]
                }
                None => [cursor, cursor],
            }
        })
        .collect()
}
