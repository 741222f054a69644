// ============================================================
// Layer 6 — Config Store
// ============================================================
// Persists what a run needs to be reproduced:
//
//   output_dir/
//     parser_config.json  ← search and encoder settings
//     action_vocab.json   ← ordered action strings; the position
//                           of an action is its id
//
// The vocabulary must come back in exactly the order it was
// written, otherwise saved action ids would point at different
// productions.
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::application::evaluate_use_case::ParserConfig;
use crate::language::vocab::ActionVocab;

const CONFIG_FILE: &str = "parser_config.json";
const VOCAB_FILE:  &str = "action_vocab.json";

pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// True when the directory already holds a saved run.
    pub fn has_saved_run(&self) -> bool {
        self.dir.join(CONFIG_FILE).exists()
    }

    pub fn save_config(&self, cfg: &ParserConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved parser config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<ParserConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    pub fn save_vocab(&self, vocab: &ActionVocab) -> Result<()> {
        let path = self.dir.join(VOCAB_FILE);
        let json = serde_json::to_string_pretty(vocab)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write vocabulary to '{}'", path.display()))?;

        tracing::debug!("Saved {} actions to '{}'", vocab.len(), path.display());
        Ok(())
    }

    pub fn load_vocab(&self) -> Result<ActionVocab> {
        let path = self.dir.join(VOCAB_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read vocabulary from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed vocabulary in '{}'", path.display()))
    }
}
