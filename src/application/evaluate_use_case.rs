// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Orchestrates a full pass over a DROP file in order:
//
//   Step 1: Load instances            (Layer 4 - data)
//   Step 2: Sample / shuffle          (Layer 4 - data)
//   Step 3: Check any saved run, save config (Layer 6 - infra)
//   Step 4: Build dataset + loader    (Layer 4 - data)
//   Step 5: Forward pass per batch    (Layer 5 - ml)
//   Step 6: EM/F1 + CSV row per batch (Layer 6 - infra)
//   Step 7: Save vocabulary and predictions
//
// Re-running into a directory that already holds a run is allowed
// as long as the saved action vocabulary matches the grammar;
// otherwise saved action ids would name different productions.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §4 (Datasets and Dataloaders)

use anyhow::{bail, Context, Result};
use burn::{data::dataloader::DataLoaderBuilder, prelude::Backend};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::data::{
    batcher::DropBatcher,
    dataset::DropDataset,
    loader::JsonInstanceLoader,
    sampler::sample_instances,
};
use crate::domain::traits::{AnswerMetric, InstanceSource};
use crate::infra::{
    config_store::ConfigStore,
    metrics::{BatchMetrics, EmF1Metric, MetricsLogger},
};
use crate::language::vocab::ActionVocab;
use crate::ml::parser::{DropParser, Prediction};
use crate::search::beam::BeamSearchConfig;

type EvalBackend = burn::backend::NdArray;

// ─── Parser Configuration ─────────────────────────────────────────────────────
// Everything a run depends on. Serialisable so it can be saved
// next to the results and reloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub data_path:                    String,
    pub output_dir:                   String,
    pub batch_size:                   usize,
    pub beam_size:                    usize,
    pub per_node_beam_size:           Option<usize>,
    pub max_decoding_steps:           usize,
    pub keep_final_unfinished_states: bool,
    pub encoder_dim:                  usize,
    pub encoder_seed:                 u64,
    /// Use gold programs for strongly supervised instances
    pub gold_programs:                bool,
    /// Inject gold attentions and groundings before execution
    pub supervise_attention:          bool,
    pub limit:                        Option<usize>,
    pub shuffle_seed:                 Option<u64>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            data_path:                    "data/drop_dev.json".to_string(),
            output_dir:                   "runs".to_string(),
            batch_size:                   8,
            beam_size:                    10,
            per_node_beam_size:           None,
            max_decoding_steps:           12,
            keep_final_unfinished_states: false,
            encoder_dim:                  64,
            encoder_seed:                 13,
            gold_programs:                false,
            supervise_attention:          false,
            limit:                        None,
            shuffle_seed:                 None,
        }
    }
}

impl ParserConfig {
    pub fn search_config(&self) -> BeamSearchConfig {
        BeamSearchConfig {
            beam_size:                    self.beam_size.max(1),
            per_node_beam_size:           self.per_node_beam_size,
            max_decoding_steps:           self.max_decoding_steps,
            keep_final_unfinished_states: self.keep_final_unfinished_states,
        }
    }
}

/// Result of one evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub predictions: Vec<Prediction>,
    pub instances:   usize,
    pub em:          f64,
    pub f1:          f64,
    /// Mean batch loss
    pub loss:        f64,
}

// ─── EvaluateUseCase ──────────────────────────────────────────────────────────
pub struct EvaluateUseCase {
    config: ParserConfig,
}

impl EvaluateUseCase {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let cfg    = &self.config;
        let device = <EvalBackend as Backend>::Device::default();

        // ── Step 1+2: load and sample ────────────────────────────────────────
        tracing::info!("Loading instances from '{}'", cfg.data_path);
        let loader    = JsonInstanceLoader::new(&cfg.data_path);
        let instances = sample_instances(loader.load_all()?, cfg.limit, cfg.shuffle_seed);
        if instances.is_empty() {
            tracing::warn!("No instances to evaluate");
            return Ok(EvaluationReport { predictions: Vec::new(), instances: 0, em: 0.0, f1: 0.0, loss: 0.0 });
        }

        // ── Step 3: check saved run, save config ─────────────────────────────
        let parser = DropParser::new(cfg);
        let store  = ConfigStore::new(&cfg.output_dir)?;
        if store.has_saved_run() {
            match store.load_config() {
                Ok(previous) if previous != *cfg => {
                    tracing::warn!("Overwriting a run in '{}' made with different settings", cfg.output_dir)
                }
                Ok(_) => tracing::info!("Re-running saved configuration in '{}'", cfg.output_dir),
                Err(e) => tracing::warn!("Ignoring unreadable saved config: {:#}", e),
            }
            if let Ok(saved) = store.load_vocab() {
                if saved != ActionVocab::from(parser.grammar().all_possible_productions()) {
                    bail!("Action vocabulary saved in '{}' does not match the grammar", cfg.output_dir);
                }
            }
        }
        store.save_config(cfg)?;
        let logger = MetricsLogger::new(&cfg.output_dir)?;

        // ── Step 4: dataset and loader ───────────────────────────────────────
        let dataset = DropDataset::new(instances);
        tracing::info!(
            "Evaluating {} instances ({} supervisable) in batches of {}",
            dataset.instances().len(),
            dataset.supervisable_count(),
            cfg.batch_size.max(1),
        );
        let batches = DataLoaderBuilder::<EvalBackend, _, _>::new(DropBatcher::new())
            .batch_size(cfg.batch_size.max(1))
            .set_device(device.clone())
            .build(dataset);

        // ── Step 5+6: forward pass and metrics ───────────────────────────────
        let mut metric  = EmF1Metric::new();
        let mut vocab: Option<ActionVocab> = None;
        let mut predictions = Vec::new();
        let mut loss_sum    = 0.0f64;
        let mut batch_count = 0usize;

        for (index, batch) in batches.iter().enumerate() {
            tracing::debug!(
                "Batch {}: {} instances, longest question {} / passage {} tokens",
                index + 1,
                batch.instances.len(),
                batch.max_question_len,
                batch.max_passage_len,
            );
            let output = parser.forward::<EvalBackend>(&batch.instances, &device);

            if let Some(first) = &vocab {
                if *first != output.vocab {
                    tracing::warn!("Batch {} produced a different action vocabulary", index + 1);
                }
            } else {
                vocab = Some(output.vocab.clone());
            }

            for (prediction, instance) in output.predictions.iter().zip(&batch.instances) {
                metric.observe(&prediction.answer, &instance.answer.texts);
            }
            let (em, f1) = metric.metric();
            let loss     = f64::from(output.loss.model_loss + output.loss.exec_loss);
            logger.log(&BatchMetrics {
                batch:            index + 1,
                instances:        batch.instances.len(),
                loss,
                model_loss:       f64::from(output.loss.model_loss),
                exec_loss:        f64::from(output.loss.exec_loss),
                skipped_programs: output.loss.skipped_programs,
                em,
                f1,
            })?;
            tracing::info!("Batch {} | loss {:.4} | EM {:.4} | F1 {:.4}", index + 1, loss, em, f1);

            loss_sum    += loss;
            batch_count += 1;
            predictions.extend(output.predictions);
        }

        // ── Step 7: persist vocabulary and predictions ───────────────────────
        if let Some(vocab) = &vocab {
            store.save_vocab(vocab)?;
        }
        let path = PathBuf::from(&cfg.output_dir).join("predictions.json");
        fs::write(&path, serde_json::to_string_pretty(&predictions)?)
            .with_context(|| format!("Cannot write predictions to '{}'", path.display()))?;

        let (em, f1) = metric.metric();
        tracing::info!("Evaluation complete: EM {:.4}, F1 {:.4} over {} answers", em, f1, metric.count());
        Ok(EvaluationReport {
            instances: predictions.len(),
            predictions,
            em,
            f1,
            loss: loss_sum / batch_count.max(1) as f64,
        })
    }
}
