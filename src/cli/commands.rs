// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `productions`, `parse` and
// `evaluate`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, u64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use crate::application::evaluate_use_case::ParserConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the ordered action vocabulary with ids
    Productions,

    /// Convert a logical form into its action sequence
    Parse(ParseArgs),

    /// Run search, execution and scoring over a DROP file
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// s-expression, e.g. "(find_passageSpanAnswer find_PassageAttention)"
    #[arg(long)]
    pub logical_form: String,
}

/// All arguments for the `evaluate` command.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// JSON file (or directory of JSON files) with preprocessed instances
    #[arg(long, default_value = "data/drop_dev.json")]
    pub data: String,

    /// Where parser_config.json, action_vocab.json, metrics.csv
    /// and predictions.json are written
    #[arg(long, default_value = "runs")]
    pub output_dir: String,

    /// Instances per forward pass
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Derivations kept per instance at every step
    #[arg(long, default_value_t = 10)]
    pub beam_size: usize,

    /// Successors kept per parent state (all if unset)
    #[arg(long)]
    pub per_node_beam_size: Option<usize>,

    #[arg(long, default_value_t = 12)]
    pub max_decoding_steps: usize,

    /// Return derivations still unfinished at the step limit
    #[arg(long)]
    pub keep_unfinished: bool,

    /// Width of the hashed token embeddings
    #[arg(long, default_value_t = 64)]
    pub encoder_dim: usize,

    #[arg(long, default_value_t = 13)]
    pub encoder_seed: u64,

    /// Constrain strongly supervised instances to their gold program
    #[arg(long)]
    pub gold_programs: bool,

    /// Inject gold attentions and event groundings during execution
    #[arg(long)]
    pub supervise_attention: bool,

    /// Evaluate at most this many instances
    #[arg(long)]
    pub limit: Option<usize>,

    /// Shuffle instances with this seed before applying --limit
    #[arg(long)]
    pub shuffle_seed: Option<u64>,
}

/// Convert CLI EvaluateArgs into the application-layer ParserConfig.
/// The application layer never sees clap types.
impl From<EvaluateArgs> for ParserConfig {
    fn from(a: EvaluateArgs) -> Self {
        ParserConfig {
            data_path:                    a.data,
            output_dir:                   a.output_dir,
            batch_size:                   a.batch_size,
            beam_size:                    a.beam_size,
            per_node_beam_size:           a.per_node_beam_size,
            max_decoding_steps:           a.max_decoding_steps,
            keep_final_unfinished_states: a.keep_unfinished,
            encoder_dim:                  a.encoder_dim,
            encoder_seed:                 a.encoder_seed,
            gold_programs:                a.gold_programs,
            supervise_attention:          a.supervise_attention,
            limit:                        a.limit,
            shuffle_seed:                 a.shuffle_seed,
        }
    }
}
