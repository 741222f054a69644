// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `productions` — lists the grammar's actions
//   2. `parse`       — logical form → action sequence
//   3. `evaluate`    — runs the parser over a DROP file
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, ParseArgs};

#[derive(Parser, Debug)]
#[command(
    name = "drop-semparse",
    version = "0.1.0",
    about = "Grammar-constrained semantic parsing for DROP-style questions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Productions    => run_productions(),
            Commands::Parse(args)    => run_parse(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_productions() -> Result<()> {
    use crate::application::program_use_case::ProgramUseCase;

    for (id, action) in ProgramUseCase::new().productions() {
        println!("{id:>3}  {action}");
    }
    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<()> {
    use crate::application::program_use_case::ProgramUseCase;

    let parsed = ProgramUseCase::new().parse(&args.logical_form)?;
    println!("Start type: {}", parsed.start_type);
    for (id, action) in parsed.action_ids.iter().zip(&parsed.actions) {
        println!("{id:>3}  {action}");
    }
    println!("Logical form: {}", parsed.logical_form);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    tracing::info!("Evaluating instances from: {}", args.data);

    let report = EvaluateUseCase::new(args.into()).execute()?;
    for p in &report.predictions {
        println!("{}\t{}\t{}", p.query_id, p.answer, p.logical_form);
    }
    println!(
        "\n{} instances | EM {:.4} | F1 {:.4} | loss {:.4}",
        report.instances, report.em, report.f1, report.loss
    );
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::evaluate_use_case::ParserConfig;

    #[test]
    fn test_evaluate_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "drop-semparse", "evaluate",
            "--data", "dev.json",
            "--beam-size", "4",
            "--gold-programs",
            "--shuffle-seed", "9",
        ])
        .unwrap();
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        let cfg: ParserConfig = args.into();
        assert_eq!(cfg.data_path, "dev.json");
        assert_eq!(cfg.beam_size, 4);
        assert!(cfg.gold_programs);
        assert!(!cfg.supervise_attention);
        assert_eq!(cfg.shuffle_seed, Some(9));
        assert_eq!(cfg.max_decoding_steps, 12);
    }

    #[test]
    fn test_parse_requires_logical_form() {
        assert!(Cli::try_parse_from(["drop-semparse", "parse"]).is_err());
    }
}
