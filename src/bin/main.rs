//! Content Pack Merge CLI
//!
//! Command-line tool for merging vehicle add-on content packs.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use dlc_merge::archive::find_pack_files;
use dlc_merge::loader::source_id_from_path;
use dlc_merge::{MergeError, MergeOptions, MergeSession, DEFAULT_NESTED_DEPTH};

#[derive(Parser)]
#[command(name = "dlc-merge")]
#[command(about = "Merge vehicle add-on content packs into a single consistent pack")]
#[command(version)]
struct Cli {
    /// Source pack, or a directory scanned recursively for packs.
    /// Repeatable; order sets merge priority (first wins).
    #[arg(short = 'i', long = "input", value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,

    /// Destination pack path
    #[arg(short = 'o', long = "output", value_name = "PATH", required = true)]
    output: PathBuf,

    /// Print each source's flattened entry tree
    #[arg(short = 's', long = "show-structure")]
    show_structure: bool,

    /// Expand nested packs (pass false to keep them opaque)
    #[arg(
        short = 'n',
        long = "expand-nested",
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    expand_nested: bool,

    /// Debug-level logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Overwrite an existing output pack
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Run the analysis and merge but skip writing the output pack
    #[arg(short = 'd', long = "dry-run")]
    dry_run: bool,

    /// Include all discovered content, bypassing dependency analysis
    #[arg(short = 'a', long = "merge-all")]
    merge_all: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Expand directory inputs into the pack files beneath them
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, MergeError> {
    let mut found = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let packs = find_pack_files(input)?;
            if packs.is_empty() {
                warn!(path = %input.display(), "no packs found under directory");
            }
            found.extend(packs);
        } else if input.is_file() {
            found.push(input.clone());
        } else {
            return Err(MergeError::InvalidPath(input.clone()));
        }
    }
    Ok(found)
}

fn run(cli: &Cli) -> Result<(), MergeError> {
    let inputs = collect_inputs(&cli.inputs)?;

    let options = MergeOptions {
        pack_name: source_id_from_path(&cli.output),
        max_depth: if cli.expand_nested { DEFAULT_NESTED_DEPTH } else { 0 },
        merge_all: cli.merge_all,
        dry_run: cli.dry_run,
        force: cli.force,
        show_structure: cli.show_structure,
    };

    let mut session = MergeSession::new(options);
    for input in &inputs {
        session.add_source(input);
    }

    let outcome = session.run(&cli.output)?;

    eprintln!(
        "Merged {} sources: {} entries, {} file conflicts, {} documents merged ({} duplicate items skipped)",
        outcome.stats.sources,
        outcome.stats.entries,
        outcome.stats.file_conflicts,
        outcome.stats.documents_merged,
        outcome.stats.duplicate_items_skipped
    );
    if cli.dry_run {
        eprintln!("Dry run: nothing was written to {}", cli.output.display());
    }

    if cli.dry_run || cli.verbose {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(error = %e, "failed to serialize run summary"),
        }
    }

    Ok(())
}

fn exit_code(error: &MergeError) -> i32 {
    if error.is_configuration() {
        2
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(exit_code(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parses_full_surface() {
        let cli = Cli::parse_from([
            "dlc-merge",
            "-i",
            "a.zip",
            "--input",
            "b.zip",
            "-o",
            "out.zip",
            "-s",
            "-v",
            "-f",
            "-d",
            "-a",
        ]);
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.output, Path::new("out.zip"));
        assert!(cli.show_structure);
        assert!(cli.expand_nested);
        assert!(cli.verbose && cli.force && cli.dry_run && cli.merge_all);
    }

    #[test]
    fn test_expand_nested_flag_forms() {
        let on = Cli::parse_from(["dlc-merge", "-i", "a", "-o", "out", "-n"]);
        assert!(on.expand_nested);

        let off = Cli::parse_from(["dlc-merge", "-i", "a", "-o", "out", "--expand-nested", "false"]);
        assert!(!off.expand_nested);
    }

    #[test]
    fn test_exit_codes_by_error_class() {
        assert_eq!(exit_code(&MergeError::InsufficientSources(1)), 2);
        assert_eq!(exit_code(&MergeError::OutputExists(PathBuf::from("x"))), 2);
        assert_eq!(
            exit_code(&MergeError::SourceLoad {
                path: "a".to_string(),
                reason: "corrupt".to_string()
            }),
            1
        );
    }

    #[test]
    fn test_collect_inputs_rejects_missing_path() {
        let err = collect_inputs(&[PathBuf::from("/does/not/exist")]).unwrap_err();
        assert!(matches!(err, MergeError::InvalidPath(_)));
    }
}
