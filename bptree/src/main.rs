// Forbid unwrap() in production code to prevent panics from corrupt data.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::path::PathBuf;
use std::process::ExitCode;

use bptree::simulation;
use bptree::{BPlusTree, DirectoryStore, TreeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: bptree <dump|check> <tree-directory>";

enum Command {
    /// Print every node in pre-order.
    Dump(PathBuf),
    /// Verify the stored tree's structure without modifying it.
    Check(PathBuf),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Command> {
    let command = args.next()?;
    let dir = PathBuf::from(args.next()?);
    if args.next().is_some() {
        return None;
    }
    match command.as_str() {
        "dump" => Some(Command::Dump(dir)),
        "check" => Some(Command::Check(dir)),
        _ => None,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bptree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match TreeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(command) = parse_args(std::env::args().skip(1)) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    match command {
        Command::Dump(dir) => {
            if !dir.is_dir() {
                tracing::error!("{} is not a directory", dir.display());
                return ExitCode::FAILURE;
            }
            let dump = BPlusTree::open(&dir, &config).and_then(|mut tree| tree.dump());
            match dump {
                Ok(text) => {
                    print!("{text}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!("Failed to dump {}: {e}", dir.display());
                    ExitCode::FAILURE
                }
            }
        }
        Command::Check(dir) => {
            let violations =
                simulation::check(&mut DirectoryStore::new(false), &dir, config.order);
            if violations.is_empty() {
                tracing::info!("{}: no violations (order {})", dir.display(), config.order);
                return ExitCode::SUCCESS;
            }
            for violation in &violations {
                println!("{violation}");
            }
            tracing::error!(
                "{}: {} violation(s) found",
                dir.display(),
                violations.len()
            );
            ExitCode::FAILURE
        }
    }
}
