//! CLI - command-line argument parsing.
//!
//! Defines the CLI structure using clap. Keeps argument parsing separate
//! from execution logic.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// medic - sandbox runtime diagnostics
#[derive(Parser)]
#[command(name = "medicctl")]
#[command(about = "Diagnose and fix sandbox runtime environment problems", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to tool settings (overrides the system and user locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level log output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run every probe and print the diagnostic report
    Diagnose {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Apply remediations by identifier
    Fix {
        /// Remediation identifiers, applied in the order given
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<String>,

        /// Apply every registered remediation in catalog order
        #[arg(long)]
        all: bool,

        /// Assume "yes" for destructive-remediation confirmations
        #[arg(long, short)]
        yes: bool,
    },

    /// Enumerate registered probes and remediations
    List {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_diagnose() {
        let cli = Cli::try_parse_from(["medicctl", "diagnose"]).unwrap();
        assert!(matches!(cli.command, Commands::Diagnose { json: false }));
    }

    #[test]
    fn test_parse_fix_ids_in_order() {
        let cli = Cli::try_parse_from(["medicctl", "fix", "restart-service", "cap-memory"])
            .unwrap();
        match cli.command {
            Commands::Fix { ids, all, yes } => {
                assert_eq!(ids, vec!["restart-service", "cap-memory"]);
                assert!(!all);
                assert!(!yes);
            }
            _ => panic!("expected fix"),
        }
    }

    #[test]
    fn test_fix_requires_ids_or_all() {
        assert!(Cli::try_parse_from(["medicctl", "fix"]).is_err());
        assert!(Cli::try_parse_from(["medicctl", "fix", "--all"]).is_ok());
    }

    #[test]
    fn test_fix_all_conflicts_with_ids() {
        assert!(Cli::try_parse_from(["medicctl", "fix", "--all", "cap-memory"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "medicctl",
            "list",
            "--config",
            "/tmp/medic.toml",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/medic.toml")));
    }
}
