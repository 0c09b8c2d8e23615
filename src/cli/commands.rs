//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - serve: run the tool gateway on a Unix socket
//! - tools: list the gateway's catalog
//! - run: run one task to completion
//! - chat: interactive session (the default)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Toolpilot - bounded planner-driven tool orchestration
#[derive(Parser, Debug)]
#[command(name = "toolpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tool gateway server
    Serve {
        /// TOML tool catalog (stock tools when omitted)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Directory the stock tools operate in
        #[arg(short, long)]
        workdir: Option<PathBuf>,
    },

    /// List the tools published by the gateway
    Tools,

    /// Run a single task
    Run {
        /// Task description
        task: String,

        /// Maximum planner/dispatch rounds
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,

        /// Write the finished session as JSON to this file
        #[arg(short, long)]
        transcript: Option<PathBuf>,
    },

    /// Interactive session; each line is a task
    Chat {
        /// Maximum planner/dispatch rounds per task
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_no_args() {
        // No args means chat
        let cli = Cli::try_parse_from(["toolpilot"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["toolpilot", "-v"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["toolpilot", "-c", "/path/to/toolpilot.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/toolpilot.yml")));
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["toolpilot", "serve", "--catalog", "tools.toml", "-w", "/srv"]).unwrap();
        match cli.command {
            Some(Commands::Serve { catalog, workdir }) => {
                assert_eq!(catalog, Some(PathBuf::from("tools.toml")));
                assert_eq!(workdir, Some(PathBuf::from("/srv")));
            }
            _ => panic!("Expected serve command"),
        }
    }

    #[test]
    fn test_tools_command() {
        let cli = Cli::try_parse_from(["toolpilot", "tools"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Tools)));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["toolpilot", "run", "Check disk usage", "-n", "4", "--transcript", "out.json"])
            .unwrap();
        match cli.command {
            Some(Commands::Run {
                task,
                max_iterations,
                transcript,
            }) => {
                assert_eq!(task, "Check disk usage");
                assert_eq!(max_iterations, Some(4));
                assert_eq!(transcript, Some(PathBuf::from("out.json")));
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_requires_task() {
        assert!(Cli::try_parse_from(["toolpilot", "run"]).is_err());
    }

    #[test]
    fn test_chat_command() {
        let cli = Cli::try_parse_from(["toolpilot", "chat", "--max-iterations", "2"]).unwrap();
        match cli.command {
            Some(Commands::Chat { max_iterations }) => assert_eq!(max_iterations, Some(2)),
            _ => panic!("Expected chat command"),
        }
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }
}
