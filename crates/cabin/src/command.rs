//! Command line definition for the cabin CLI.

use clap::{Parser, Subcommand};

/// Cabin: a Lima-backed guest VM per profile.
#[derive(Debug, Parser)]
#[command(name = "cabin", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Cabin subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start the guest, creating it if needed
    Start,
    /// Stop the guest
    Stop,
    /// Restart the guest with its last configuration
    Restart,
    /// Show the guest state and configuration
    Status,
    /// Open a login shell in the guest
    #[command(alias = "ssh")]
    Shell,
    /// Check host dependencies
    Deps,
    /// Print an environment variable as seen in the guest
    Env {
        /// Variable name
        name: String,
    },
    /// Print a config entry stored in the guest
    Get {
        /// Entry key
        key: String,
    },
    /// Store a config entry in the guest
    Set {
        /// Entry key
        key: String,
        /// Entry value
        value: String,
    },
    /// Run a command in the guest
    Run {
        /// Command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

impl Command {
    /// Whether the command changes the guest lifecycle.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Start | Self::Stop | Self::Restart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("cabin").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verbs() {
        assert_eq!(parse(&["start"]).unwrap(), Command::Start);
        assert_eq!(parse(&["ssh"]).unwrap(), Command::Shell);
        assert_eq!(
            parse(&["env", "PATH"]).unwrap(),
            Command::Env { name: "PATH".into() }
        );
        assert_eq!(
            parse(&["set", "foo", "bar"]).unwrap(),
            Command::Set {
                key: "foo".into(),
                value: "bar".into()
            }
        );
        assert_eq!(
            parse(&["run", "uname", "-a"]).unwrap(),
            Command::Run {
                args: vec!["uname".into(), "-a".into()]
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["run"]).is_err());
        assert!(parse(&["get"]).is_err());
        assert!(parse(&["stop", "now"]).is_err());
        assert!(parse(&["destroy"]).is_err());
    }

    #[test]
    fn test_is_lifecycle() {
        assert!(Command::Restart.is_lifecycle());
        assert!(!Command::Status.is_lifecycle());
    }
}
