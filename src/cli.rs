// Command-line parsing
// query_gateway [--config <path>] [command]

use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

pub const USAGE: &str = "\
Usage: query_gateway [--config <path>] [command]

Commands:
  serve                 run the HTTP endpoint (default)
  status                readiness and database list
  start                 start the database service
  stop                  stop the database service
  create <name>         create a database
  drop <name>           drop a database
  migrate <db> <file>   apply a SQL batch file
  smoke                 run the end-to-end smoke test
  config                print the effective configuration as TOML

Options:
  -c, --config <path>   configuration file, extension optional (default: config)
  -h, --help            print this help message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Status,
    Start,
    Stop,
    Create(String),
    Drop(String),
    Migrate { database: String, file: PathBuf },
    Smoke,
    Config,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config_path: String,
    pub command: Command,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CliError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("'{command}' expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

impl Cli {
    /// Parse the process arguments
    pub fn from_env() -> Result<Self, CliError> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse arguments, program name excluded
    pub fn parse<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config_path = DEFAULT_CONFIG_PATH.to_string();
        let mut positional = Vec::new();

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    config_path = args.next().ok_or(CliError::MissingArgument {
                        command: "--config",
                        expected: "<path>",
                    })?;
                }
                "-h" | "--help" => {
                    return Ok(Self {
                        config_path,
                        command: Command::Help,
                    })
                }
                _ if arg.starts_with("--config=") => {
                    config_path = arg["--config=".len()..].to_string();
                }
                _ if arg.starts_with('-') && arg.len() > 1 => {
                    return Err(CliError::UnknownOption(arg));
                }
                _ => positional.push(arg),
            }
        }

        Ok(Self {
            config_path,
            command: parse_command(positional)?,
        })
    }
}

fn parse_command(args: Vec<String>) -> Result<Command, CliError> {
    let mut args = args.into_iter();
    let Some(name) = args.next() else {
        return Ok(Command::Serve);
    };

    let command = match name.as_str() {
        "serve" => Command::Serve,
        "status" => Command::Status,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "smoke" => Command::Smoke,
        "config" => Command::Config,
        "help" => Command::Help,
        "create" => Command::Create(args.next().ok_or(CliError::MissingArgument {
            command: "create",
            expected: "<name>",
        })?),
        "drop" => Command::Drop(args.next().ok_or(CliError::MissingArgument {
            command: "drop",
            expected: "<name>",
        })?),
        "migrate" => {
            let missing = CliError::MissingArgument {
                command: "migrate",
                expected: "<db> <file>",
            };
            let database = args.next().ok_or_else(|| missing.clone())?;
            let file = args.next().ok_or(missing)?;
            Command::Migrate {
                database,
                file: PathBuf::from(file),
            }
        }
        _ => return Err(CliError::UnknownCommand(name)),
    };

    match args.next() {
        Some(extra) => Err(CliError::UnexpectedArgument(extra)),
        None => Ok(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, CliError> {
        Cli::parse(args.iter().copied())
    }

    #[test]
    fn test_default_is_serve() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.command, Command::Serve);
        assert_eq!(cli.config_path, DEFAULT_CONFIG_PATH);
    }

    #[test]
    fn test_config_option() {
        let cli = parse(&["--config", "/etc/gateway.toml", "status"]).unwrap();
        assert_eq!(cli.config_path, "/etc/gateway.toml");
        assert_eq!(cli.command, Command::Status);

        let cli = parse(&["smoke", "-c", "dev"]).unwrap();
        assert_eq!(cli.config_path, "dev");
        assert_eq!(cli.command, Command::Smoke);

        let cli = parse(&["--config=staging.toml"]).unwrap();
        assert_eq!(cli.config_path, "staging.toml");
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse(&["create", "codegen_dev"]).unwrap().command,
            Command::Create("codegen_dev".to_string())
        );
        assert_eq!(
            parse(&["drop", "codegen_dev"]).unwrap().command,
            Command::Drop("codegen_dev".to_string())
        );
        assert_eq!(
            parse(&["migrate", "codegen_dev", "sql/schema.sql"])
                .unwrap()
                .command,
            Command::Migrate {
                database: "codegen_dev".to_string(),
                file: PathBuf::from("sql/schema.sql"),
            }
        );
    }

    #[test]
    fn test_help() {
        assert_eq!(parse(&["-h"]).unwrap().command, Command::Help);
        assert_eq!(parse(&["help"]).unwrap().command, Command::Help);
        assert_eq!(parse(&["status", "--help"]).unwrap().command, Command::Help);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse(&["launch"]).unwrap_err(),
            CliError::UnknownCommand("launch".to_string())
        );
        assert_eq!(
            parse(&["--verbose"]).unwrap_err(),
            CliError::UnknownOption("--verbose".to_string())
        );
        assert!(matches!(
            parse(&["create"]).unwrap_err(),
            CliError::MissingArgument { command: "create", .. }
        ));
        assert!(matches!(
            parse(&["migrate", "codegen_dev"]).unwrap_err(),
            CliError::MissingArgument { command: "migrate", .. }
        ));
        assert!(matches!(
            parse(&["--config"]).unwrap_err(),
            CliError::MissingArgument { command: "--config", .. }
        ));
        assert_eq!(
            parse(&["status", "extra"]).unwrap_err(),
            CliError::UnexpectedArgument("extra".to_string())
        );
    }
}
