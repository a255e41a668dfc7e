// External command runner
// Spawns a tool without a shell and bounds it with a wall-clock timeout

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::ControlError;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Split a configured command line on whitespace, e.g.
    /// `"sudo service postgresql start"`
    pub fn parse(command_line: &str) -> Result<Self, ControlError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(ControlError::EmptyCommand)?;
        Ok(Self::new(program).args(parts))
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    /// Display form used in errors and logs (environment omitted)
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, killing the child if `timeout` elapses first
    pub async fn run(&self, timeout: Duration) -> Result<CommandOutput, ControlError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| ControlError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ControlError::Timeout {
                    command: self.display(),
                    seconds: timeout.as_secs(),
                })
            }
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run and turn a non-zero exit into `ControlError::Failed`
    pub async fn run_checked(&self, timeout: Duration) -> Result<CommandOutput, ControlError> {
        let output = self.run(timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ControlError::Failed {
                command: self.display(),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }
}
