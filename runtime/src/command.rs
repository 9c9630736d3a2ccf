//! A probe that runs a shell command.

use crate::error::ProbeError;
use crate::probe::Probe;
use async_trait::async_trait;
use converge_engine::{Observation, WaiterSpec};
use tokio::process::Command;

/// Runs a program and reads the status label from its output.
///
/// On exit code 0 the first line of trimmed stdout is the label and the
/// whole trimmed stdout is the value. The configured not-found exit code
/// reports the resource as missing. Any other exit is a probe error.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    not_found_exit_code: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("command terminated by signal")]
    Terminated,

    #[error("waiting for a resource to disappear needs a not-found exit code")]
    NotFoundUnreportable,
}

impl CommandProbe {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            not_found_exit_code: None,
        }
    }

    /// Build from an argv list. Returns `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn not_found_exit_code(mut self, code: i32) -> Self {
        self.not_found_exit_code = Some(code);
        self
    }

    /// Check that this probe can ever satisfy `spec`. A wait for absence
    /// only succeeds on a not-found result, which needs an exit code for it.
    pub fn check_waiter(&self, spec: &WaiterSpec) -> Result<(), CommandError> {
        if spec.waits_for_absence() && self.not_found_exit_code.is_none() {
            return Err(CommandError::NotFoundUnreportable);
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for CommandProbe {
    type Value = String;

    async fn probe(&self) -> Result<Observation<String>, ProbeError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ProbeError::other)?;

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let label = stdout.lines().next().unwrap_or_default().trim().to_string();
                tracing::trace!(program = %self.program, %label, "command probe");
                Ok(Observation::found(stdout, label))
            }
            Some(code) if Some(code) == self.not_found_exit_code => Ok(Observation::NotFound),
            Some(code) => Err(ProbeError::other(CommandError::Failed {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })),
            None => Err(ProbeError::other(CommandError::Terminated)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandProbe {
        CommandProbe::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn first_line_is_the_label() {
        let probe = sh("printf '  Available\\nid=42\\n'");
        let observation = probe.probe().await.unwrap();
        assert_eq!(
            observation,
            Observation::found("Available\nid=42".to_string(), "Available")
        );
    }

    #[tokio::test]
    async fn configured_exit_code_means_not_found() {
        let probe = sh("exit 3").not_found_exit_code(3);
        assert_eq!(probe.probe().await.unwrap(), Observation::NotFound);
    }

    #[tokio::test]
    async fn other_exit_codes_are_errors() {
        let probe = sh("echo throttled >&2; exit 2").not_found_exit_code(3);
        let err = probe.probe().await.unwrap_err();
        assert_eq!(err.to_string(), "command exited with status 2: throttled");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let probe = CommandProbe::new("converge-no-such-program", Vec::<String>::new());
        assert!(!probe.probe().await.unwrap_err().is_not_found());
    }

    #[test]
    fn absence_wait_needs_not_found_exit_code() {
        let absence = WaiterSpec::builder()
            .pending(["Deleting"])
            .timeout(std::time::Duration::from_secs(60))
            .poll_interval(std::time::Duration::from_secs(1))
            .not_found_tolerance(0)
            .continuous_target_occurrence(1)
            .build()
            .unwrap();

        let err = sh("echo Deleting").check_waiter(&absence).unwrap_err();
        assert!(matches!(err, CommandError::NotFoundUnreportable));
        assert!(sh("echo Deleting")
            .not_found_exit_code(4)
            .check_waiter(&absence)
            .is_ok());

        let update = WaiterSpec::builder()
            .pending(["Pending"])
            .target(["Available"])
            .timeout(std::time::Duration::from_secs(60))
            .poll_interval(std::time::Duration::from_secs(1))
            .not_found_tolerance(0)
            .continuous_target_occurrence(1)
            .build()
            .unwrap();
        assert!(sh("echo Pending").check_waiter(&update).is_ok());
    }

    #[test]
    fn from_argv_requires_a_program() {
        assert!(CommandProbe::from_argv(&[]).is_none());
        let probe = CommandProbe::from_argv(&["aws".into(), "status".into()]).unwrap();
        assert_eq!(probe.program, "aws");
        assert_eq!(probe.args, vec!["status"]);
    }
}
