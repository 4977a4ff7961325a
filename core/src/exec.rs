use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Captured output of one external tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout and stderr concatenated for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

/// Builder for one external tool invocation with captured output.
///
/// Every engine and transport call goes through here: a missing binary
/// becomes [`Error::ToolLaunch`], a non-zero exit becomes
/// [`Error::ToolFailed`] carrying whatever the tool printed.
#[derive(Debug)]
pub struct ToolCommand {
    tool: &'static str,
    args: Vec<OsString>,
    envs: Vec<(&'static str, OsString)>,
    stdin: Option<Vec<u8>>,
}

impl ToolCommand {
    pub fn new(tool: &'static str) -> Self {
        Self {
            tool,
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &'static str, value: impl Into<OsString>) -> Self {
        self.envs.push((key, value.into()));
        self
    }

    /// Bytes written to the child's stdin, then the pipe is closed.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    fn build(&self) -> Command {
        let mut command = Command::new(self.tool);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
    }

    /// Run the tool to completion, capturing stdout and stderr.
    pub async fn run(self) -> Result<ToolOutput> {
        debug!(tool = self.tool, args = ?self.args, "running external tool");
        let mut command = self.build();
        command
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| Error::ToolLaunch {
            tool: self.tool,
            source,
        })?;

        if let Some(data) = self.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(&data).await?;
            }
        }

        let raw = child
            .wait_with_output()
            .await
            .map_err(|source| Error::ToolLaunch {
                tool: self.tool,
                source,
            })?;
        let output = ToolOutput {
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
        };

        if raw.status.success() {
            Ok(output)
        } else {
            Err(Error::ToolFailed {
                tool: self.tool,
                status: raw.status,
                output: output.combined(),
            })
        }
    }

    /// Spawn the tool and leave it running, for engines that stay in the
    /// foreground while something is mounted. After `grace`, an already
    /// exited child is treated as a failed launch. Stderr stays drained
    /// for the child's whole lifetime, so a chatty mount never blocks on
    /// a full pipe.
    pub async fn spawn_released(self, grace: Duration) -> Result<()> {
        debug!(tool = self.tool, args = ?self.args, "spawning external tool");
        let mut command = self.build();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| Error::ToolLaunch {
            tool: self.tool,
            source,
        })?;
        let mut stderr = child.stderr.take();
        tokio::time::sleep(grace).await;

        match child.try_wait()? {
            Some(status) if !status.success() => {
                let mut output = String::new();
                if let Some(pipe) = stderr.as_mut() {
                    pipe.read_to_string(&mut output).await?;
                }
                Err(Error::ToolFailed {
                    tool: self.tool,
                    status,
                    output,
                })
            }
            _ => {
                if let Some(mut pipe) = stderr.take() {
                    tokio::spawn(async move {
                        let mut sink = tokio::io::sink();
                        let _ = tokio::io::copy(&mut pipe, &mut sink).await;
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let output = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo hello")
            .run()
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_captured_output() {
        let err = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo broken >&2; exit 3")
            .run()
            .await
            .unwrap_err();
        match err {
            Error::ToolFailed { tool, output, .. } => {
                assert_eq!(tool, "sh");
                assert!(output.contains("broken"));
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let err = ToolCommand::new("loft-test-no-such-tool")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolLaunch { .. }));
    }

    #[tokio::test]
    async fn stdin_payload_reaches_the_child() {
        let output = ToolCommand::new("sh")
            .arg("-c")
            .arg("cat")
            .stdin("secret\n")
            .run()
            .await
            .unwrap();
        assert_eq!(output.stdout, "secret\n");
    }

    #[tokio::test]
    async fn released_child_output_keeps_draining() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        // Writes several pipe buffers' worth of stderr after launch; the
        // marker only appears if nothing blocks those writes.
        let script = format!(
            "head -c 262144 /dev/zero | tr '\\0' x >&2; : > {}",
            marker.display()
        );
        ToolCommand::new("sh")
            .arg("-c")
            .arg(script)
            .spawn_released(Duration::from_millis(100))
            .await
            .unwrap();

        for _ in 0..50 {
            if marker.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("released child never finished writing");
    }

    #[tokio::test]
    async fn early_exit_of_a_released_child_is_a_failure() {
        let err = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo bad mount >&2; exit 2")
            .spawn_released(Duration::from_millis(100))
            .await
            .unwrap_err();
        match err {
            Error::ToolFailed { tool, output, .. } => {
                assert_eq!(tool, "sh");
                assert!(output.contains("bad mount"));
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[test]
    fn combined_output_merges_both_streams() {
        let output = ToolOutput {
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        };
        assert_eq!(output.combined(), "out\nerr");
        let quiet = ToolOutput::default();
        assert_eq!(quiet.combined(), "");
    }
}
