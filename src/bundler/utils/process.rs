//! External command execution.
//!
//! Every invocation carries an explicit working directory and environment; the
//! process-wide current directory is never changed. Output is streamed line by line
//! to an [`OutputObserver`] while it is captured for error reporting.

use crate::bundler::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Receives the output of external commands as it is produced.
pub trait OutputObserver: Send + Sync {
    /// Called once per output line (stdout and stderr combined).
    fn on_line(&self, label: &str, line: &str);
}

/// Observer forwarding every line to `log::debug!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl OutputObserver for LogObserver {
    fn on_line(&self, label: &str, line: &str) {
        log::debug!("[{label}] {line}");
    }
}

/// Builder for one external command invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: PathBuf,
    label: String,
}

impl ToolCommand {
    /// Creates a command running `program` in `cwd`.
    pub fn new(program: impl AsRef<OsStr>, cwd: impl Into<PathBuf>) -> Self {
        let program = program.as_ref().to_os_string();
        let label = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            program,
            args: Vec::new(),
            envs: Vec::new(),
            cwd: cwd.into(),
            label,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets one environment variable.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Sets the label prefixed to streamed output (defaults to the program name).
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Working directory of the invocation.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Printable command line.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.cwd)
            .stdin(Stdio::null());
        command
    }

    /// Runs the command, streaming its output to `observer`.
    ///
    /// Returns the combined output on success.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandFailed`] when the process cannot be spawned or its output
    ///   cannot be read
    /// - [`Error::Toolchain`] on a non-zero exit, carrying the combined output
    pub async fn run(&self, observer: &dyn OutputObserver) -> Result<String> {
        let command_line = self.display();
        log::debug!("Running `{}` in {}", command_line, self.cwd.display());

        let mut child = self
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| Error::CommandFailed {
                command: command_line.clone(),
                error,
            })?;

        let mut output = String::new();
        let mut record = |line: String| {
            observer.on_line(&self.label, &line);
            output.push_str(&line);
            output.push('\n');
        };

        let mut stdout = child.stdout.take().map(LineReader::new);
        let mut stderr = child.stderr.take().map(LineReader::new);
        let streamed: std::io::Result<()> = async {
            loop {
                tokio::select! {
                    line = next_line(&mut stdout), if stdout.is_some() => match line? {
                        Some(line) => record(line),
                        None => stdout = None,
                    },
                    line = next_line(&mut stderr), if stderr.is_some() => match line? {
                        Some(line) => record(line),
                        None => stderr = None,
                    },
                    else => break,
                }
            }
            Ok(())
        }
        .await;
        if let Err(error) = streamed {
            child.start_kill().ok();
            return Err(Error::CommandFailed {
                command: command_line,
                error,
            });
        }

        let status = child.wait().await.map_err(|error| Error::CommandFailed {
            command: command_line.clone(),
            error,
        })?;
        if !status.success() {
            return Err(Error::Toolchain {
                command: command_line,
                status: status.to_string(),
                output,
            });
        }
        Ok(output)
    }

    /// Runs the command without streaming and returns its trimmed stdout.
    pub async fn capture(&self) -> Result<String> {
        let command_line = self.display();
        log::debug!("Running `{}` in {}", command_line, self.cwd.display());
        let output = self
            .command()
            .output()
            .await
            .map_err(|error| Error::CommandFailed {
                command: command_line.clone(),
                error,
            })?;
        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(Error::Toolchain {
                command: command_line,
                status: output.status.to_string(),
                output: combined,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Splits a byte stream into lines without requiring UTF-8.
///
/// Partially read bytes stay in the buffer, so a read interrupted by `select!`
/// resumes where it stopped.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line, lossily decoded; `None` only at end of stream.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.reader.read_until(b'\n', &mut self.buf).await?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        let mut line = std::mem::take(&mut self.buf);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

async fn next_line<R: AsyncRead + Unpin>(
    reader: &mut Option<LineReader<R>>,
) -> std::io::Result<Option<String>> {
    match reader {
        Some(reader) => reader.next_line().await,
        None => Ok(None),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl OutputObserver for Collect {
        fn on_line(&self, _label: &str, line: &str) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(line.to_string());
            }
        }
    }

    #[tokio::test]
    async fn streams_and_captures_in_explicit_cwd() {
        let temp = tempfile::tempdir().unwrap();
        let observer = Collect::default();
        let output = ToolCommand::new("sh", temp.path())
            .args(["-c", "pwd; echo \"$GREETING\" >&2"])
            .env("GREETING", "hello")
            .run(&observer)
            .await
            .unwrap();
        let lines = observer.0.lock().unwrap().clone();
        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&"hello".to_string()));
        assert!(output.contains("hello"));
        let canonical = temp.path().canonicalize().unwrap();
        assert!(lines.iter().any(|l| Path::new(l).canonicalize().ok() == Some(canonical.clone())));
    }

    #[tokio::test]
    async fn failure_carries_output() {
        let temp = tempfile::tempdir().unwrap();
        let err = ToolCommand::new("sh", temp.path())
            .args(["-c", "echo broken; exit 3"])
            .run(&LogObserver)
            .await
            .unwrap_err();
        match err {
            Error::Toolchain { output, .. } => assert_eq!(output, "broken\n"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_command_failed() {
        let temp = tempfile::tempdir().unwrap();
        let err = ToolCommand::new("definitely-not-a-real-tool", temp.path())
            .capture()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_stop_streaming() {
        let temp = tempfile::tempdir().unwrap();
        let observer = Collect::default();
        let output = ToolCommand::new("sh", temp.path())
            .args([
                "-c",
                "printf '\\377\\n'; head -c 300000 /dev/zero | tr '\\0' 'a'; echo; echo done",
            ])
            .run(&observer)
            .await
            .unwrap();
        let lines = observer.0.lock().unwrap().clone();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "\u{fffd}");
        assert_eq!(lines[1].len(), 300_000);
        assert_eq!(lines[2], "done");
        assert!(output.ends_with("done\n"));
    }
}
