//! Subprocess execution.
//!
//! Every external tool the pipeline drives (git, cmake, npm, the installed
//! launchers) is described as a [`Step`] and executed through a
//! [`CommandRunner`]. A step that exits non-zero is fatal; nothing is retried.
//!
//! [`SystemRunner`] either streams child output to the terminal (verbose) or
//! appends it to a build log, printing the log tail when a step fails.

use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

/// Lines of build log shown when a step fails in quiet mode.
const FAILURE_TAIL_LINES: usize = 20;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("'{program}' not found on PATH")]
    NotFound { program: String },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed with exit code {code:?}: {program} {}", .args.join(" "))]
    Command {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One external command invocation.
#[derive(Debug, Clone, Default)]
pub struct Step {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    env_remove: Vec<OsString>,
}

impl Step {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Self {
        self.env_remove.push(key.as_ref().to_os_string());
        self
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_env(&self) -> &[(OsString, OsString)] {
        &self.env
    }

    /// Human-readable command line, used in logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| {
                let s = s.to_string_lossy();
                if s.contains(' ') {
                    format!("\"{s}\"")
                } else {
                    s.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Error for a non-zero exit of this step.
    pub fn failure(&self, code: Option<i32>) -> StepError {
        StepError::Command {
            program: self.program.to_string_lossy().into_owned(),
            args: self
                .args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            code,
        }
    }

    fn spawn_error(&self, err: std::io::Error) -> StepError {
        let program = self.program.to_string_lossy().into_owned();
        if err.kind() == std::io::ErrorKind::NotFound {
            StepError::NotFound { program }
        } else {
            StepError::Spawn {
                program,
                source: err,
            }
        }
    }
}

/// Executes steps. Implemented by [`SystemRunner`] and by test doubles.
pub trait CommandRunner: Send + Sync {
    /// Run a step to completion, failing on a non-zero exit.
    fn run(&self, step: &Step) -> Result<(), StepError>;

    /// Run a step and capture its standard output.
    fn output(&self, step: &Step) -> Result<String, StepError>;
}

/// Runs steps as real child processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    verbose: bool,
    log_path: Option<PathBuf>,
}

impl SystemRunner {
    /// Stream child output to the terminal.
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            log_path: None,
        }
    }

    /// Append child output to `log_path`.
    pub fn logging_to(log_path: impl Into<PathBuf>) -> Self {
        Self {
            verbose: false,
            log_path: Some(log_path.into()),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, step: &Step) -> Result<(), StepError> {
        tracing::debug!(command = %step.display(), cwd = ?step.cwd(), "running");
        let mut cmd = step.to_command();

        let log_path = match (&self.log_path, self.verbose) {
            (Some(path), false) => Some(path),
            _ => None,
        };

        let status = if let Some(log_path) = log_path {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?;
            {
                use std::io::Write;
                writeln!(log_file, "==> {}", step.display())?;
            }
            cmd.stdin(Stdio::null())
                .stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file))
                .status()
                .map_err(|e| step.spawn_error(e))?
        } else {
            cmd.status().map_err(|e| step.spawn_error(e))?
        };

        if !status.success() {
            if let Some(log_path) = log_path {
                if let Ok(tail) = read_last_lines(log_path, FAILURE_TAIL_LINES) {
                    eprintln!("\nStep failed. Last {FAILURE_TAIL_LINES} lines:");
                    eprintln!("{tail}");
                    eprintln!("\nFull log: {}", log_path.display());
                }
            }
            return Err(step.failure(status.code()));
        }

        Ok(())
    }

    fn output(&self, step: &Step) -> Result<String, StepError> {
        tracing::debug!(command = %step.display(), "capturing");
        let output = step
            .to_command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| step.spawn_error(e))?;

        if !output.status.success() {
            return Err(step.failure(output.status.code()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Read the last N lines from a file efficiently.
///
/// Instead of loading the entire file, we seek to near the end and read a fixed-size
/// tail buffer. This prevents OOM on large build logs (e.g., compiling LLVM).
pub fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Read at most 16KB from the end (enough for ~400 lines at 40 chars each)
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let seek_pos = file_len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let buffer = String::from_utf8_lossy(&bytes);

    // If we seeked mid-file, skip the first (partial) line
    let content = if seek_pos > 0 {
        buffer.find('\n').map_or(&buffer[..], |idx| &buffer[idx + 1..])
    } else {
        &buffer[..]
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
