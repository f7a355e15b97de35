//! Extractor subprocess interaction: tool resolution, spawning, and a merged
//! line stream over stdout and stderr.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};
use crate::logging::{ErrorCategory, log_debug_with_context, log_warning_simple};

/// A fully described extractor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    output_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Directory that must exist before the process starts (downloads).
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}

/// Everything a finished invocation printed, plus its exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub lines: Vec<String>,
    pub exit_code: i32,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

fn candidate_names(program: &Path) -> Vec<OsString> {
    let mut names = vec![program.as_os_str().to_os_string()];
    if cfg!(windows) && program.extension().is_none() {
        let mut exe = program.as_os_str().to_os_string();
        exe.push(".exe");
        names.push(exe);
    }
    names
}

/// Resolve the extractor executable.
///
/// Paths with a directory component must point at an existing file. Bare
/// program names are looked up on `PATH`.
pub fn resolve_tool(program: &Path) -> Result<PathBuf> {
    let tool = program.display().to_string();

    if program.as_os_str().is_empty() {
        return Err(EngineError::tool_not_found(tool));
    }

    if program.is_absolute() || program.components().count() > 1 {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(EngineError::tool_not_found(tool))
        };
    }

    let Some(path_var) = std::env::var_os("PATH") else {
        return Err(EngineError::tool_not_found(tool));
    };

    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidate_names(program).into_iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| EngineError::tool_not_found(tool))
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches(['\r', '\n']).to_string()
}

/// Forward every line of `reader` into `tx`. Keeps draining after the
/// receiver is gone so the child never blocks on a full pipe.
fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let _ = tx.send(decode_line(&buf));
                }
                Err(e) => {
                    log_warning_simple(ErrorCategory::Process, &format!("Error reading {}: {}", stream, e));
                    break;
                }
            }
        }
    });
}

/// A running extractor process exposing its merged output as lines.
///
/// The line sequence is finite and can be consumed only once. Lines from
/// stdout and stderr are interleaved in arrival order.
pub struct ToolProcess {
    tool: String,
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    started: Instant,
}

impl ToolProcess {
    /// Resolve the tool, create the output directory if one is requested,
    /// and start the process.
    pub async fn spawn(command: &ToolCommand) -> Result<Self> {
        let program = resolve_tool(&command.program)?;
        let tool = program.display().to_string();

        if let Some(dir) = &command.output_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| EngineError::io(format!("creating output directory {}", dir.display()), e))?;
        }

        let mut cmd = Command::new(&program);
        cmd.args(&command.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if std::env::var_os("PYTHONIOENCODING").is_none() {
            cmd.env("PYTHONIOENCODING", "utf-8");
        }

        // On Windows, prevent window creation
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

        let mut child = cmd.spawn().map_err(|e| EngineError::spawn_failure(tool.clone(), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::spawn_failure(tool.clone(), std::io::Error::other("Could not capture stdout")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::spawn_failure(tool.clone(), std::io::Error::other("Could not capture stderr")))?;

        let (tx, lines) = mpsc::unbounded_channel();
        forward_lines(stdout, tx.clone(), "stdout");
        forward_lines(stderr, tx, "stderr");

        log_debug_with_context(
            ErrorCategory::Process,
            "Extractor started",
            json!({ "tool": tool, "args": command.args }),
        );

        Ok(Self {
            tool,
            child,
            lines,
            started: Instant::now(),
        })
    }

    /// Next output line, or `None` once both streams are exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Ask the OS to terminate the process.
    pub fn kill(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|e| EngineError::io(format!("killing {}", self.tool), e))
    }

    /// Drain any unread output and wait for termination.
    ///
    /// Processes terminated by a signal report exit code `-1`.
    pub async fn finish(mut self) -> Result<i32> {
        while self.lines.recv().await.is_some() {}

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| EngineError::io(format!("waiting for {}", self.tool), e))?;
        let exit_code = status.code().unwrap_or(-1);

        log_debug_with_context(
            ErrorCategory::Process,
            "Extractor finished",
            json!({
                "tool": self.tool,
                "exitCode": exit_code,
                "elapsedMs": self.started.elapsed().as_millis() as u64,
            }),
        );

        Ok(exit_code)
    }
}

/// Run a command to completion and collect its merged output.
///
/// A non-zero exit is not an error here: the extractor often prints useful
/// output while still failing, so callers decide from `exit_code`.
pub async fn run_to_output(command: &ToolCommand) -> Result<ToolOutput> {
    let mut process = ToolProcess::spawn(command).await?;
    let mut lines = Vec::new();
    while let Some(line) = process.next_line().await {
        lines.push(line);
    }
    let exit_code = process.finish().await?;
    Ok(ToolOutput { lines, exit_code })
}
