//! External extraction fallback for RAR-family containers.
//!
//! There is no in-process RAR decoder. Instead a fixed, ordered list of
//! command-line extractors is probed: the first one that starts, finishes
//! within the timeout and exits with status 0 wins. Nothing beyond "did it
//! run and succeed" is detected.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ShelfError;

/// Per-tool wait used when none is configured.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One argument slot in an extractor command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolArg {
    /// Passed through verbatim.
    Literal(String),
    /// Replaced by the archive path.
    Archive,
    /// Replaced by the output directory.
    OutDir,
}

/// An external extraction program and how to call it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionTool {
    /// Program name or path, resolved through `PATH`.
    pub program: String,
    /// Argument template.
    pub args: Vec<ToolArg>,
}

impl ExtractionTool {
    /// Build a tool from a program name and argument template.
    pub fn new(program: impl Into<String>, args: Vec<ToolArg>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `bsdtar -xf <archive> -C <out>` (libarchive).
    pub fn bsdtar() -> Self {
        Self::new(
            "bsdtar",
            vec![
                ToolArg::Literal("-xf".into()),
                ToolArg::Archive,
                ToolArg::Literal("-C".into()),
                ToolArg::OutDir,
            ],
        )
    }

    /// `unrar x -o+ <archive> <out>`.
    pub fn unrar() -> Self {
        Self::new(
            "unrar",
            vec![
                ToolArg::Literal("x".into()),
                ToolArg::Literal("-o+".into()),
                ToolArg::Archive,
                ToolArg::OutDir,
            ],
        )
    }

    /// `unar -o <out> <archive>`.
    pub fn unar() -> Self {
        Self::new(
            "unar",
            vec![
                ToolArg::Literal("-o".into()),
                ToolArg::OutDir,
                ToolArg::Archive,
            ],
        )
    }

    fn command_args(&self, archive: &Path, out_dir: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                ToolArg::Literal(s) => OsString::from(s),
                ToolArg::Archive => archive.as_os_str().to_os_string(),
                ToolArg::OutDir => out_dir.as_os_str().to_os_string(),
            })
            .collect()
    }
}

/// Ordered extractor list and the per-tool wait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Tools in priority order.
    pub tools: Vec<ExtractionTool>,
    /// Maximum wait for each tool before it is killed.
    pub timeout: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            tools: vec![
                ExtractionTool::bsdtar(),
                ExtractionTool::unrar(),
                ExtractionTool::unar(),
            ],
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// Why a single tool attempt did not count as success.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolFailure {
    /// The program could not be started (usually not installed).
    NotInstalled,
    /// Spawning or waiting failed for another reason.
    Spawn(String),
    /// The program ran but exited unsuccessfully.
    Exited(Option<i32>),
    /// The program was still running at the deadline and was killed.
    TimedOut(Duration),
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolFailure::NotInstalled => write!(f, "not installed"),
            ToolFailure::Spawn(msg) => write!(f, "failed to start ({})", msg),
            ToolFailure::Exited(Some(code)) => write!(f, "exited with status {}", code),
            ToolFailure::Exited(None) => write!(f, "terminated by signal"),
            ToolFailure::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs()),
        }
    }
}

/// Extract every member of `archive` into `out_dir`.
///
/// Returns the program name of the tool that succeeded. When every tool
/// fails, the diagnostic names the tools to install followed by each
/// attempt's failure reason.
pub fn extract_all(
    archive: &Path,
    out_dir: &Path,
    options: &ExtractionOptions,
) -> Result<String, ShelfError> {
    let mut reasons = Vec::with_capacity(options.tools.len());

    for tool in &options.tools {
        match run_tool(tool, archive, out_dir, options.timeout) {
            Ok(()) => {
                log::debug!(
                    "[EXTRACT] {} extracted {} into {}",
                    tool.program,
                    archive.display(),
                    out_dir.display()
                );
                return Ok(tool.program.clone());
            }
            Err(failure) => {
                log::warn!("[EXTRACT] {} failed: {}", tool.program, failure);
                reasons.push(format!("{}: {}", tool.program, failure));
            }
        }
    }

    Err(ShelfError::Extraction(format!(
        "extraction failed, no compatible extraction tool found (install {}): {}",
        install_hint(&options.tools),
        if reasons.is_empty() {
            "no tools configured".to_string()
        } else {
            reasons.join("; ")
        }
    )))
}

fn install_hint(tools: &[ExtractionTool]) -> String {
    match tools {
        [] => "bsdtar, unrar or unar".to_string(),
        [only] => only.program.clone(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|t| t.program.as_str()).collect();
            format!("{} or {}", head.join(", "), last.program)
        }
    }
}

fn run_tool(
    tool: &ExtractionTool,
    archive: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> Result<(), ToolFailure> {
    let child = Command::new(&tool.program)
        .args(tool.command_args(archive, out_dir))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ToolFailure::NotInstalled,
            _ => ToolFailure::Spawn(e.to_string()),
        })?;

    let status = wait_with_timeout(child, timeout)?;
    if status.success() {
        Ok(())
    } else {
        Err(ToolFailure::Exited(status.code()))
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus, ToolFailure> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolFailure::TimedOut(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(ToolFailure::Spawn(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(tools: Vec<ExtractionTool>, timeout: Duration) -> ExtractionOptions {
        ExtractionOptions { tools, timeout }
    }

    #[test]
    fn test_default_chain_order_and_arguments() {
        let defaults = ExtractionOptions::default();
        let names: Vec<&str> = defaults.tools.iter().map(|t| t.program.as_str()).collect();
        assert_eq!(names, vec!["bsdtar", "unrar", "unar"]);
        assert_eq!(defaults.timeout, Duration::from_secs(30));

        let args = ExtractionTool::unar().command_args(Path::new("a.cbr"), Path::new("/out"));
        assert_eq!(
            args,
            vec![
                OsString::from("-o"),
                OsString::from("/out"),
                OsString::from("a.cbr")
            ]
        );
    }

    #[test]
    fn test_missing_tools_report_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(
            vec![
                ExtractionTool::new("mu-shelf-no-such-tool-a", vec![ToolArg::Archive]),
                ExtractionTool::new("mu-shelf-no-such-tool-b", vec![ToolArg::OutDir]),
            ],
            Duration::from_secs(1),
        );

        let err = extract_all(Path::new("comic.cbr"), dir.path(), &opts).unwrap_err();
        let ShelfError::Extraction(msg) = err else {
            panic!("expected extraction failure");
        };
        assert!(msg.contains("install mu-shelf-no-such-tool-a or mu-shelf-no-such-tool-b"));
        assert!(msg.contains("mu-shelf-no-such-tool-a: not installed"));
        assert!(msg.contains("mu-shelf-no-such-tool-b: not installed"));
    }

    #[test]
    fn test_install_hint_formatting() {
        let one = vec![ExtractionTool::unar()];
        assert_eq!(install_hint(&one), "unar");
        assert_eq!(
            install_hint(&ExtractionOptions::default().tools),
            "bsdtar, unrar or unar"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_first_successful_tool_wins() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(
            vec![
                ExtractionTool::new("false", vec![]),
                ExtractionTool::new("true", vec![ToolArg::Archive, ToolArg::OutDir]),
                ExtractionTool::new("mu-shelf-never-reached", vec![]),
            ],
            Duration::from_secs(5),
        );
        let used = extract_all(Path::new("comic.cbr"), dir.path(), &opts).unwrap();
        assert_eq!(used, "true");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(
            vec![ExtractionTool::new("false", vec![])],
            Duration::from_secs(5),
        );
        let err = extract_all(Path::new("comic.cbr"), dir.path(), &opts).unwrap_err();
        assert!(err.diagnostic().contains("false: exited with status 1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_tool_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(
            vec![ExtractionTool::new(
                "sleep",
                vec![ToolArg::Literal("10".into())],
            )],
            Duration::from_millis(200),
        );
        let started = Instant::now();
        let err = extract_all(Path::new("comic.cbr"), dir.path(), &opts).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(err.diagnostic().contains("sleep: timed out"));
    }
}
