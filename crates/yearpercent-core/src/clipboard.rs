use std::io::{self, IsTerminal, Write};
use std::process::{Command, Stdio};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const DEFAULT_COMMANDS: &[&str] = &[
    "wl-copy",
    "xclip -selection clipboard",
    "xsel --clipboard --input",
    "pbcopy",
    "clip",
];

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("no clipboard program available (tried: {0})")]
    Unavailable(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with status {status}")]
    Status { program: String, status: String },
    #[error("failed to write clipboard sequence to terminal: {0}")]
    Terminal(#[source] io::Error),
    #[error("output is not a terminal")]
    NotATerminal,
    #[error("clipboard rejected the text")]
    Rejected,
}

pub trait Clipboard {
    fn name(&self) -> &str;

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    /// Splits a command line on whitespace. Empty input yields `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(ToString::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Pipes the text into the first clipboard program found on `PATH`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    candidates: Vec<ExternalCommand>,
}

impl CommandClipboard {
    #[must_use]
    pub fn new(candidates: Vec<ExternalCommand>) -> Self {
        Self { candidates }
    }

    /// A configured command wins over the platform defaults.
    #[must_use]
    pub fn detect(configured: Option<&str>) -> Self {
        let candidates = match configured.and_then(ExternalCommand::parse) {
            Some(command) => vec![command],
            None => DEFAULT_COMMANDS
                .iter()
                .filter_map(|line| ExternalCommand::parse(line))
                .collect(),
        };
        Self::new(candidates)
    }
}

impl Clipboard for CommandClipboard {
    fn name(&self) -> &str {
        "command"
    }

    #[tracing::instrument(skip(self, text), fields(len = text.len()))]
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        for candidate in &self.candidates {
            if which::which(&candidate.program).is_err() {
                debug!(program = %candidate.program, "clipboard program not on PATH");
                continue;
            }
            return run_with_stdin(candidate, text);
        }

        let tried = self
            .candidates
            .iter()
            .map(|c| c.program.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(ClipboardError::Unavailable(tried))
    }
}

/// Only the exit status is awaited. Programs such as `xclip` leave a child
/// behind to serve the selection, and it holds on to inherited pipes.
fn run_with_stdin(command: &ExternalCommand, text: &str) -> Result<(), ClipboardError> {
    info!(program = %command.program, "copying via clipboard program");
    let spawn_error = |source| ClipboardError::Spawn {
        program: command.program.clone(),
        source,
    };

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(spawn_error)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).map_err(spawn_error)?;
    }

    let status = child.wait().map_err(spawn_error)?;
    if !status.success() {
        warn!(program = %command.program, %status, "clipboard program failed");
        return Err(ClipboardError::Status {
            program: command.program.clone(),
            status: status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        });
    }

    Ok(())
}

/// Asks the terminal emulator to set the clipboard with an OSC 52 sequence.
#[derive(Debug)]
pub struct Osc52Clipboard<W> {
    writer: W,
    terminal: bool,
}

impl<W: Write> Osc52Clipboard<W> {
    /// `writer` is taken to be a terminal.
    pub fn new(writer: W) -> Self {
        Self::with_terminal(writer, true)
    }

    /// Writes are refused unless `terminal` is set; anything else would put
    /// escape bytes into a file or pipe.
    pub fn with_terminal(writer: W, terminal: bool) -> Self {
        Self { writer, terminal }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl Osc52Clipboard<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        let stdout = io::stdout();
        let terminal = stdout.is_terminal();
        Self::with_terminal(stdout, terminal)
    }
}

impl<W: Write> Clipboard for Osc52Clipboard<W> {
    fn name(&self) -> &str {
        "osc52"
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if !self.terminal {
            return Err(ClipboardError::NotATerminal);
        }
        let payload = STANDARD.encode(text.as_bytes());
        write!(self.writer, "\x1b]52;c;{payload}\x07").map_err(ClipboardError::Terminal)?;
        self.writer.flush().map_err(ClipboardError::Terminal)
    }
}

/// In-process clipboard; optionally refuses every write.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
    pub reject: bool,
}

impl MemoryClipboard {
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            contents: None,
            reject: true,
        }
    }
}

impl Clipboard for MemoryClipboard {
    fn name(&self) -> &str {
        "memory"
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if self.reject {
            return Err(ClipboardError::Rejected);
        }
        self.contents = Some(text.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Primary,
    Fallback,
    Failed,
}

impl CopyOutcome {
    #[must_use]
    pub fn is_ok(self) -> bool {
        !matches!(self, CopyOutcome::Failed)
    }
}

pub fn copy_with_fallback(
    primary: &mut dyn Clipboard,
    fallback: &mut dyn Clipboard,
    text: &str,
) -> CopyOutcome {
    match primary.write_text(text) {
        Ok(()) => CopyOutcome::Primary,
        Err(err) => {
            warn!(clipboard = primary.name(), error = %err, "clipboard copy failed, trying fallback");
            match fallback.write_text(text) {
                Ok(()) => CopyOutcome::Fallback,
                Err(err) => {
                    error!(clipboard = fallback.name(), error = %err, "fallback copy method failed");
                    CopyOutcome::Failed
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{
        Clipboard, ExternalCommand, ClipboardError, CommandClipboard, CopyOutcome, MemoryClipboard,
        Osc52Clipboard, copy_with_fallback,
    };

    #[test]
    fn primary_success_skips_fallback() {
        let mut primary = MemoryClipboard::default();
        let mut fallback = MemoryClipboard::default();
        let outcome = copy_with_fallback(&mut primary, &mut fallback, "hello");
        assert_eq!(outcome, CopyOutcome::Primary);
        assert_eq!(primary.contents.as_deref(), Some("hello"));
        assert_eq!(fallback.contents, None);
    }

    #[test]
    fn falls_back_then_reports_failure() {
        let mut primary = MemoryClipboard::rejecting();
        let mut fallback = MemoryClipboard::default();
        assert_eq!(
            copy_with_fallback(&mut primary, &mut fallback, "x"),
            CopyOutcome::Fallback
        );
        assert_eq!(fallback.contents.as_deref(), Some("x"));

        let mut fallback = MemoryClipboard::rejecting();
        let outcome = copy_with_fallback(&mut primary, &mut fallback, "x");
        assert_eq!(outcome, CopyOutcome::Failed);
        assert!(!outcome.is_ok());
    }

    #[test]
    fn osc52_wraps_base64_payload() {
        let mut clipboard = Osc52Clipboard::new(Vec::new());
        clipboard.write_text("hi").expect("write");
        let written = String::from_utf8(clipboard.into_inner()).expect("utf8");
        assert_eq!(written, "\x1b]52;c;aGk=\x07");
    }

    #[test]
    fn osc52_refuses_non_terminal_output() {
        let mut clipboard = Osc52Clipboard::with_terminal(Vec::new(), false);
        let err = clipboard.write_text("x").expect_err("should refuse");
        assert!(matches!(err, ClipboardError::NotATerminal));
        assert!(clipboard.into_inner().is_empty());

        let mut primary = MemoryClipboard::rejecting();
        let mut fallback = Osc52Clipboard::with_terminal(Vec::new(), false);
        assert_eq!(
            copy_with_fallback(&mut primary, &mut fallback, "x"),
            CopyOutcome::Failed
        );
    }

    #[test]
    fn parses_command_lines() {
        assert_eq!(
            ExternalCommand::parse("xclip -selection clipboard"),
            Some(ExternalCommand {
                program: "xclip".to_string(),
                args: vec!["-selection".to_string(), "clipboard".to_string()],
            })
        );
        assert_eq!(ExternalCommand::parse("   "), None);
    }

    #[test]
    fn missing_programs_are_unavailable() {
        let mut clipboard = CommandClipboard::detect(Some("definitely-not-a-clipboard-tool-xyz"));
        let err = clipboard.write_text("x").expect_err("should fail");
        assert!(matches!(err, ClipboardError::Unavailable(ref tried) if tried.contains("xyz")));
    }

    #[cfg(unix)]
    #[test]
    fn pipes_text_to_configured_program() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("clip.txt");
        let mut clipboard = CommandClipboard::new(vec![ExternalCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), format!("cat > '{}'", target.display())],
        }]);

        clipboard.write_text("▓▓░ 今年已过").expect("copy");
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "▓▓░ 今年已过");
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_status() {
        let mut clipboard = CommandClipboard::new(vec![ExternalCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; exit 3".to_string()],
        }]);
        let err = clipboard.write_text("x").expect_err("should fail");
        assert!(matches!(err, ClipboardError::Status { ref status, .. } if status == "3"));
    }

    #[cfg(unix)]
    #[test]
    fn returns_when_program_exits_despite_lingering_child() {
        let mut clipboard = CommandClipboard::new(vec![ExternalCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; sleep 6 & exit 0".to_string()],
        }]);

        let started = Instant::now();
        clipboard.write_text("x").expect("copy");
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }
}
