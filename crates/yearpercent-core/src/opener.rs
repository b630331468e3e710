use std::io;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::clipboard::{Clipboard, ExternalCommand, copy_with_fallback};
use crate::state::ShareOutcome;

#[cfg(target_os = "macos")]
const DEFAULT_OPENER: &str = "open";
#[cfg(target_os = "windows")]
const DEFAULT_OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_OPENER: &str = "xdg-open";

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no program available to open {0}")]
    NotFound(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with status {status}")]
    Status { program: String, status: String },
}

/// Opens a share URL in a new browsing context.
pub trait Opener {
    fn open(&mut self, url: &Url) -> Result<(), OpenError>;
}

#[derive(Debug, Clone)]
pub struct SystemOpener {
    command: ExternalCommand,
}

impl SystemOpener {
    #[must_use]
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }

    #[must_use]
    pub fn detect(configured: Option<&str>) -> Self {
        let command = configured
            .and_then(ExternalCommand::parse)
            .unwrap_or_else(|| ExternalCommand {
                program: DEFAULT_OPENER.to_string(),
                args: vec![],
            });
        Self::new(command)
    }
}

impl Opener for SystemOpener {
    #[tracing::instrument(skip(self), fields(program = %self.command.program))]
    fn open(&mut self, url: &Url) -> Result<(), OpenError> {
        let program = &self.command.program;
        if which::which(program).is_err() {
            return Err(OpenError::NotFound(url.to_string()));
        }

        info!(%url, "opening share url");
        let output = Command::new(program)
            .args(&self.command.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| OpenError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !stderr.is_empty() {
                warn!(stderr = %stderr, "opener wrote stderr");
            }
            return Err(OpenError::Status {
                program: program.clone(),
                status: output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        Ok(())
    }
}

/// Records URLs instead of opening them.
#[derive(Debug, Default, Clone)]
pub struct RecordingOpener {
    pub opened: Vec<Url>,
    pub fail: bool,
}

impl Opener for RecordingOpener {
    fn open(&mut self, url: &Url) -> Result<(), OpenError> {
        if self.fail {
            return Err(OpenError::NotFound(url.to_string()));
        }
        self.opened.push(url.clone());
        Ok(())
    }
}

/// Opens `url`; when that fails, puts `text` on the clipboard so it can be pasted by hand.
pub fn share_with_fallback(
    opener: &mut dyn Opener,
    primary: &mut dyn Clipboard,
    fallback: &mut dyn Clipboard,
    url: &Url,
    text: &str,
) -> ShareOutcome {
    match opener.open(url) {
        Ok(()) => ShareOutcome::Opened,
        Err(err) => {
            warn!(error = %err, "could not open share url, copying text instead");
            if copy_with_fallback(primary, fallback, text).is_ok() {
                ShareOutcome::CopiedInstead
            } else {
                ShareOutcome::Failed
            }
        }
    }
}
