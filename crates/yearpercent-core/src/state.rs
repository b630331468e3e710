//! Application state and the single function allowed to change it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use url::Url;

use crate::locale::{self, Language, MessageKey};
use crate::progress::YearProgress;
use crate::share::{ShareFormatter, SharePlatform};
use crate::view::PageView;

pub const TICK_KEY: &str = "tick";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Copy,
    Export,
    Share,
}

impl Control {
    #[must_use]
    pub fn timer_key(self) -> &'static str {
        match self {
            Control::Copy => "feedback.copy",
            Control::Export => "feedback.export",
            Control::Share => "feedback.share",
        }
    }
}

/// Transient text shown in place of a control's caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Copied,
    CopyFailed,
    Exporting,
    Exported(PathBuf),
    ExportFailed,
    ShareOpened(SharePlatform),
    SharePrompt,
    OpenBlocked,
}

impl Feedback {
    /// Caption that replaces the control's label.
    #[must_use]
    pub fn caption(&self, language: Language) -> String {
        let key = match self {
            Feedback::Copied => MessageKey::CopySuccess,
            Feedback::CopyFailed => MessageKey::CopyError,
            Feedback::Exporting => MessageKey::Exporting,
            Feedback::Exported(_) => MessageKey::Exported,
            Feedback::ExportFailed => MessageKey::ExportError,
            Feedback::ShareOpened(platform) => {
                return locale::format(
                    language,
                    MessageKey::ShareAriaLabel,
                    &[("platform", platform.display_name().to_string())],
                );
            }
            Feedback::SharePrompt => MessageKey::SharePrompt,
            Feedback::OpenBlocked => MessageKey::OpenBlocked,
        };
        locale::text(language, key).to_string()
    }

    /// Longer status line, if the feedback has one.
    #[must_use]
    pub fn notice(&self, language: Language) -> Option<String> {
        match self {
            Feedback::Exported(path) => Some(locale::format(
                language,
                MessageKey::ExportSuccessNotice,
                &[("path", path.display().to_string())],
            )),
            Feedback::ExportFailed => Some(locale::text(language, MessageKey::ExportErrorNotice).to_string()),
            Feedback::CopyFailed => Some(locale::text(language, MessageKey::ManualCopyPrompt).to_string()),
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, Feedback::Exporting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick,
    FeedbackExpired(Control),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Opened,
    /// The browser could not be opened; the text went to the clipboard instead.
    CopiedInstead,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Tick(NaiveDate),
    SetLanguage(Language),
    ToggleLanguage,
    CopyRequested,
    CopyFinished { ok: bool },
    ExportRequested,
    ExportFinished(Result<PathBuf, String>),
    ShareRequested(SharePlatform),
    ShareFinished { platform: SharePlatform, outcome: ShareOutcome },
    Timer(TimerEvent),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Render,
    /// Read the clock and feed back a `Tick`.
    Recompute,
    PersistLanguage(Language),
    CopyText(String),
    ExportImage,
    OpenShare {
        platform: SharePlatform,
        url: Url,
        text: String,
    },
    Schedule {
        key: &'static str,
        delay: Duration,
        event: TimerEvent,
    },
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub language: Language,
    pub progress: YearProgress,
    pub formatter: ShareFormatter,
    pub refresh_interval: Duration,
    pub feedback_window: Duration,
    feedback: HashMap<Control, Feedback>,
    busy: HashMap<Control, bool>,
    exit: bool,
}

impl AppState {
    #[must_use]
    pub fn new(language: Language, today: NaiveDate, formatter: ShareFormatter) -> Self {
        Self {
            language,
            progress: YearProgress::compute(today),
            formatter,
            refresh_interval: Duration::from_secs(60),
            feedback_window: Duration::from_secs(2),
            feedback: HashMap::new(),
            busy: HashMap::new(),
            exit: false,
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, refresh: Duration, feedback: Duration) -> Self {
        self.refresh_interval = refresh;
        self.feedback_window = feedback;
        self
    }

    #[must_use]
    pub fn view(&self) -> PageView {
        PageView::build(&self.progress, self.language)
    }

    #[must_use]
    pub fn feedback(&self, control: Control) -> Option<&Feedback> {
        self.feedback.get(&control)
    }

    #[must_use]
    pub fn is_busy(&self, control: Control) -> bool {
        self.busy.get(&control).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn should_exit(&self) -> bool {
        self.exit
    }

    #[must_use]
    pub fn copy_text(&self) -> String {
        self.formatter.copy_text(&self.progress, self.language)
    }

    #[must_use]
    pub fn share_text(&self) -> String {
        self.formatter.share_text(&self.progress, self.language)
    }

    fn show_feedback(&mut self, control: Control, feedback: Feedback) -> Vec<Effect> {
        let terminal = feedback.is_terminal();
        self.feedback.insert(control, feedback);
        let mut effects = vec![Effect::Render];
        if terminal {
            effects.push(Effect::Schedule {
                key: control.timer_key(),
                delay: self.feedback_window,
                event: TimerEvent::FeedbackExpired(control),
            });
        }
        effects
    }
}

/// Applies `action` and returns what the adapter layer must do next.
#[tracing::instrument(skip(state), fields(language = %state.language))]
pub fn update(state: &mut AppState, action: Action) -> Vec<Effect> {
    match action {
        Action::Tick(today) => {
            let next = YearProgress::compute(today);
            if next != state.progress {
                debug!(day = next.day_of_year, percentage = %next.percentage, "progress changed");
            }
            state.progress = next;
            vec![Effect::Render]
        }
        Action::SetLanguage(language) => {
            info!(from = %state.language, to = %language, "switching language");
            state.language = language;
            vec![Effect::PersistLanguage(language), Effect::Recompute, Effect::Render]
        }
        Action::ToggleLanguage => {
            let next = state.language.toggle();
            update(state, Action::SetLanguage(next))
        }
        Action::CopyRequested => {
            if state.is_busy(Control::Copy) {
                debug!("copy already showing feedback; ignoring");
                return vec![];
            }
            state.busy.insert(Control::Copy, true);
            vec![Effect::CopyText(state.copy_text())]
        }
        Action::CopyFinished { ok } => {
            let feedback = if ok { Feedback::Copied } else { Feedback::CopyFailed };
            state.show_feedback(Control::Copy, feedback)
        }
        Action::ExportRequested => {
            if state.is_busy(Control::Export) {
                debug!("export in flight; ignoring");
                return vec![];
            }
            state.busy.insert(Control::Export, true);
            let mut effects = state.show_feedback(Control::Export, Feedback::Exporting);
            effects.push(Effect::ExportImage);
            effects
        }
        Action::ExportFinished(result) => {
            let feedback = match result {
                Ok(path) => Feedback::Exported(path),
                Err(error) => {
                    warn!(%error, "export failed");
                    Feedback::ExportFailed
                }
            };
            state.show_feedback(Control::Export, feedback)
        }
        Action::ShareRequested(platform) => {
            if state.is_busy(Control::Share) {
                return vec![];
            }
            let text = state.share_text();
            match platform.share_url(&text) {
                Ok(url) => {
                    state.busy.insert(Control::Share, true);
                    vec![Effect::OpenShare { platform, url, text }]
                }
                Err(error) => {
                    warn!(%error, %platform, "failed to build share url");
                    state.show_feedback(Control::Share, Feedback::OpenBlocked)
                }
            }
        }
        Action::ShareFinished { platform, outcome } => {
            let feedback = match outcome {
                ShareOutcome::Opened => Feedback::ShareOpened(platform),
                ShareOutcome::CopiedInstead => Feedback::SharePrompt,
                ShareOutcome::Failed => Feedback::OpenBlocked,
            };
            state.show_feedback(Control::Share, feedback)
        }
        Action::Timer(TimerEvent::Tick) => vec![
            Effect::Recompute,
            Effect::Schedule {
                key: TICK_KEY,
                delay: state.refresh_interval,
                event: TimerEvent::Tick,
            },
        ],
        Action::Timer(TimerEvent::FeedbackExpired(control)) => {
            state.feedback.remove(&control);
            state.busy.remove(&control);
            vec![Effect::Render]
        }
        Action::Quit => {
            state.exit = true;
            vec![]
        }
    }
}
