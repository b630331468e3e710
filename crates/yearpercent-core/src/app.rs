//! Drives the reducer: feeds actions in, carries out the effects it asks
//! for, and turns their outcomes back into actions.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::clipboard::{Clipboard, CommandClipboard, MemoryClipboard, Osc52Clipboard, copy_with_fallback};
use crate::config::Config;
use crate::export::{CaptureArea, PngRasterizer, Rasterizer, SvgRasterizer, export_image};
use crate::locale::Language;
use crate::opener::{Opener, RecordingOpener, SystemOpener, share_with_fallback};
use crate::preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore, resolve_language};
use crate::progress::{Clock, FixedClock, SystemClock};
use crate::scheduler::Scheduler;
use crate::share::ShareFormatter;
use crate::state::{self, Action, AppState, Effect, TICK_KEY, TimerEvent};

pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub clipboard: Box<dyn Clipboard>,
    pub fallback_clipboard: Box<dyn Clipboard>,
    pub opener: Box<dyn Opener>,
    pub preferences: Box<dyn PreferenceStore>,
    pub rasterizer: Box<dyn Rasterizer>,
}

impl Collaborators {
    /// Real clipboard, browser and preference file; `date` pins the clock.
    pub fn system(cfg: &Config, data_dir: &Path, date: Option<NaiveDate>) -> anyhow::Result<Self> {
        let clock: Box<dyn Clock> = match date {
            Some(date) => Box::new(FixedClock(date)),
            None => Box::new(SystemClock::new(cfg.timezone()?)),
        };

        Ok(Self {
            clock,
            clipboard: Box::new(CommandClipboard::detect(cfg.get("clipboard.command").as_deref())),
            fallback_clipboard: Box::new(Osc52Clipboard::stdout()),
            opener: Box::new(SystemOpener::detect(cfg.get("open.command").as_deref())),
            preferences: Box::new(FilePreferenceStore::in_dir(data_dir)),
            rasterizer: Box::new(PngRasterizer::default()),
        })
    }

    /// Nothing leaves the process; exports are written as SVG.
    #[must_use]
    pub fn in_memory(today: NaiveDate) -> Self {
        Self {
            clock: Box::new(FixedClock(today)),
            clipboard: Box::new(MemoryClipboard::default()),
            fallback_clipboard: Box::new(MemoryClipboard::rejecting()),
            opener: Box::new(RecordingOpener::default()),
            preferences: Box::new(MemoryPreferenceStore::default()),
            rasterizer: Box::new(SvgRasterizer::default()),
        }
    }
}

pub struct App {
    state: AppState,
    scheduler: Scheduler<TimerEvent>,
    parts: Collaborators,
    export_dir: PathBuf,
    render_pending: bool,
    deferred: VecDeque<Effect>,
}

impl App {
    /// `language` overrides the stored preference for this session only.
    pub fn new(
        parts: Collaborators,
        language: Option<Language>,
        formatter: ShareFormatter,
        export_dir: PathBuf,
    ) -> Self {
        let language = language.unwrap_or_else(|| resolve_language(parts.preferences.as_ref()));
        let state = AppState::new(language, parts.clock.today(), formatter);

        Self {
            state,
            scheduler: Scheduler::new(),
            parts,
            export_dir,
            render_pending: true,
            deferred: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, refresh: Duration, feedback: Duration) -> Self {
        self.state = self.state.with_intervals(refresh, feedback);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn set_export_dir(&mut self, dir: PathBuf) {
        self.export_dir = dir;
    }

    /// Arms the periodic refresh.
    pub fn start(&mut self, now: Instant) {
        self.scheduler
            .schedule(TICK_KEY, self.state.refresh_interval, TimerEvent::Tick, now);
        self.render_pending = true;
    }

    #[must_use]
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.scheduler.is_scheduled(key)
    }

    pub fn poll_timeout(&self, now: Instant, default: Duration) -> Duration {
        self.scheduler.poll_timeout(now, default)
    }

    pub fn process_timers(&mut self, now: Instant) {
        for event in self.scheduler.drain_ready(now) {
            self.dispatch(Action::Timer(event), now);
        }
    }

    pub fn request_render(&mut self) {
        self.render_pending = true;
    }

    /// True once per batch of changes that need a redraw.
    pub fn take_render(&mut self) -> bool {
        std::mem::take(&mut self.render_pending)
    }

    /// Handles `action` and everything it leads to, slow work included.
    pub fn dispatch(&mut self, action: Action, now: Instant) {
        self.submit(action, now);
        self.run_deferred(now);
    }

    /// Like [`App::dispatch`], but image export is parked until
    /// [`App::run_deferred`] so the "exporting" state can be drawn first.
    pub fn submit(&mut self, action: Action, now: Instant) {
        self.drain(VecDeque::from([action]), now);
    }

    #[must_use]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn run_deferred(&mut self, now: Instant) {
        while let Some(effect) = self.deferred.pop_front() {
            let follow_up = self.run(effect, now);
            self.drain(follow_up.into_iter().collect(), now);
        }
    }

    fn drain(&mut self, mut queue: VecDeque<Action>, now: Instant) {
        while let Some(action) = queue.pop_front() {
            for effect in state::update(&mut self.state, action) {
                if let Some(follow_up) = self.apply(effect, now) {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn apply(&mut self, effect: Effect, now: Instant) -> Option<Action> {
        if matches!(effect, Effect::ExportImage) {
            debug!("export deferred");
            self.deferred.push_back(effect);
            return None;
        }
        self.run(effect, now)
    }

    fn run(&mut self, effect: Effect, now: Instant) -> Option<Action> {
        match effect {
            Effect::Render => {
                self.render_pending = true;
                None
            }
            Effect::Recompute => Some(Action::Tick(self.parts.clock.today())),
            Effect::PersistLanguage(language) => {
                if let Err(err) = self.parts.preferences.save_language(language) {
                    warn!(error = %err, "could not save language preference");
                }
                None
            }
            Effect::CopyText(text) => {
                let outcome = copy_with_fallback(
                    self.parts.clipboard.as_mut(),
                    self.parts.fallback_clipboard.as_mut(),
                    &text,
                );
                debug!(?outcome, "copy finished");
                Some(Action::CopyFinished { ok: outcome.is_ok() })
            }
            Effect::ExportImage => {
                let mut area = CaptureArea::new(self.state.view());
                let result = export_image(&mut area, self.parts.rasterizer.as_ref(), &self.export_dir)
                    .map_err(|err| err.to_string());
                Some(Action::ExportFinished(result))
            }
            Effect::OpenShare { platform, url, text } => {
                let outcome = share_with_fallback(
                    self.parts.opener.as_mut(),
                    self.parts.clipboard.as_mut(),
                    self.parts.fallback_clipboard.as_mut(),
                    &url,
                    &text,
                );
                Some(Action::ShareFinished { platform, outcome })
            }
            Effect::Schedule { key, delay, event } => {
                self.scheduler.schedule(key, delay, event, now);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use chrono::NaiveDate;

    use super::{App, Collaborators};
    use crate::clipboard::MemoryClipboard;
    use crate::locale::Language;
    use crate::opener::RecordingOpener;
    use crate::share::{ShareFormatter, SharePlatform};
    use crate::state::{Action, Control, Feedback};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date")
    }

    fn app(parts: Collaborators) -> App {
        App::new(parts, None, ShareFormatter::default(), PathBuf::from("."))
    }

    #[test]
    fn starts_in_stored_or_overridden_language() {
        assert_eq!(app(Collaborators::in_memory(today())).state().language, Language::ZhCn);

        let pinned = App::new(
            Collaborators::in_memory(today()),
            Some(Language::En),
            ShareFormatter::default(),
            PathBuf::from("."),
        );
        assert_eq!(pinned.state().language, Language::En);
    }

    #[test]
    fn copy_feedback_expires_after_window() {
        let mut app = app(Collaborators::in_memory(today()))
            .with_intervals(Duration::from_secs(60), Duration::from_secs(2));
        let start = Instant::now();

        app.dispatch(Action::CopyRequested, start);
        assert_eq!(app.state().feedback(Control::Copy), Some(&Feedback::Copied));
        assert!(app.is_scheduled("feedback.copy"));
        assert!(app.take_render());
        assert!(!app.take_render());

        app.process_timers(start + Duration::from_secs(1));
        assert_eq!(app.state().feedback(Control::Copy), Some(&Feedback::Copied));

        app.process_timers(start + Duration::from_secs(2));
        assert_eq!(app.state().feedback(Control::Copy), None);
        assert!(app.take_render());
    }

    #[test]
    fn stale_feedback_timer_does_not_clear_newer_message() {
        let mut app = app(Collaborators::in_memory(today()))
            .with_intervals(Duration::from_secs(60), Duration::from_secs(2));
        let start = Instant::now();

        app.dispatch(Action::CopyFinished { ok: true }, start);
        app.dispatch(Action::CopyFinished { ok: false }, start + Duration::from_secs(1));

        app.process_timers(start + Duration::from_secs(2));
        assert_eq!(app.state().feedback(Control::Copy), Some(&Feedback::CopyFailed));

        app.process_timers(start + Duration::from_secs(3));
        assert_eq!(app.state().feedback(Control::Copy), None);
    }

    #[test]
    fn both_clipboards_failing_shows_copy_error() {
        let mut parts = Collaborators::in_memory(today());
        parts.clipboard = Box::new(MemoryClipboard::rejecting());
        let mut app = app(parts);

        app.dispatch(Action::CopyRequested, Instant::now());
        assert_eq!(app.state().feedback(Control::Copy), Some(&Feedback::CopyFailed));
    }

    #[test]
    fn blocked_share_falls_back_to_prompt() {
        let mut parts = Collaborators::in_memory(today());
        parts.opener = Box::new(RecordingOpener {
            fail: true,
            ..RecordingOpener::default()
        });
        let mut app = app(parts);

        app.dispatch(Action::ShareRequested(SharePlatform::X), Instant::now());
        assert_eq!(app.state().feedback(Control::Share), Some(&Feedback::SharePrompt));
    }

    #[test]
    fn export_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = App::new(
            Collaborators::in_memory(today()),
            None,
            ShareFormatter::default(),
            dir.path().join("gone"),
        );

        app.dispatch(Action::ExportRequested, Instant::now());
        assert_eq!(app.state().feedback(Control::Export), Some(&Feedback::ExportFailed));
        assert!(app.is_scheduled("feedback.export"));
    }

    #[test]
    fn exporting_state_is_visible_before_export_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = App::new(
            Collaborators::in_memory(today()),
            None,
            ShareFormatter::default(),
            dir.path().to_path_buf(),
        );
        app.take_render();

        let now = Instant::now();
        app.submit(Action::ExportRequested, now);
        assert_eq!(app.state().feedback(Control::Export), Some(&Feedback::Exporting));
        assert!(app.take_render());
        assert!(app.has_deferred());
        assert!(!dir.path().join("year_progress.svg").exists());

        app.run_deferred(now);
        assert!(!app.has_deferred());
        assert_eq!(
            app.state().feedback(Control::Export),
            Some(&Feedback::Exported(dir.path().join("year_progress.svg")))
        );
        assert!(app.take_render());
    }

    #[test]
    fn tick_rearms_and_reads_clock() {
        let mut app = app(Collaborators::in_memory(today()))
            .with_intervals(Duration::from_secs(60), Duration::from_secs(2));
        let start = Instant::now();
        app.start(start);
        assert!(app.is_scheduled("tick"));
        assert_eq!(app.poll_timeout(start, Duration::from_secs(600)), Duration::from_secs(60));

        app.process_timers(start + Duration::from_secs(60));
        assert!(app.is_scheduled("tick"));
        assert_eq!(app.state().progress.day_of_year, 183);
    }
}
