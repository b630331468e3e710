use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, execute, queue, terminal};
use tracing::{debug, info};

use crate::app::App;
use crate::render::Renderer;
use crate::share::SharePlatform;
use crate::state::Action;

const IDLE_POLL: Duration = Duration::from_millis(500);

/// Keeps the page on screen until the user quits. The terminal is restored
/// even when the loop fails.
#[tracing::instrument(skip_all)]
pub fn run(app: &mut App, renderer: &Renderer) -> anyhow::Result<()> {
    let renderer = renderer.clone().with_raw_mode(true);
    let mut stdout = io::stdout();

    terminal::enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)
        .context("failed to enter alternate screen")?;
    info!("watch started");

    let result = event_loop(app, &renderer, &mut stdout);

    let restore = execute!(stdout, cursor::Show, terminal::LeaveAlternateScreen)
        .and_then(|()| terminal::disable_raw_mode())
        .context("failed to restore terminal");

    info!("watch stopped");
    result.and(restore)
}

fn event_loop<W: Write>(app: &mut App, renderer: &Renderer, out: &mut W) -> anyhow::Result<()> {
    app.start(Instant::now());

    while !app.state().should_exit() {
        app.process_timers(Instant::now());

        if app.take_render() {
            queue!(out, cursor::MoveTo(0, 0), terminal::Clear(terminal::ClearType::All))?;
            renderer.render_page(out, app.state())?;
        }

        if app.has_deferred() {
            app.run_deferred(Instant::now());
            continue;
        }

        let timeout = app.poll_timeout(Instant::now(), IDLE_POLL);
        if !event::poll(timeout)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if let Some(action) = key_action(key) {
                    debug!(?action, "key action");
                    app.submit(action, Instant::now());
                }
            }
            Event::Resize(..) => app.request_render(),
            _ => {}
        }
    }

    Ok(())
}

#[must_use]
pub fn key_action(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c')).then_some(Action::Quit);
    }

    let action = match key.code {
        KeyCode::Char('c') => Action::CopyRequested,
        KeyCode::Char('e') => Action::ExportRequested,
        KeyCode::Char('x') => Action::ShareRequested(SharePlatform::X),
        KeyCode::Char('w') => Action::ShareRequested(SharePlatform::Weibo),
        KeyCode::Char('l') => Action::ToggleLanguage,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        _ => return None,
    };
    Some(action)
}
