use std::io::Write;
use std::time::Instant;

use anyhow::{anyhow, bail};
use tracing::{info, instrument, warn};

use crate::app::App;
use crate::cli::Command;
use crate::locale::{self, Language, MessageKey};
use crate::render::Renderer;
use crate::share::SharePlatform;
use crate::state::{Action, Control, Feedback};
use crate::watch;

#[instrument(skip(app, renderer, out))]
pub fn dispatch<W: Write>(
    app: &mut App,
    renderer: &Renderer,
    out: &mut W,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Show { json } => cmd_show(app, renderer, out, json),
        Command::Copy => cmd_copy(app, out),
        Command::Export { out: dir } => {
            if let Some(dir) = dir {
                app.set_export_dir(dir);
            }
            cmd_export(app, out)
        }
        Command::Share { platform, print } => cmd_share(app, out, platform, print),
        Command::Lang { tag } => cmd_lang(app, out, tag.as_deref()),
        Command::Watch => watch::run(app, renderer),
        Command::Version => {
            writeln!(out, "yearpercent {}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
    }
}

fn cmd_show<W: Write>(app: &App, renderer: &Renderer, out: &mut W, json: bool) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, &app.state().view())?;
        writeln!(out)?;
        return Ok(());
    }
    renderer.render_page(out, app.state())
}

/// Prints a failed control's caption and, when it has one, the longer notice.
fn report_failure<W: Write>(out: &mut W, feedback: &Feedback, language: Language) -> anyhow::Result<()> {
    warn!(?feedback, "command did not succeed");
    writeln!(out, "{}", feedback.caption(language))?;
    if let Some(notice) = feedback.notice(language) {
        writeln!(out, "{notice}")?;
    }
    Ok(())
}

fn cmd_copy<W: Write>(app: &mut App, out: &mut W) -> anyhow::Result<()> {
    app.dispatch(Action::CopyRequested, Instant::now());
    let state = app.state();

    match state.feedback(Control::Copy) {
        Some(Feedback::Copied) => {
            writeln!(out, "{}", Feedback::Copied.caption(state.language))?;
            Ok(())
        }
        Some(feedback) => {
            report_failure(out, feedback, state.language)?;
            writeln!(out, "{}", state.copy_text())?;
            Ok(())
        }
        None => bail!("copy did not complete"),
    }
}

fn cmd_export<W: Write>(app: &mut App, out: &mut W) -> anyhow::Result<()> {
    app.dispatch(Action::ExportRequested, Instant::now());
    let state = app.state();

    match state.feedback(Control::Export) {
        Some(feedback) if matches!(feedback, Feedback::Exported(_)) => {
            if let Some(notice) = feedback.notice(state.language) {
                writeln!(out, "{notice}")?;
            }
            Ok(())
        }
        Some(feedback) => report_failure(out, feedback, state.language),
        None => bail!("export did not complete"),
    }
}

fn cmd_share<W: Write>(
    app: &mut App,
    out: &mut W,
    platform: SharePlatform,
    print: bool,
) -> anyhow::Result<()> {
    if print {
        let url = platform.share_url(&app.state().share_text())?;
        writeln!(out, "{url}")?;
        return Ok(());
    }

    app.dispatch(Action::ShareRequested(platform), Instant::now());
    let state = app.state();

    match state.feedback(Control::Share) {
        Some(feedback) if *feedback == Feedback::OpenBlocked => {
            report_failure(out, feedback, state.language)?;
            writeln!(out, "{}", state.share_text())?;
            Ok(())
        }
        Some(feedback) => {
            writeln!(out, "{}", feedback.caption(state.language))?;
            if *feedback == Feedback::SharePrompt {
                writeln!(out, "{}", state.share_text())?;
            }
            Ok(())
        }
        None => bail!("share did not complete"),
    }
}

fn cmd_lang<W: Write>(app: &mut App, out: &mut W, tag: Option<&str>) -> anyhow::Result<()> {
    let action = match tag {
        Some(tag) => {
            let language = Language::parse(tag)
                .ok_or_else(|| anyhow!("unknown language {tag}; expected one of: en, zh-CN"))?;
            Action::SetLanguage(language)
        }
        None => Action::ToggleLanguage,
    };

    app.dispatch(action, Instant::now());
    let language = app.state().language;
    info!(language = %language, "language set");

    writeln!(
        out,
        "{} ({})",
        locale::text(language, MessageKey::LanguageName),
        language.tag()
    )?;
    Ok(())
}
