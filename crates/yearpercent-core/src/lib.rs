pub mod app;
pub mod cli;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod export;
pub mod locale;
pub mod opener;
pub mod preferences;
pub mod progress;
pub mod render;
pub mod scheduler;
pub mod share;
pub mod state;
pub mod view;
pub mod watch;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);
  let command = cli.command();
  let watching =
    command == cli::Command::Watch;

  // The full-screen view owns the
  // terminal, so watch logs go to a
  // file once the data dir is known.
  let mut log_guard = None;
  if !watching {
    log_guard = cli::start_logging(
      cli.verbose,
      cli.quiet,
      None
    )?;
  }

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  if watching {
    log_guard = cli::start_logging(
      cli.verbose,
      cli.quiet,
      Some(&data_dir)
    )?;
  }
  debug!(data_dir = %data_dir.display(), ?command, "resolved settings");

  let parts =
    app::Collaborators::system(
      &cfg, &data_dir, cli.date
    )?;
  let formatter =
    share::ShareFormatter::new(
      cfg.get("site.url").unwrap_or_else(
        || {
          share::DEFAULT_SITE_URL
            .to_string()
        }
      )
    );
  let mut app = app::App::new(
    parts,
    cli.lang,
    formatter,
    cfg.export_dir()
  )
  .with_intervals(
    cfg.get_seconds(
      "refresh.seconds",
      60
    )?,
    cfg.get_seconds(
      "feedback.seconds",
      2
    )?
  );

  let renderer =
    render::Renderer::new(&cfg)?;
  let mut out = io::stdout();

  commands::dispatch(
    &mut app,
    &renderer,
    &mut out,
    command
  )?;

  info!("done");
  drop(log_guard);
  Ok(())
}
