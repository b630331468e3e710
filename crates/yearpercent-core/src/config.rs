use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV: &str = "YEARPERCENTRC";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.yearpercent"),
      ("color", "on"),
      ("site.url", crate::share::DEFAULT_SITE_URL),
      ("refresh.seconds", "60"),
      ("feedback.seconds", "2"),
      ("export.dir", ".")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Config {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .map
      .get(key)
      .filter(|v| !v.is_empty())
      .cloned()
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    let Some(raw) = self.get(key)
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<u64>()
      .map(Some)
      .with_context(|| {
        format!(
          "invalid number for {key}: \
           {raw}"
        )
      })
  }

  /// Whole seconds, never below one.
  pub fn get_seconds(
    &self,
    key: &str,
    default: u64
  ) -> anyhow::Result<Duration> {
    let secs = self
      .get_u64(key)?
      .unwrap_or(default)
      .max(1);
    Ok(Duration::from_secs(secs))
  }

  pub fn timezone(
    &self
  ) -> anyhow::Result<Option<Tz>> {
    let Some(raw) =
      self.get("timezone")
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<Tz>()
      .map(Some)
      .map_err(|e| {
        anyhow!(
          "invalid timezone {raw}: \
           {e}"
        )
      })
  }

  pub fn export_dir(&self) -> PathBuf {
    let raw = self
      .get("export.dir")
      .unwrap_or_else(|| {
        ".".to_string()
      });
    expand_tilde(Path::new(&raw))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line =
        strip_comment(raw_line).trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
          continue;
        }
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null"
      || rc_env.is_empty()
    {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".yearpercentrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".yearpercent"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

/// A `#` opens a comment only at the
/// start of a line or after
/// whitespace.
fn strip_comment(line: &str) -> &str {
  let mut prev_blank = true;
  for (idx, ch) in line.char_indices() {
    if ch == '#' && prev_blank {
      return &line[..idx];
    }
    prev_blank = ch.is_whitespace();
  }
  line
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use super::{
    Config,
    resolve_data_dir
  };

  #[test]
  fn defaults_cover_every_key() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("site.url").as_deref(),
      Some("www.yearpercent.xyz")
    );
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("on")
    );
    assert_eq!(
      cfg
        .get_seconds("refresh.seconds", 60)
        .expect("seconds"),
      Duration::from_secs(60)
    );
    assert_eq!(
      cfg.timezone().expect("tz"),
      None
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "timezone = Asia/Shanghai\n"
    )
    .expect("write include");
    let rc = dir.path().join("main.rc");
    fs::write(
      &rc,
      "# comment\nsite.url = example.org  # trailing\ninclude extra.rc\nfeedback.seconds=5\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(rc.as_path())).expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.get("site.url").as_deref(),
      Some("example.org")
    );
    assert_eq!(
      cfg.timezone().expect("tz"),
      Some(chrono_tz::Asia::Shanghai)
    );

    cfg.apply_overrides([(
      "rc.feedback.seconds".to_string(),
      "0".to_string()
    )]);
    assert_eq!(
      cfg
        .get_seconds("feedback.seconds", 2)
        .expect("seconds"),
      Duration::from_secs(1)
    );
  }

  #[test]
  fn hash_inside_value_is_kept() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let rc = dir.path().join("anchor.rc");
    fs::write(
      &rc,
      "site.url = example.org/#top # home\nexport.dir=~/pics#1\n  # indented comment\n"
    )
    .expect("write rc");

    let cfg =
      Config::load(Some(rc.as_path())).expect("load");
    assert_eq!(
      cfg.get("site.url").as_deref(),
      Some("example.org/#top")
    );
    assert_eq!(
      cfg.get("export.dir").as_deref(),
      Some("~/pics#1")
    );
  }

  #[test]
  fn bad_lines_and_values_are_errors() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "no equals here\n")
      .expect("write");
    assert!(Config::load(Some(rc.as_path())).is_err());

    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "refresh.seconds".to_string(),
        "soon".to_string()
      ),
      (
        "timezone".to_string(),
        "Mars/Olympus".to_string()
      )
    ]);
    assert!(
      cfg.get_u64("refresh.seconds").is_err()
    );
    assert!(cfg.timezone().is_err());
  }

  #[test]
  fn data_dir_is_created() {
    let dir =
      tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("state");
    let resolved = resolve_data_dir(
      &Config::default(),
      Some(target.as_path())
    )
    .expect("resolve");
    assert_eq!(resolved, target);
    assert!(target.is_dir());
  }
}
