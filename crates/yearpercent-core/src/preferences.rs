use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::locale::{DEFAULT_LANGUAGE, Language};

pub const PREFERENCES_FILE: &str = "preferences.toml";

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// The single persisted user preference.
pub trait PreferenceStore {
    fn load_language(&self) -> Result<Option<Language>, PreferenceError>;

    fn save_language(&mut self, language: Language) -> Result<(), PreferenceError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(
        rename = "preferredLanguage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    preferred_language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PREFERENCES_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> PreferenceError {
        PreferenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn load_language(&self) -> Result<Option<Language>, PreferenceError> {
        if !self.path.exists() {
            debug!("no preferences file yet");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        let parsed: PreferenceFile = toml::from_str(&raw).map_err(|source| PreferenceError::Parse {
            path: self.path.clone(),
            source,
        })?;

        Ok(parsed.preferred_language.as_deref().map(Language::from_tag))
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn save_language(&mut self, language: Language) -> Result<(), PreferenceError> {
        let payload = toml::to_string(&PreferenceFile {
            preferred_language: Some(language.tag().to_string()),
        })?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|source| self.io_error(source))?;
        temp.write_all(payload.as_bytes())
            .map_err(|source| self.io_error(source))?;
        temp.flush().map_err(|source| self.io_error(source))?;
        temp.persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;

        info!(language = %language, "saved preferred language");
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPreferenceStore {
    pub language: Option<Language>,
    pub saves: usize,
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load_language(&self) -> Result<Option<Language>, PreferenceError> {
        Ok(self.language)
    }

    fn save_language(&mut self, language: Language) -> Result<(), PreferenceError> {
        self.language = Some(language);
        self.saves += 1;
        Ok(())
    }
}

/// Stored language, or the default when nothing usable is stored.
pub fn resolve_language(store: &dyn PreferenceStore) -> Language {
    match store.load_language() {
        Ok(Some(language)) => language,
        Ok(None) => DEFAULT_LANGUAGE,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable preferences");
            DEFAULT_LANGUAGE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{FilePreferenceStore, PreferenceStore, resolve_language};
    use crate::locale::Language;

    #[test]
    fn first_run_defaults_to_chinese() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePreferenceStore::in_dir(dir.path());
        assert_eq!(store.load_language().expect("load"), None);
        assert_eq!(resolve_language(&store), Language::ZhCn);
    }

    #[test]
    fn saved_language_round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FilePreferenceStore::in_dir(dir.path());
        store.save_language(Language::En).expect("save");

        let raw = fs::read_to_string(store.path()).expect("read");
        assert_eq!(raw.trim(), r#"preferredLanguage = "en""#);

        let reopened = FilePreferenceStore::in_dir(dir.path());
        assert_eq!(resolve_language(&reopened), Language::En);
    }

    #[test]
    fn corrupt_or_unknown_values_fall_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilePreferenceStore::in_dir(dir.path());

        fs::write(store.path(), "preferredLanguage = ").expect("write");
        assert!(store.load_language().is_err());
        assert_eq!(resolve_language(&store), Language::ZhCn);

        fs::write(store.path(), "preferredLanguage = \"fr\"\n").expect("write");
        assert_eq!(store.load_language().expect("load"), Some(Language::ZhCn));
    }

    #[test]
    fn creates_missing_data_dir_on_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        let mut store = FilePreferenceStore::in_dir(&nested);
        store.save_language(Language::ZhCn).expect("save");
        assert_eq!(resolve_language(&store), Language::ZhCn);
    }
}
