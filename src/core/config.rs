//! Purpose: Supply the optional explicit GEOS library path override.
//! Exports: `ConfigSource`, `EnvSource`, `JsonFileSource`, `Settings`, `Layered`, `library_override`.
//! Role: Configuration seam consumed by the loader before any name search.
//! Invariants: A missing value, an empty value, and a failing source all mean "no override".
//! Invariants: Sources never panic; read/parse failures come back as `Error`.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};

pub const LIBRARY_PATH_VAR: &str = "GEOS_LIBRARY_PATH";

pub trait ConfigSource: Send + Sync {
    fn geos_library_path(&self) -> Result<Option<PathBuf>, Error>;
}

/// Reads the override from an environment variable (`GEOS_LIBRARY_PATH` by default).
#[derive(Clone, Debug)]
pub struct EnvSource {
    var: String,
}

impl EnvSource {
    pub fn named(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::named(LIBRARY_PATH_VAR)
    }
}

impl ConfigSource for EnvSource {
    fn geos_library_path(&self) -> Result<Option<PathBuf>, Error> {
        match env::var_os(&self.var) {
            Some(value) => Ok(Some(PathBuf::from(value))),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub geos_library_path: Option<PathBuf>,
}

impl Settings {
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            geos_library_path: Some(path.into()),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid settings json")
                .with_source(err)
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read settings file")
                .with_path(path)
                .with_source(err)
        })?;
        Self::from_json_str(&text).map_err(|err| err.with_path(path))
    }
}

impl ConfigSource for Settings {
    fn geos_library_path(&self) -> Result<Option<PathBuf>, Error> {
        Ok(self.geos_library_path.clone())
    }
}

/// Settings file read on every lookup; the loader only asks once.
#[derive(Clone, Debug)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for JsonFileSource {
    fn geos_library_path(&self) -> Result<Option<PathBuf>, Error> {
        Settings::from_json_file(&self.path)?.geos_library_path()
    }
}

/// First source that yields a non-empty path wins. Failing sources are skipped.
#[derive(Default)]
pub struct Layered {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl Layered {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl ConfigSource for Layered {
    fn geos_library_path(&self) -> Result<Option<PathBuf>, Error> {
        for source in &self.sources {
            if let Some(path) = library_override(source.as_ref()) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

impl ConfigSource for Option<PathBuf> {
    fn geos_library_path(&self) -> Result<Option<PathBuf>, Error> {
        Ok(self.clone())
    }
}

/// Collapses every "no override" outcome to `None`.
pub fn library_override(source: &dyn ConfigSource) -> Option<PathBuf> {
    match source.geos_library_path() {
        Ok(Some(path)) if !path.as_os_str().is_empty() => Some(path),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unreadable GEOS library override");
            None
        }
    }
}
