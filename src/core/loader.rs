//! Purpose: Own the process-wide GEOS library handle and load it exactly once.
//! Exports: `NativeLibrary`, `LibraryLoader`, `DynamicLoader`, `SymbolResolver`, `GeosLibrary`, `load_library`.
//! Role: Second half of the load sequence (open + entry point validation) and the lazy owner.
//! Invariants: The load sequence runs at most once per `GeosLibrary`; its outcome is cached.
//! Invariants: Concurrent first access never observes a partially initialized handle.
//! Invariants: `initGEOS_r` / `finishGEOS_r` are checked for presence, never called here.
//! Invariants: All `libloading` interaction is confined to this module.
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, OnceLock};

use crate::core::config::{ConfigSource, EnvSource};
use crate::core::error::{Error, ErrorKind};
use crate::core::locate::{LibrarySearch, Platform, SystemSearch, locate_library};
use crate::core::sys::{self, RawSymbol};

/// A loaded shared library that can hand out symbol addresses.
pub trait NativeLibrary: Send + Sync {
    fn path(&self) -> &Path;

    fn symbol(&self, name: &str) -> Result<RawSymbol, Error>;
}

pub trait LibraryLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn NativeLibrary>, Error>;
}

/// Anything that can turn a symbol name into an address, loading whatever it
/// needs first.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<RawSymbol, Error>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicLoader;

impl LibraryLoader for DynamicLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn NativeLibrary>, Error> {
        // Running foreign initializers is inherent to loading GEOS.
        let library = unsafe { libloading::Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::Load)
                .with_message("failed to load the GEOS library")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Arc::new(DynamicLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }
}

struct DynamicLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl NativeLibrary for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Result<RawSymbol, Error> {
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }.map_err(|err| {
            Error::new(ErrorKind::Symbol)
                .with_message("symbol not found in the GEOS library")
                .with_path(&self.path)
                .with_symbol(name)
                .with_source(err)
        })?;
        let address = *symbol;
        if address.is_null() {
            return Err(Error::new(ErrorKind::Symbol)
                .with_message("symbol resolved to a null address")
                .with_path(&self.path)
                .with_symbol(name));
        }
        Ok(address)
    }
}

/// Runs the full locate, open, validate sequence once, uncached.
pub fn load_library(
    platform: &Platform,
    config: &dyn ConfigSource,
    search: &dyn LibrarySearch,
    loader: &dyn LibraryLoader,
) -> Result<Arc<dyn NativeLibrary>, Error> {
    let located = locate_library(platform, config, search)?;
    let library = loader.open(located.path())?;

    for entry_point in [sys::INIT_SYMBOL, sys::FINISH_SYMBOL] {
        library.symbol(entry_point).map_err(|err| {
            Error::new(ErrorKind::Load)
                .with_message(format!("missing required entry point {entry_point}"))
                .with_path(library.path())
                .with_symbol(entry_point)
                .with_source(err)
        })?;
    }

    tracing::info!(path = %library.path().display(), "loaded GEOS library");
    Ok(library)
}

/// Lazily loaded GEOS library. Cheap to construct; the first `handle()` call
/// performs the load and every later call returns the cached outcome.
pub struct GeosLibrary {
    platform: Platform,
    config: Box<dyn ConfigSource>,
    search: Box<dyn LibrarySearch>,
    loader: Box<dyn LibraryLoader>,
    state: OnceLock<Result<Arc<dyn NativeLibrary>, Error>>,
}

static GLOBAL: LazyLock<Arc<GeosLibrary>> = LazyLock::new(|| Arc::new(GeosLibrary::new()));

impl GeosLibrary {
    /// Host defaults: current platform, `GEOS_LIBRARY_PATH`, system search, `libloading`.
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
            config: Box::new(EnvSource::default()),
            search: Box::new(SystemSearch),
            loader: Box::new(DynamicLoader),
            state: OnceLock::new(),
        }
    }

    /// The process-wide instance built from host defaults.
    pub fn global() -> Arc<GeosLibrary> {
        Arc::clone(&GLOBAL)
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_config(mut self, config: impl ConfigSource + 'static) -> Self {
        self.config = Box::new(config);
        self
    }

    pub fn with_search(mut self, search: impl LibrarySearch + 'static) -> Self {
        self.search = Box::new(search);
        self
    }

    pub fn with_loader(mut self, loader: impl LibraryLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn config(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }

    pub fn search(&self) -> &dyn LibrarySearch {
        self.search.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state.get(), Some(Ok(_)))
    }

    pub fn handle(&self) -> Result<Arc<dyn NativeLibrary>, Error> {
        self.state
            .get_or_init(|| {
                load_library(
                    &self.platform,
                    self.config.as_ref(),
                    self.search.as_ref(),
                    self.loader.as_ref(),
                )
                .inspect_err(|err| tracing::debug!(error = %err, "GEOS library load failed"))
            })
            .clone()
    }
}

impl Default for GeosLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolResolver for GeosLibrary {
    fn resolve(&self, name: &str) -> Result<RawSymbol, Error> {
        self.handle()?.symbol(name)
    }
}
