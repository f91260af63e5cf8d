//! Purpose: Entry point tying the lazy library to its function bindings.
//! Exports: `Geos`, `BindingInfo`, `geos_version`, `geos_version_tuple`.
//! Role: What callers hold; owns the built-in bindings and hands out new ones.
//! Invariants: Building a `Geos` never loads the library.
//! Invariants: Every binding shares the `GeosLibrary` it was created from.
use std::ffi::CStr;
use std::sync::{Arc, LazyLock};

use serde::Serialize;

use super::context::Context;
use crate::core::errcheck::{check_nonnull, check_string};
use crate::core::error::{Error, ErrorKind};
use crate::core::func::{LazyFunc, NativeFn};
use crate::core::loader::{GeosLibrary, NativeLibrary, SymbolResolver};
use crate::core::sys::{self, FinishFn, GEOSContextHandle_t, InitFn, VersionFn};
use crate::core::version::GeosVersion;

/// Snapshot of one binding, for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct BindingInfo {
    pub symbol: String,
    pub signature: String,
    pub checked: bool,
    pub resolved: bool,
}

impl BindingInfo {
    fn of<F: NativeFn>(func: &LazyFunc<F>) -> Self {
        Self {
            symbol: func.name().to_string(),
            signature: func.signature().to_string(),
            checked: func.has_check(),
            resolved: func.is_resolved(),
        }
    }
}

pub struct Geos {
    library: Arc<GeosLibrary>,
    version: LazyFunc<VersionFn>,
    init: LazyFunc<InitFn>,
    finish: LazyFunc<FinishFn>,
}

static GLOBAL: LazyLock<Geos> = LazyLock::new(|| Geos::new(GeosLibrary::global()));

impl Geos {
    pub fn new(library: Arc<GeosLibrary>) -> Self {
        let resolver: Arc<dyn SymbolResolver> = library.clone();
        Self {
            version: LazyFunc::new(sys::VERSION_SYMBOL, resolver.clone()).with_check(check_string),
            init: LazyFunc::new(sys::INIT_SYMBOL, resolver.clone())
                .with_check(check_nonnull::<GEOSContextHandle_t>),
            finish: LazyFunc::new(sys::FINISH_SYMBOL, resolver),
            library,
        }
    }

    /// Bindings over the process-wide library.
    pub fn global() -> &'static Geos {
        &GLOBAL
    }

    pub fn library(&self) -> &Arc<GeosLibrary> {
        &self.library
    }

    /// Forces the library load (or returns the cached failure).
    pub fn handle(&self) -> Result<Arc<dyn NativeLibrary>, Error> {
        self.library.handle()
    }

    /// A new unresolved binding for any exported function.
    pub fn bind<F: NativeFn>(&self, symbol: impl Into<String>) -> LazyFunc<F> {
        let resolver: Arc<dyn SymbolResolver> = self.library.clone();
        LazyFunc::new(symbol, resolver)
    }

    /// Checks that `symbol` is exported without binding it to a type.
    pub fn probe(&self, symbol: &str) -> Result<(), Error> {
        self.library.resolve(symbol).map(|_| ())
    }

    pub fn bindings(&self) -> Vec<BindingInfo> {
        vec![
            BindingInfo::of(&self.version),
            BindingInfo::of(&self.init),
            BindingInfo::of(&self.finish),
        ]
    }

    /// Raw `GEOSversion()` string, e.g. `3.9.1-CAPI-1.14.2`.
    pub fn version(&self) -> Result<String, Error> {
        let raw = unsafe { self.version.call(()) }?;
        let text = unsafe { CStr::from_ptr(raw) };
        text.to_str().map(str::to_string).map_err(|err| {
            Error::new(ErrorKind::Geos)
                .with_message("GEOS version is not valid UTF-8")
                .with_symbol(self.version.name())
                .with_source(err)
        })
    }

    pub fn version_tuple(&self) -> Result<GeosVersion, Error> {
        GeosVersion::parse(&self.version()?)
    }

    /// A fresh context with the notice/error handlers installed.
    pub fn context(&self) -> Result<Context, Error> {
        let library = self.library.handle()?;
        Context::create(library, &self.init, &self.finish)
    }
}

impl std::fmt::Debug for Geos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geos")
            .field("loaded", &self.library.is_loaded())
            .field("bindings", &self.bindings())
            .finish()
    }
}

pub fn geos_version() -> Result<String, Error> {
    Geos::global().version()
}

pub fn geos_version_tuple() -> Result<GeosVersion, Error> {
    Geos::global().version_tuple()
}
