//! Purpose: Define the public Rust API boundary for lgeos.
//! Exports: `Geos`, `Context`, configuration sources, error types, and the raw ABI types.
//! Role: Public, additive-only surface used by the CLI and downstream crates.
//! Invariants: The process-wide library is only reached through `Geos::global` / `GeosLibrary::global`.
//! Invariants: Everything else takes an explicit `Arc<GeosLibrary>`.

mod context;
mod geos;

pub use crate::core::config::{
    ConfigSource, EnvSource, JsonFileSource, LIBRARY_PATH_VAR, Layered, Settings,
};
pub use crate::core::errcheck::{
    check_minus_one, check_nonnull, check_predicate, check_string, check_zero,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::func::{Binding, CType, LazyFunc, NativeFn, ResultCheck, Signature};
pub use crate::core::handlers::{error_handler, notice_handler, render_message};
pub use crate::core::loader::{
    DynamicLoader, GeosLibrary, LibraryLoader, NativeLibrary, SymbolResolver,
};
pub use crate::core::locate::{
    LibrarySearch, Located, Platform, SystemSearch, candidate_names, locate_library,
};
pub use crate::core::sys;
pub use crate::core::version::GeosVersion;
pub use context::Context;
pub use geos::{BindingInfo, Geos, geos_version, geos_version_tuple};
