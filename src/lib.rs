//! Purpose: Runtime binding to the GEOS C library, shared by the `lgeos` CLI and downstream crates.
//! Exports: `api` (stable surface) and `core` (locate/load, lazy bindings, handlers, errors).
//! Role: Finds and loads `geos_c` on first use and resolves each function lazily.
//! Invariants: Nothing touches the native library until a binding or handle is first used.
//! Invariants: Core modules prefer explicit inputs over hidden state; the only globals are the lazy defaults.
pub mod api;
pub mod core;
