// Core modules: library location and loading, lazy bindings, handlers, and error modeling.
pub mod config;
pub mod errcheck;
pub mod error;
pub mod func;
pub mod handlers;
pub mod loader;
pub mod locate;
pub mod sys;
pub mod version;
