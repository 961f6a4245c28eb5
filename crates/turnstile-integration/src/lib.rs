//! Turnstile Integration - re-exports the whole workflow core
#![deny(unsafe_code)]

pub use flow_checks;
pub use flow_engine;
pub use flow_types;
pub use rights_engine;
pub use rights_types;
pub use turnstile_storage;
