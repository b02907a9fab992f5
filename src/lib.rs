// Gumdrop - a multi-protocol network server core for Rust
//
// This library re-exports the HTTP/2 stream-priority scheduler and the
// asynchronous request lifecycle manager that protocol front-ends build on.

// Re-export core functionality
pub use gumdrop_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use gumdrop_config;
