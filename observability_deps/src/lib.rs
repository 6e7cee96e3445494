//! Version-pinning shim for observability dependencies.
//!
//! Every crate in the workspace logs through this re-export so that the
//! `tracing` version (and any subscriber configuration concerns) are managed
//! in exactly one place.

pub use tracing;
