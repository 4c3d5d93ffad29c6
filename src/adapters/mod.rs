//! Bundled adapter implementations
//!
//! The engine only depends on the [`crate::adapter::Adapter`] trait; the
//! adapters here cover common task shapes so simple optimizations need no
//! custom glue.

pub mod default;

pub use default::{DefaultAdapter, TaskInstance};
