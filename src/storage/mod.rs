//! Storage adapters.
//!
//! [`traits`] defines the seams the engine is injected with; [`memory`]
//! provides fully functional in-memory implementations used by the test
//! suite and usable as embedded backends.

pub mod memory;
pub mod traits;
