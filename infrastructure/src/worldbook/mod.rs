//! Worldbook sources
//!
//! Provides [`JsonWorldbookStore`], a directory of SillyTavern-style JSON
//! exports implementing the [`WorldbookStore`](conclave_application::WorldbookStore) port.

mod json_store;

pub use json_store::JsonWorldbookStore;
