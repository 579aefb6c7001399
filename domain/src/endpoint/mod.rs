//! Endpoint domain
//!
//! An [`Endpoint`] is one configured connection to an LLM backend. Everything
//! else in the system refers to endpoints by [`EndpointId`].

pub mod entities;

pub use entities::{Endpoint, EndpointId, Tunables};
