//! # Codenire Client
//!
//! Entities and wire contracts shared between the Codenire sandbox
//! orchestrator and its consumers: the template manifest schema, the
//! submission / sandbox execution API bodies, and the process
//! configuration types.

pub mod api;
pub mod entities;
