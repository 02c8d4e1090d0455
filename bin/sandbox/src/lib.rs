//! Core of the Codenire sandbox service: template manifests, image
//! builds, and the warm pool of idle replica containers. The HTTP
//! surfaces consume this crate; they never reach around it.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod docker;
pub mod helpers;
pub mod image;
pub mod manifest;
pub mod orchestrator;
pub mod postgres;
pub mod state;
pub mod storage;
