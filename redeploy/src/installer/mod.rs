//! Build & install manager.
//!
//! Provisions the host, builds the release artifact from the working copy,
//! swaps it in with a one-generation backup and reconciles the service unit.
//! These steps run on the target itself: file checks use the local
//! filesystem and commands go through the runner.

pub mod build;
pub mod install;
pub mod provision;
pub mod service;
