//! Filesystem helpers for the host the pipeline runs on

pub mod dir;
pub mod file;
