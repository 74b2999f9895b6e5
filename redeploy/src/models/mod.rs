//! Deployment inputs

pub mod target;
