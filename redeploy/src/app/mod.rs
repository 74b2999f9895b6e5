//! Operator-facing commands that do not run a host pipeline directly

pub mod deploy;
pub mod status;
