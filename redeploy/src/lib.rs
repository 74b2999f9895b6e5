//! redeploy library
//!
//! Checkout, build and install a single service onto a remote host.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod installer;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
