//! Configuration and the on-host paths derived from it

pub mod layout;
pub mod settings;
