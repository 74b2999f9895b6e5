//! Deployment pipelines: the step abstraction, the driver, and the checkout
//! manager that pins the working copy before handing off to the installer.

pub mod checkout;
pub mod fsm;
pub mod git;
pub mod pipeline;
pub mod step;
