//! `zp-calib` library crate.
//!
//! The binary (`zpcal`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., survey-specific drivers, notebooks)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod apply;
pub mod calib;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
