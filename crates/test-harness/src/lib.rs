//! Test harness for scripted modeling sessions.
//!
//! Drives the engine over the mock kernel and checks identity bookkeeping
//! at every step.
//!
//! # Key Components
//!
//! - [`ModelBuilder`]: Fluent API over `Engine` + `MockKernel`, with named features
//! - [`assertions`]: Identity assertions with diagnostic output
//! - [`helpers`]: Error type, tracing setup, snapshot helpers

pub mod assertions;
pub mod helpers;
pub mod workflow;

pub use helpers::{init_tracing, HarnessError};
pub use workflow::ModelBuilder;
