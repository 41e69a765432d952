//! Core domain types and traits for the suiterun test orchestrator.
//!
//! This crate contains:
//! - Resource identifiers and common types
//! - Run and job lifecycle state machines
//! - The `TestRunner` trait (test-process collaborator)
//! - The `ArtifactStore` trait (trace/report storage collaborator)
//! - Runtime configuration knobs

pub mod artifact;
pub mod config;
pub mod error;
pub mod id;
pub mod job;
pub mod run;
pub mod runner;

pub use error::{Error, Result};
pub use id::ResourceId;
pub use job::JobStatus;
pub use run::{NewRun, RunStatus, TriggerKind};
pub use runner::{TestOutcome, TestRunner};
