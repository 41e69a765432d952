//! Execution backends for suiterun.
//!
//! Provides the concrete collaborators behind the core traits: a local
//! process runner for launching test suites, and a filesystem artifact
//! store standing in for object storage.

pub mod artifacts;
pub mod process;

pub use artifacts::LocalArtifactStore;
pub use process::ProcessTestRunner;
