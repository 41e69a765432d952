//! Repository traits and implementations.

pub mod environment;
pub mod queue;
pub mod run;
pub mod schedule;

pub use environment::{EnvironmentRecord, EnvironmentRepo, PgEnvironmentRepo};
pub use queue::{JobQueueRepo, JobRecord, PgJobQueueRepo, QueueDepth};
pub use run::{EnvironmentUsage, PgRunRepo, RunRecord, RunRepo};
pub use schedule::{PgScheduleRepo, ScheduleRecord, ScheduleRepo};
