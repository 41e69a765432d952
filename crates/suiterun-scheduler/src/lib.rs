//! Job dispatch for suiterun.
//!
//! Ties the durable queue to actual test execution: a polling worker
//! claims jobs (PostgreSQL SKIP LOCKED underneath), a processor drives
//! each claimed job through the run lifecycle, a rate limiter reports
//! per-environment saturation, and a cron scheduler injects runs.

pub mod cron;
pub mod processor;
pub mod rate_limit;
pub mod worker;

pub use cron::CronScheduler;
pub use processor::JobProcessor;
pub use rate_limit::RateLimiter;
pub use worker::Worker;

#[cfg(test)]
pub(crate) mod testing;
