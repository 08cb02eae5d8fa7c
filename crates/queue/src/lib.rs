//! Background job queue for tootbox.
//!
//! This crate runs media processing off the request path using Redis:
//!
//! - **Jobs**: media processing jobs pushed by the attachment service
//! - **Workers**: concurrent job execution with Apalis
//! - **Scheduler**: periodic sweeps for stuck and failed uploads

pub mod jobs;
pub mod media_queue;
pub mod scheduler;
pub mod workers;

pub use jobs::*;
pub use media_queue::RedisMediaQueue;
pub use scheduler::{JobExecutor, ScheduledJob, SchedulerConfig, run_job, run_scheduler};
pub use workers::*;
