//! Dispatch and collection: the bounded worker pool that runs fetch jobs and
//! the aggregator that turns their outcomes into ledger rows.

pub mod aggregator;
pub mod worker_pool;

pub use aggregator::{aggregate, ResultAggregator};
pub use worker_pool::{
    Completion, Job, ShutdownReport, SubmitPermit, TaskContext, WorkerPool, WorkerPoolParams,
};
