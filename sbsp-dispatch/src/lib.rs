//! Partitioned job dispatch and bounded-concurrency genome scheduling
//!
//! A [`Dispatcher`] splits a [`WorkBundle`] into chunks, runs each chunk
//! through an [`Executor`], waits for all of them by polling, and merges the
//! completed outputs. A [`GenomeScheduler`] runs many such per-genome
//! pipelines with a cap on how many are active at once.

pub mod bundle;
pub mod dispatcher;
pub mod executor;
pub mod merge;
pub mod partition;
pub mod resolve;
pub mod scheduler;
pub mod wait;
pub mod work;

// Re-export main types
pub use bundle::{ArgValue, Chunk, OutputTemplate, WorkBundle};
pub use dispatcher::{ChunkFailure, DispatchResult, Dispatcher, CHUNK_MANIFEST};
pub use executor::{
    BatchSystem, ClusterExecutor, ClusterState, ExecutionRequest, Executor, JobId, JobStatus,
    LocalExecutor, PbsBatchSystem,
};
pub use merge::{ConcatMerger, IdentityMerger, ListFileMerger, MergedOutput, Merger};
pub use partition::{partition_sizes, GroupSplitter, ListSplitter, Splitter};
pub use resolve::DatabaseResolver;
pub use scheduler::{
    ConcurrencySlots, GenomeScheduler, ItemOutcome, ItemStatus, ItemTask, ScheduleReport,
    ITEM_MANIFEST,
};
pub use wait::{ImmediateWait, SleepWait, WaitStrategy};
pub use work::{CommandSpec, CommandWork, FnWork, WorkArgs, WorkContext, WorkFn};
