//! Rolling summaries: throttle policy, generation and background workers.

pub mod policy;
pub mod queue;
pub mod summarizer;

pub use policy::SummaryPolicy;
pub use queue::{
    EnqueueOutcome, SummaryJob, SummaryQueue, SummaryWorkerHandle, SummaryWorkers, summary_queue,
};
pub use summarizer::{Summarizer, SummaryOutcome, render_transcript};
