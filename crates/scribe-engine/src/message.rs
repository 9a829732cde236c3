//! Queue message payload.

use scribe_core::JobId;
use serde::{Deserialize, Serialize};

/// Payload published to the generation queue.
///
/// Carries only the job ID; all job state lives in the store, so a
/// redelivered message always sees the job's current status rather than a
/// stale snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobMessage {
    /// The job to process.
    pub job_id: JobId,
}
