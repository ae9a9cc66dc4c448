//! Per-run context threaded through every orchestrator call.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifies one reconciliation run.
///
/// The run id is only used to correlate log lines; it never affects control
/// flow. `dry_run` is fixed for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
}

impl RunContext {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            dry_run,
        }
    }

    /// Returns the first eight characters of the run id, for log prefixes.
    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string().chars().take(8).collect()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(false)
    }
}
