//! Maps batch results to the process exit outcome.

use linkrelay_core::BatchSummary;

use crate::ProcessExit;

/// Failures and cancellations count against the run; oversized and duplicate
/// links are expected skips.
pub(crate) fn determine_exit_outcome(summary: &BatchSummary) -> ProcessExit {
    let bad = summary.failed + summary.cancelled;
    if bad == 0 {
        ProcessExit::Success
    } else if summary.succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
