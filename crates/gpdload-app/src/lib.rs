//! Application layer for gpdload.
//!
//! The app layer coordinates the client, adapters and domain logic.
//! It does not parse CLI flags and it does not read configuration.

mod flow;
mod payload;
mod poll;
mod scenario;

pub use flow::{EndToEndUseCase, IterationOutcome, LoadRequest, LoadUseCase};
pub use payload::{PayloadRequest, PayloadUseCase, PreparedPayload};
pub use poll::{PollError, PollOutcome, UploadPoller};
pub use scenario::{
    ScenarioAction, ScenarioContext, ScenarioDriver, ScenarioError, UID_PLACEHOLDER,
};

use gpdload_domain::{Clock, summarize_durations};
use gpdload_types::{IterationResult, LoadSummary, RUN_SCHEMA_V1, RunReceipt, ToolInfo};
use time::format_description::well_known::Rfc3339;

pub fn now_rfc3339<C: Clock>(clock: &C) -> String {
    clock
        .now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Pass/fail counts; durations cover passed iterations only.
pub fn summarize(results: &[IterationResult]) -> LoadSummary {
    let passed: Vec<u64> = results
        .iter()
        .filter(|r| r.passed)
        .map(|r| r.elapsed_ms)
        .collect();
    LoadSummary {
        iterations: results.len() as u32,
        passed: passed.len() as u32,
        failed: (results.len() - passed.len()) as u32,
        duration: summarize_durations(&passed).ok(),
    }
}

/// Receipt for a single end-to-end run.
pub fn run_receipt(
    tool: ToolInfo,
    target: String,
    started_at: String,
    outcome: IterationOutcome,
) -> RunReceipt {
    RunReceipt {
        schema: RUN_SCHEMA_V1.to_string(),
        tool,
        target,
        started_at,
        result: outcome.result,
        report: outcome.report,
    }
}
