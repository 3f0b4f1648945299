//! Deadline enforcement and fault containment for processing requests.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::cancel::CancellationToken;
use crate::engine::ProcessOutput;
use crate::error::{OtsuError, Result};
use crate::params::{OtsuParams, ProcessingMethod};

/// Per-request deadline: a strategy base budget plus increments for the
/// request's complexity drivers.
pub fn timeout_budget(params: &OtsuParams, width: u32, height: u32) -> Duration {
    let mut secs: u64 = match params.processing_method {
        ProcessingMethod::SingleScale => 30,
        ProcessingMethod::MultiScalePyramid => 120 + 15 * params.pyramid_levels as u64,
        ProcessingMethod::RegionAdaptive => {
            let grid = params.region_grid_size.max(1) as u64;
            let cells = (width as u64 / grid).max(1) * (height as u64 / grid).max(1);
            60 + cells / 1000
        }
    };
    if params.homomorphic_filtering {
        secs += 15;
    }
    if params.anisotropic_diffusion {
        secs += 2 * params.diffusion_iterations as u64;
    }
    Duration::from_secs(secs)
}

/// Runs `job` on a worker thread and waits at most `budget`.
///
/// A deadline overrun cancels the token (so the detached worker stops at its
/// next boundary poll) and returns a timeout error; a worker panic becomes a
/// computation error.
pub(crate) fn run_with_deadline<F>(
    operation: &str,
    budget: Duration,
    token: &CancellationToken,
    job: F,
) -> Result<ProcessOutput>
where
    F: FnOnce() -> Result<ProcessOutput> + Send + 'static,
{
    debug!(operation, ?budget, "dispatching worker");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let outcome = catch_unwind(AssertUnwindSafe(job));
        // The receiver may be gone after a timeout; nothing to do then.
        let _ = tx.send(outcome);
    });

    match rx.recv_timeout(budget) {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(operation, message, "worker panicked");
            Err(OtsuError::computation(operation, message))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            token.cancel();
            Err(OtsuError::timeout(operation, budget))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(OtsuError::computation(
            operation,
            "worker exited without reporting a result",
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "worker panicked"
    }
}
