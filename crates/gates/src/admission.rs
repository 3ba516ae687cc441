//! Gate admission strategies (§4.7 "Gates"): `env`, `file`, `manual`.

use std::time::Duration;

use sykli_core::ir::{Gate, GateStrategy};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::ci::{env_truthy, is_ci};
use crate::error::{GateError, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Answers a `manual` gate's prompt. The CLI supplies a real (stdin-backed)
/// implementation; tests and non-interactive runs can supply a stub.
#[async_trait::async_trait]
pub trait ManualPrompt: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// A prompt that always denies, used when no interactive implementation is
/// wired up and the run isn't in CI (so `is_ci` can't auto-approve either).
pub struct AlwaysDeny;

#[async_trait::async_trait]
impl ManualPrompt for AlwaysDeny {
    async fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Runs one gate to completion: admits, or times out per its `timeout_seconds`.
///
/// # Errors
/// Returns `GateError::Timeout` if admission isn't reached in time, or
/// `GateError::Io` if a `file` gate's path can't be polled.
#[instrument(skip(prompt), fields(gate = %gate.name))]
pub async fn admit(gate: &Gate, prompt: &dyn ManualPrompt) -> Result<()> {
    match &gate.strategy {
        GateStrategy::Env { var } => admit_env(gate, var),
        GateStrategy::File { path } => admit_file(gate, path).await,
        GateStrategy::Manual { prompt: message } => admit_manual(gate, message, prompt).await,
    }
}

fn admit_env(gate: &Gate, var: &str) -> Result<()> {
    if env_truthy(var) {
        debug!(var, "gate admitted by truthy env var");
        Ok(())
    } else {
        Err(GateError::Timeout { name: gate.name.clone(), timeout_secs: gate.timeout_seconds })
    }
}

async fn admit_file(gate: &Gate, path: &str) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(gate.timeout_seconds);
    loop {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {
                debug!(path, "gate admitted by file presence");
                return Ok(());
            }
            Ok(false) => {}
            Err(source) => return Err(GateError::Io { name: gate.name.clone(), source }),
        }
        if Instant::now() >= deadline {
            return Err(GateError::Timeout { name: gate.name.clone(), timeout_secs: gate.timeout_seconds });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn admit_manual(gate: &Gate, message: &str, prompt: &dyn ManualPrompt) -> Result<()> {
    if is_ci() {
        debug!("gate auto-approved: running in CI with no human to prompt");
        return Ok(());
    }
    match tokio::time::timeout(Duration::from_secs(gate.timeout_seconds), prompt.confirm(message)).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!("manual gate denied");
            Err(GateError::Timeout { name: gate.name.clone(), timeout_secs: gate.timeout_seconds })
        }
        Err(_elapsed) => Err(GateError::Timeout { name: gate.name.clone(), timeout_secs: gate.timeout_seconds }),
    }
}
