//! The step memoization protocol and the saga driver.
//!
//! One logical operation: derive the step key, look the step up in the
//! store, return the decoded memo on a completed hit, otherwise mark the
//! row RUNNING, run the user closure, and persist the outcome. A RUNNING
//! row left behind by a crashed process is overwritten on the next run:
//! steps execute at-least-once, and callers needing exactly-once external
//! side effects must derive idempotency keys from `(workflow_id, step_key)`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::context::DurableContext;
use crate::engine::error::{BoxError, StepError};
use crate::engine::identity::step_key;
use crate::engine::metrics;
use crate::engine::retry::RetryPolicy;
use crate::engine::store::now_millis;

/// Executes a step without a retry policy. On failure the record is marked
/// FAILED with no retry accounting.
pub fn run<T, F>(ctx: &DurableContext, name: &str, work: F) -> Result<T, StepError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, BoxError>,
{
    execute(ctx, name, None, work)
}

/// Executes a step under a retry policy: failures record `retry_count` and
/// `next_retry_at`, and the attempt budget is enforced across invocations.
pub fn run_with_retry<T, F>(
    ctx: &DurableContext,
    name: &str,
    policy: &RetryPolicy,
    work: F,
) -> Result<T, StepError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, BoxError>,
{
    execute(ctx, name, Some(policy), work)
}

/// Executes a saga step: on success the compensation is pushed onto the
/// context's stack; on failure every previously registered compensation runs
/// in LIFO order before the error propagates.
///
/// Compensations are in-memory only. They are not persisted as steps and are
/// not replayed after a crash; a workflow needing durable rollback makes the
/// compensation itself a step.
pub fn saga<T, F, C>(
    ctx: &DurableContext,
    name: &str,
    work: F,
    compensation: C,
) -> Result<T, StepError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, BoxError>,
    C: FnOnce() -> Result<(), BoxError> + Send + 'static,
{
    saga_execute(ctx, name, None, work, compensation)
}

/// Saga step with a retry policy. The compensation registers only when the
/// step call returns success; a failing final attempt leaves no compensation
/// for this step.
pub fn saga_with_retry<T, F, C>(
    ctx: &DurableContext,
    name: &str,
    policy: &RetryPolicy,
    work: F,
    compensation: C,
) -> Result<T, StepError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, BoxError>,
    C: FnOnce() -> Result<(), BoxError> + Send + 'static,
{
    saga_execute(ctx, name, Some(policy), work, compensation)
}

fn saga_execute<T, F, C>(
    ctx: &DurableContext,
    name: &str,
    policy: Option<&RetryPolicy>,
    work: F,
    compensation: C,
) -> Result<T, StepError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, BoxError>,
    C: FnOnce() -> Result<(), BoxError> + Send + 'static,
{
    match execute(ctx, name, policy, work) {
        Ok(value) => {
            ctx.add_compensation(compensation);
            Ok(value)
        }
        Err(err) => {
            tracing::warn!(step = name, "rolling back after step failure");
            ctx.execute_compensations();
            Err(err)
        }
    }
}

fn execute<T, F>(
    ctx: &DurableContext,
    name: &str,
    policy: Option<&RetryPolicy>,
    work: F,
) -> Result<T, StepError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T, BoxError>,
{
    ctx.check_cancelled()?;

    let seq = ctx.sequence.next();
    let key = step_key(name, seq);

    let record = ctx
        .store
        .find(&ctx.workflow_id, &key)
        .map_err(|e| StepError::failed(&key, e))?;

    if let Some(record) = &record {
        if record.is_completed() {
            tracing::debug!(workflow_id = %ctx.workflow_id, step_key = %key, "skipping memoized step");
            let output = record.output.as_deref().unwrap_or_default();
            return serde_json::from_str(output).map_err(|e| StepError::failed(&key, e));
        }
    }

    // The RUNNING overwrite below resets the stored retry count (that reset
    // is what reclaims zombie rows), so the count observed here is the
    // accounting source for the failure path.
    let prior_retries = record.as_ref().map(|r| r.retry_count).unwrap_or(0);

    if let (Some(record), Some(policy)) = (&record, policy) {
        if record.retry_due(now_millis()) {
            let attempt = record.retry_count + 1;
            if attempt > policy.max_attempts {
                metrics::record_failure();
                if let Err(store_err) =
                    ctx.store
                        .mark_failed(&ctx.workflow_id, &key, "retry limit exceeded")
                {
                    tracing::warn!(step_key = %key, error = %store_err, "failed to record retry exhaustion");
                }
                return Err(StepError::RetryLimitExceeded {
                    step_key: key,
                    source: None,
                });
            }
            tracing::info!(workflow_id = %ctx.workflow_id, step_key = %key, attempt, "retrying step");
        }
    }

    ctx.store
        .mark_running(&ctx.workflow_id, &key, name, seq)
        .map_err(|e| StepError::failed(&key, e))?;
    tracing::info!(workflow_id = %ctx.workflow_id, step_key = %key, "executing step");

    let outcome = work().and_then(|value| {
        let serialized = serde_json::to_string(&value).map_err(|e| -> BoxError { Box::new(e) })?;
        Ok((value, serialized))
    });

    match outcome {
        Ok((value, serialized)) => {
            match ctx
                .store
                .mark_completed(&ctx.workflow_id, &key, &serialized)
            {
                Ok(()) => {
                    metrics::record_step();
                    tracing::info!(workflow_id = %ctx.workflow_id, step_key = %key, "completed step");
                    Ok(value)
                }
                Err(store_err) => {
                    metrics::record_failure();
                    Err(fail_step(ctx, &key, policy, prior_retries, Box::new(store_err)))
                }
            }
        }
        Err(err) => {
            metrics::record_failure();
            Err(fail_step(ctx, &key, policy, prior_retries, err))
        }
    }
}

/// Records the failure per the retry policy and produces the caller-facing
/// error. Store errors while recording are logged, not surfaced: the
/// original cause must survive.
fn fail_step(
    ctx: &DurableContext,
    key: &str,
    policy: Option<&RetryPolicy>,
    prior_retries: u32,
    err: BoxError,
) -> StepError {
    let Some(policy) = policy else {
        if let Err(store_err) = ctx.store.mark_failed(&ctx.workflow_id, key, &err.to_string()) {
            tracing::warn!(step_key = %key, error = %store_err, "failed to record step failure");
        }
        return StepError::failed(key, err);
    };

    let attempt = prior_retries + 1;
    if attempt >= policy.max_attempts {
        // Terminal: record the exhausted attempt count so later invocations
        // fail fast without re-running the closure.
        let message = format!("retry limit exceeded: {err}");
        if let Err(store_err) = ctx.store.mark_failed_with_retry(
            &ctx.workflow_id,
            key,
            &message,
            attempt,
            now_millis(),
        ) {
            tracing::warn!(step_key = %key, error = %store_err, "failed to record retry exhaustion");
        }
        return StepError::RetryLimitExceeded {
            step_key: key.to_string(),
            source: Some(err),
        };
    }

    let next_retry_at = now_millis() + policy.backoff_for_attempt(attempt);
    if let Err(store_err) = ctx.store.mark_failed_with_retry(
        &ctx.workflow_id,
        key,
        &err.to_string(),
        attempt,
        next_retry_at,
    ) {
        tracing::warn!(step_key = %key, error = %store_err, "failed to record step failure");
    }
    tracing::info!(step_key = %key, attempt, next_retry_at, "scheduled step retry");
    StepError::failed(key, err)
}
