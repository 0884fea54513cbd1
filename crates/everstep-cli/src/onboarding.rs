//! Employee onboarding demo workflow.
//!
//! Exercises the engine end to end: a sequential step, two parallel
//! retry-policy steps on worker threads, a final sequential step, and a
//! saga variant with a compensation per step. The crash option exits the
//! process after n completed steps so a later `resume` can demonstrate
//! memoized recovery.

use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use everstep_engine::{step, DurableContext, RetryPolicy, StepError, Store, WorkflowStatus};

pub struct RunOptions {
    pub crash_after: Option<u32>,
    pub saga: bool,
}

pub fn run(ctx: &DurableContext, options: &RunOptions) -> anyhow::Result<()> {
    if options.saga {
        run_with_compensation(ctx, options)
    } else {
        run_plain(ctx, options)
    }
}

fn run_plain(ctx: &DurableContext, options: &RunOptions) -> anyhow::Result<()> {
    step::run(ctx, "create-employee", || {
        tracing::info!("creating employee record");
        simulate_work(100);
        Ok("EMP_CREATED".to_string())
    })?;
    maybe_crash(ctx, 1, options);

    let (laptop, access) = thread::scope(|s| {
        let laptop = s.spawn(|| {
            step::run_with_retry(ctx, "provision-laptop", &RetryPolicy::DEFAULT, || {
                tracing::info!("provisioning laptop");
                simulate_work(200);
                Ok("LAPTOP_READY".to_string())
            })
        });
        let access = s.spawn(|| {
            step::run_with_retry(ctx, "grant-access", &RetryPolicy::DEFAULT, || {
                tracing::info!("granting system access");
                simulate_work(150);
                Ok("ACCESS_GRANTED".to_string())
            })
        });
        (laptop.join(), access.join())
    });
    let _laptop = join_step(laptop)?;
    let _access = join_step(access)?;
    // The parallel pair lands together, so both crash points trip here.
    maybe_crash(ctx, 2, options);
    maybe_crash(ctx, 3, options);

    step::run(ctx, "send-welcome-email", || {
        tracing::info!("sending welcome email");
        simulate_work(50);
        Ok("EMAIL_SENT".to_string())
    })?;
    maybe_crash(ctx, 4, options);

    tracing::info!("employee onboarding workflow completed");
    Ok(())
}

fn run_with_compensation(ctx: &DurableContext, options: &RunOptions) -> anyhow::Result<()> {
    step::saga(
        ctx,
        "create-employee",
        || {
            tracing::info!("creating employee record");
            simulate_work(100);
            Ok("EMP_CREATED".to_string())
        },
        || {
            tracing::info!("compensation: deleting employee record");
            Ok(())
        },
    )?;
    maybe_crash(ctx, 1, options);

    step::saga_with_retry(
        ctx,
        "provision-laptop",
        &RetryPolicy::DEFAULT,
        || {
            tracing::info!("provisioning laptop");
            simulate_work(200);
            Ok("LAPTOP_READY".to_string())
        },
        || {
            tracing::info!("compensation: returning laptop");
            Ok(())
        },
    )?;
    maybe_crash(ctx, 2, options);

    step::saga_with_retry(
        ctx,
        "grant-access",
        &RetryPolicy::DEFAULT,
        || {
            tracing::info!("granting system access");
            simulate_work(150);
            Ok("ACCESS_GRANTED".to_string())
        },
        || {
            tracing::info!("compensation: revoking access");
            Ok(())
        },
    )?;
    maybe_crash(ctx, 3, options);

    step::run(ctx, "send-welcome-email", || {
        tracing::info!("sending welcome email");
        simulate_work(50);
        Ok("EMAIL_SENT".to_string())
    })?;
    maybe_crash(ctx, 4, options);

    tracing::info!("employee onboarding workflow completed");
    Ok(())
}

fn join_step(
    joined: thread::Result<Result<String, StepError>>,
) -> anyhow::Result<String> {
    Ok(joined.map_err(|_| anyhow!("step thread panicked"))??)
}

/// Exits the process after the given demo step when crash simulation is on.
/// The workflow row is left RUNNING so `resume` finds it mid-flight.
fn maybe_crash(ctx: &DurableContext, completed_steps: u32, options: &RunOptions) {
    if options.crash_after == Some(completed_steps) {
        tracing::warn!(completed_steps, "simulated crash");
        let _ = ctx
            .store
            .upsert_workflow(&ctx.workflow_id, WorkflowStatus::Running);
        std::process::exit(1);
    }
}

fn simulate_work(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}
