//! Scheduler driving the real pipeline over virtual time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use certrelay_core::{DeliveryMode, Outcome, Scheduler, SchedulerState, ShutdownSignal};
use common::{write_certificate, Fixture};

#[tokio::test(start_paused = true)]
async fn test_daemon_terminates_while_waiting_without_another_run() {
    let fx = Fixture::new(vec![]);
    write_certificate(fx.certs.path(), "example.com", 60);
    let config = fx.config(DeliveryMode::Always);
    let interval = "1d".parse().unwrap();
    let (trigger, signal) = ShutdownSignal::channel();
    let pipeline = Arc::new(fx.pipeline_with(config, fx.transport.clone(), signal.clone()));
    let mut scheduler = Scheduler::new(pipeline, interval, true, signal);

    let handle = tokio::spawn(async move {
        let exit = scheduler.run().await;
        (exit, scheduler.state())
    });

    // well inside the first wait
    tokio::time::sleep(Duration::from_secs(6 * 3600)).await;
    trigger.trigger();
    let (exit, state) = handle.await.unwrap();

    assert_eq!(state, SchedulerState::Terminated);
    assert_eq!(exit.runs, 1);
    assert_eq!(exit.exit_code, 0);
    assert_eq!(exit.last.unwrap().outcome, Outcome::Success);
    assert_eq!(fx.transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_daemon_keeps_running_after_failed_run() {
    let fx = Fixture::new(vec![common::tool_failure("dns problem")]);
    let config = fx.config(DeliveryMode::Always);
    let interval = "1h".parse().unwrap();
    let (trigger, signal) = ShutdownSignal::channel();
    let pipeline = Arc::new(fx.pipeline_with(config, fx.transport.clone(), signal.clone()));
    let mut scheduler = Scheduler::new(pipeline, interval, true, signal);

    let handle = tokio::spawn(async move { scheduler.run().await });

    tokio::time::sleep(Duration::from_secs(3600 + 1800)).await;
    trigger.trigger();
    let exit = handle.await.unwrap();

    assert_eq!(exit.runs, 2);
    assert_eq!(exit.exit_code, 0);
    // three attempts per run
    assert_eq!(fx.tool.calls(), 6);
    assert_eq!(fx.transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_one_shot_failure_sets_exit_code() {
    let fx = Fixture::new(vec![common::tool_failure("unauthorized")]);
    let pipeline = Arc::new(fx.pipeline(fx.config(DeliveryMode::Always)));
    let mut scheduler = Scheduler::new(pipeline, "1d".parse().unwrap(), false, ShutdownSignal::never());

    let exit = scheduler.run().await;

    assert_eq!(exit.runs, 1);
    assert_eq!(exit.exit_code, 1);
}
