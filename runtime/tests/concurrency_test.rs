//! Concurrency behavior on a pool-backed scheduler: intra-bucket
//! parallelism, strict cross-phase ordering, and the registrant/completer
//! race on late terminal hooks.

use phaseline_core::error::BoxError;
use phaseline_core::phase::Phase;
use phaseline_runtime::{AsyncUnitOfWork, ProcessingContext, TokioScheduler};
use phaseline_testing::InvocationLog;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn io_failure(message: &str) -> BoxError {
    Box::new(io::Error::other(message.to_string()))
}

fn pool_backed(identifier: &str) -> AsyncUnitOfWork {
    AsyncUnitOfWork::with_scheduler(identifier, Arc::new(TokioScheduler::current()))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached within the polling budget");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_bucket_handlers_run_concurrently() {
    let log = InvocationLog::new();
    let unit_of_work = pool_backed("concurrent-bucket");

    for (id, delay_ms) in [("a", 30), ("b", 10), ("c", 20)] {
        let entries = log.clone();
        unit_of_work
            .on(Phase::INVOCATION, move |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                entries.record(id);
                Ok(())
            })
            .unwrap();
    }

    unit_of_work.execute().await.unwrap();

    // The future resolved only after the whole bucket finished; order within
    // the bucket is unspecified and deliberately not asserted.
    let mut entries = log.entries();
    entries.sort();
    assert_eq!(entries, vec!["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_earlier_phase_completes_before_later_phase_starts() {
    let log = InvocationLog::new();
    let unit_of_work = pool_backed("strict-ordering");

    for delay_ms in [30, 10, 20] {
        let entries = log.clone();
        unit_of_work
            .on(Phase::PRE_INVOCATION, move |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                entries.record("pre");
                Ok(())
            })
            .unwrap();
    }
    let entries = log.clone();
    unit_of_work
        .on(Phase::INVOCATION, move |_ctx| async move {
            entries.record("invocation");
            Ok(())
        })
        .unwrap();

    unit_of_work.execute().await.unwrap();

    assert_eq!(log.entries(), vec!["pre", "pre", "pre", "invocation"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_bucket_still_runs_all_its_handlers() {
    let log = InvocationLog::new();
    let unit_of_work = pool_backed("no-short-circuit");

    unit_of_work
        .on(Phase::INVOCATION, |_ctx| async {
            Err(io_failure("fails fast"))
        })
        .unwrap();
    for id in ["slow-1", "slow-2"] {
        let entries = log.clone();
        unit_of_work
            .on(Phase::INVOCATION, move |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                entries.record(id);
                Ok(())
            })
            .unwrap();
    }
    let entries = log.clone();
    unit_of_work
        .on(Phase::COMMIT, move |_ctx| async move {
            entries.record("commit");
            Ok(())
        })
        .unwrap();

    let outcome = unit_of_work.execute().await;
    assert!(outcome.is_err());

    // Both slow handlers in the failing bucket ran to completion; the later
    // phase never started.
    let mut entries = log.entries();
    entries.sort();
    assert_eq!(entries, vec!["slow-1", "slow-2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_on_error_registered_after_failure_fires_exactly_once() {
    let unit_of_work = Arc::new(pool_backed("late-error-hook"));
    let captured: Arc<Mutex<Option<ProcessingContext>>> = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&captured);
    unit_of_work
        .on(Phase::INVOCATION, move |running| async move {
            *slot.lock().unwrap() = Some(running.clone());
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(io_failure("deferred failure"))
        })
        .unwrap();

    let executing = Arc::clone(&unit_of_work);
    let execution = tokio::spawn(async move { executing.execute().await });

    // Wait until the terminal error state is observable, then register.
    let observer = Arc::clone(&captured);
    wait_until(move || {
        observer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(ProcessingContext::is_error)
    })
    .await;

    let fired = Arc::new(AtomicUsize::new(0));
    let probe = Arc::clone(&fired);
    unit_of_work.on_error(move |_ctx, phase, cause| {
        assert_eq!(phase, Phase::INVOCATION);
        assert!(cause.to_string().contains("deferred failure"));
        probe.fetch_add(1, Ordering::SeqCst);
    });

    assert!(execution.await.unwrap().is_err());
    let counter = Arc::clone(&fired);
    wait_until(move || counter.load(Ordering::SeqCst) == 1).await;
    // Give a misbehaving double-dispatch a chance to show up.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registrant_and_completer_race_never_drops_or_doubles_a_hook() {
    for round in 0..50 {
        let unit_of_work = Arc::new(pool_backed("hook-race"));
        unit_of_work
            .on(Phase::INVOCATION, |_ctx| async {
                tokio::task::yield_now().await;
                Err(io_failure("race round"))
            })
            .unwrap();

        let early = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&early);
        unit_of_work.on_error(move |_ctx, _phase, _cause| {
            probe.fetch_add(1, Ordering::SeqCst);
        });

        let executing = Arc::clone(&unit_of_work);
        let execution = tokio::spawn(async move { executing.execute().await });

        // Race the registration against completion fan-out.
        let late = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&late);
        let registrant = Arc::clone(&unit_of_work);
        let registration = tokio::spawn(async move {
            registrant.on_error(move |_ctx, _phase, _cause| {
                probe.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert!(execution.await.unwrap().is_err());
        registration.await.unwrap();

        let early_counter = Arc::clone(&early);
        let late_counter = Arc::clone(&late);
        wait_until(move || {
            early_counter.load(Ordering::SeqCst) == 1 && late_counter.load(Ordering::SeqCst) == 1
        })
        .await;
        assert_eq!(early.load(Ordering::SeqCst), 1, "round {round}");
        assert_eq!(late.load(Ordering::SeqCst), 1, "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_when_complete_on_a_pool_scheduler_fires_exactly_once() {
    let unit_of_work = pool_backed("late-complete-hook");
    unit_of_work.execute().await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let probe = Arc::clone(&fired);
    unit_of_work.when_complete(move |_ctx| {
        probe.fetch_add(1, Ordering::SeqCst);
    });

    let counter = Arc::clone(&fired);
    wait_until(move || counter.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
