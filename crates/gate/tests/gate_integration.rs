//! Integration tests for the admission gate
//!
//! Exercises capacity bounds, admission timeouts, cancellation and permit
//! release under concurrent callers.

#![cfg(feature = "test-utils")]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use admission_gate::testing::{wait_for_usage, ConcurrencyProbe, RecordingObserver};
use admission_gate::{AdmissionError, AdmissionGate, CancelReason, CancelSignal, GateError};
use futures::FutureExt;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

/// Validates that a full gate turns away the caller beyond capacity.
///
/// # Test Steps
/// 1. Configure capacity 2 with a 50ms admission timeout
/// 2. Launch three 200ms tasks at once
/// 3. Verify exactly two ran and the third timed out near 50ms
/// 4. Confirm the rejected task body never executed
#[tokio::test(flavor = "multi_thread")]
async fn test_third_caller_times_out() {
    init_tracing();
    let gate = Arc::new(AdmissionGate::new(2, Duration::from_millis(50)).expect("valid gate"));
    let started = Arc::new(AtomicU32::new(0));

    let mut handles = vec![];
    for _ in 0..3 {
        let gate = Arc::clone(&gate);
        let started = Arc::clone(&started);
        handles.push(tokio::spawn(async move {
            let cancel = CancelSignal::new();
            let begin = Instant::now();
            let result = gate
                .execute(&cancel, || async {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                })
                .await;
            (result, begin.elapsed())
        }));
    }

    let mut admitted = 0;
    let mut timed_out = vec![];
    for handle in handles {
        match handle.await.expect("task should not panic") {
            (Ok(()), _) => admitted += 1,
            (Err(AdmissionError::Timeout { timeout }), elapsed) => {
                assert_eq!(timeout, Duration::from_millis(50));
                timed_out.push(elapsed);
            }
            (Err(other), _) => panic!("unexpected admission failure: {other}"),
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(timed_out.len(), 1);
    assert!(timed_out[0] >= Duration::from_millis(45));
    assert!(timed_out[0] < Duration::from_millis(190));
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(gate.usage(), 0);
}

/// Validates that cancellation aborts a pending admission.
///
/// # Test Steps
/// 1. Configure capacity 1 and hold the permit for 500ms
/// 2. Start a second call whose signal is cancelled after 10ms
/// 3. Verify the second call reports the cancellation reason promptly
/// 4. Confirm its task body never executed
#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_caller_never_runs() {
    init_tracing();
    let gate = Arc::new(AdmissionGate::new(1, Duration::from_secs(10)).expect("valid gate"));

    let holder = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let cancel = CancelSignal::new();
            gate.execute(&cancel, || tokio::time::sleep(Duration::from_millis(500))).await
        })
    };
    assert!(wait_for_usage(&gate, 1, Duration::from_secs(1)).await);

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel(CancelReason::requested("request aborted"));
        });
    }

    let ran = AtomicBool::new(false);
    let begin = Instant::now();
    let result = gate.execute(&cancel, || async { ran.store(true, Ordering::SeqCst) }).await;

    assert_eq!(
        result,
        Err(AdmissionError::Cancelled { reason: CancelReason::requested("request aborted") })
    );
    assert!(begin.elapsed() < Duration::from_millis(400));
    assert!(!ran.load(Ordering::SeqCst));

    holder.await.expect("holder should not panic").expect("holder should be admitted");
}

/// Validates usage reporting while tasks hold their permits.
///
/// # Test Steps
/// 1. Configure capacity 3
/// 2. Start three tasks that block until released
/// 3. Verify usage reads 3 while they run
/// 4. Release them and verify usage returns to 0
#[tokio::test(flavor = "multi_thread")]
async fn test_usage_reflects_running_tasks() {
    let gate = Arc::new(AdmissionGate::new(3, Duration::from_secs(1)).expect("valid gate"));
    let release = CancelSignal::new();

    let mut handles = vec![];
    for _ in 0..3 {
        let gate = Arc::clone(&gate);
        let release = release.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancelSignal::new();
            gate.execute(&cancel, || async move {
                release.cancelled().await;
            })
            .await
        }));
    }

    assert!(wait_for_usage(&gate, 3, Duration::from_secs(1)).await);
    assert_eq!(gate.usage(), 3);
    assert_eq!(gate.capacity(), 3);
    assert_eq!(gate.available(), 0);

    release.cancel(CancelReason::requested("done"));
    for handle in handles {
        handle.await.expect("task should not panic").expect("task should be admitted");
    }

    assert_eq!(gate.usage(), 0);
}

#[derive(Debug)]
struct Downstream;

/// Validates that no permit leaks across normal, error and panicking tasks.
///
/// # Test Steps
/// 1. Run 30 tasks through a capacity-4 gate, a third of each kind
/// 2. Catch panics from the panicking third
/// 3. Verify every outcome arrived as expected
/// 4. Confirm usage is back to 0 and the gate still admits at full capacity
#[tokio::test(flavor = "multi_thread")]
async fn test_no_permit_leaks_across_outcomes() {
    let gate = Arc::new(AdmissionGate::new(4, Duration::from_secs(5)).expect("valid gate"));
    let probe = ConcurrencyProbe::new();

    let mut handles = vec![];
    for i in 0..30 {
        let gate = Arc::clone(&gate);
        let probe = probe.clone();
        handles.push(tokio::spawn(async move {
            let cancel = CancelSignal::new();
            std::panic::AssertUnwindSafe(gate.execute(&cancel, || async move {
                let _running = probe.enter();
                tokio::time::sleep(Duration::from_millis(5)).await;
                match i % 3 {
                    0 => Ok(i),
                    1 => Err(Downstream),
                    _ => panic!("task {i} crashed"),
                }
            }))
            .catch_unwind()
            .await
        }));
    }

    let (mut ok, mut failed, mut panicked) = (0, 0, 0);
    for handle in handles {
        match handle.await.expect("panics are caught inside the task") {
            Ok(Ok(Ok(_))) => ok += 1,
            Ok(Ok(Err(Downstream))) => failed += 1,
            Ok(Err(admission)) => panic!("unexpected admission failure: {admission}"),
            Err(_) => panicked += 1,
        }
    }

    assert_eq!((ok, failed, panicked), (10, 10, 10));
    assert!(probe.peak() <= 4);
    assert_eq!(probe.running(), 0);
    assert_eq!(gate.usage(), 0);

    assert_eq!(gate.available(), 4);
    let cancel = CancelSignal::new();
    assert_eq!(gate.execute(&cancel, || async { 1 }).await, Ok(1));
}

/// Validates the zero-timeout boundary.
#[tokio::test]
async fn test_zero_timeout_rejects_immediately_when_full() {
    let observer = Arc::new(RecordingObserver::new());
    let gate = AdmissionGate::builder()
        .name("inventory")
        .capacity(1)
        .no_wait()
        .observer(observer.clone())
        .build()
        .expect("valid gate");
    let cancel = CancelSignal::new();

    let outer = gate
        .execute(&cancel, || async {
            let begin = Instant::now();
            let inner = gate.execute(&cancel, || async { "nested" }).await;
            (inner, begin.elapsed())
        })
        .await
        .expect("first caller is admitted");

    assert_eq!(outer.0, Err(AdmissionError::Timeout { timeout: Duration::ZERO }));
    assert!(outer.1 < Duration::from_millis(20));
    assert_eq!(observer.limit_reached_count("inventory"), 1);
    assert_eq!(gate.usage(), 0);
}

/// Validates that construction rejects non-positive capacity.
#[test]
fn test_capacity_must_be_positive() {
    assert!(matches!(
        AdmissionGate::new(0, Duration::from_millis(10)),
        Err(GateError::InvalidCapacity { capacity: 0, .. })
    ));
}

/// Validates that a cancellation racing a free permit still yields exactly
/// one outcome per caller.
#[tokio::test(flavor = "multi_thread")]
async fn test_each_caller_gets_exactly_one_outcome() {
    let gate = Arc::new(AdmissionGate::new(2, Duration::from_millis(20)).expect("valid gate"));
    let ran = Arc::new(AtomicU32::new(0));

    let mut handles = vec![];
    for i in 0..40u64 {
        let gate = Arc::clone(&gate);
        let ran = Arc::clone(&ran);
        handles.push(tokio::spawn(async move {
            let cancel = CancelSignal::with_deadline(Duration::from_millis((i % 5) * 5));
            gate.execute(&cancel, || async {
                ran.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(3)).await;
            })
            .await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.expect("task should not panic").is_ok() {
            admitted += 1;
        }
    }

    assert_eq!(ran.load(Ordering::SeqCst), admitted);
    assert_eq!(gate.usage(), 0);
}
