//! The actor-backed thread class end to end.
//!
//! Tests cover:
//! - listener values arriving in submission order, skipping declined executes
//! - async results and typed async failures
//! - shutdown failing every unfinished add and silencing the listener

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use interop_runtime::Error;
use interop_testlib::{MathError, ThreadClass};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn recording(value: u32) -> (ThreadClass, Arc<Mutex<Vec<u32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let class = ThreadClass::new(value, move |v| sink.lock().push(v)).unwrap();
    (class, seen)
}

fn wait_for(seen: &Mutex<Vec<u32>>, len: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().len() < len {
        assert!(Instant::now() < deadline, "listener saw only {:?}", seen.lock());
        thread::sleep(Duration::from_millis(5));
    }
}

#[tokio::test]
async fn listener_sees_submission_order() {
    init_tracing();
    let (class, seen) = recording(42);

    let added = class.add(4);
    class.update(43).unwrap();
    class.execute(|x| Some(x * 2)).unwrap();
    class.execute(|_| None).unwrap();

    assert_eq!(added.await.unwrap(), 46);
    wait_for(&seen, 3);
    assert_eq!(*seen.lock(), vec![46, 43, 86]);
}

#[tokio::test]
async fn queued_error_fails_the_add_without_touching_the_value() {
    init_tracing();
    let (class, seen) = recording(10);

    class.queue_error(MathError::MathIsBroke).unwrap();
    let err = class.add(5).await.unwrap_err();
    assert_eq!(err.native_kind::<MathError>(), Some(MathError::MathIsBroke));
    assert!(seen.lock().is_empty(), "listener ran: {:?}", seen.lock());

    // the error was consumed; the next add goes through
    assert_eq!(class.add(5).await.unwrap(), 15);
}

#[tokio::test]
async fn dropped_completion_is_a_typed_failure() {
    init_tracing();
    let (class, _) = recording(0);
    class.drop_next_add().unwrap();
    let err = class.add(1).await.unwrap_err();
    assert_eq!(err.native_kind::<MathError>(), Some(MathError::Dropped));
    assert_eq!(class.pending(), 0);
}

#[test]
fn many_adds_resolve_in_order() {
    init_tracing();
    let (class, seen) = recording(0);
    let adds: Vec<_> = (1..=20).map(|i| class.add(i)).collect();
    let results: Vec<u32> = adds.into_iter().map(|a| a.wait().unwrap()).collect();
    let expected: Vec<u32> = (1..=20).scan(0, |sum, i| {
        *sum += i;
        Some(*sum)
    }).collect();
    assert_eq!(results, expected);
    assert_eq!(*seen.lock(), expected);
}

#[tokio::test]
async fn shutdown_fails_unfinished_adds_and_silences_the_listener() {
    init_tracing();
    let (mut class, seen) = recording(0);

    let (started_tx, started_rx) = mpsc::channel();
    class
        .execute(move |v| {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(200));
            Some(v + 1)
        })
        .unwrap();
    let adds: Vec<_> = (0..5).map(|i| class.add(i)).collect();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(class.pending(), 5);

    class.shutdown();

    for add in adds {
        assert_eq!(add.await.unwrap_err(), Error::ShuttingDown);
    }
    assert!(seen.lock().is_empty(), "listener ran after shutdown: {:?}", seen.lock());
    assert_eq!(class.pending(), 0);
    assert_eq!(class.update(1).unwrap_err(), Error::HandleReleased);
}

#[tokio::test]
async fn dropping_the_wrapper_shuts_it_down() {
    init_tracing();
    let (class, _) = recording(0);
    let (started_tx, started_rx) = mpsc::channel();
    class
        .execute(move |v| {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(100));
            Some(v)
        })
        .unwrap();
    let add = class.add(1);
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    drop(class);
    assert_eq!(add.await.unwrap_err(), Error::ShuttingDown);
}
