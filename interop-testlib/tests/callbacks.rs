//! Callbacks invoked by native code.
//!
//! Tests cover:
//! - delivery from a native thread, in the order native code issued it
//! - one-shot callbacks firing once under concurrent triggers
//! - stale callbacks after the owning object is released
//! - a callback releasing the object whose call invoked it
//! - collections as lazy iterators and as owned copies

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use interop_runtime::diagnostics::{self, DiagnosticEvent};
use interop_runtime::trampoline::ScalarCallback;
use interop_runtime::{CallbackArena, Error, ReleaseOutcome};
use interop_testlib::{collect_characters, collect_int32_range, invoke_characters, invoke_int32_range, CallbackSource};
use parking_lot::Mutex;

#[test]
fn native_thread_delivers_in_order() {
    let source = CallbackSource::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    source
        .set_interface(move |v| {
            let name = thread::current().name().map(str::to_owned);
            sink.lock().push((v, name));
            v
        })
        .unwrap();

    source.fire_from_thread(100, 50).unwrap();
    source.join().unwrap();

    let seen = seen.lock();
    let values: Vec<u32> = seen.iter().map(|(v, _)| *v).collect();
    assert_eq!(values, (100..150).collect::<Vec<_>>());
    assert!(seen.iter().all(|(_, name)| name.as_deref() == Some("testlib-cbsource")));
}

#[test]
fn one_shot_fires_once_under_concurrent_triggers() {
    let source = CallbackSource::new().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    source
        .set_once(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    thread::scope(|s| {
        for i in 0..8 {
            let source = &source;
            s.spawn(move || source.trigger_once(i).unwrap());
        }
    });

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_after_release_is_stale() {
    let source = CallbackSource::new().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    source
        .set_interface(move |v| {
            counted.fetch_add(1, Ordering::SeqCst);
            v
        })
        .unwrap();
    let token = source.interface_token().unwrap();
    assert_eq!(source.set_value(3).unwrap(), 3);

    assert_eq!(source.release(), ReleaseOutcome::Destroyed);
    assert!(!CallbackArena::global().is_registered(token));

    // a native copy of the struct that outlived its owner
    let leftover = ScalarCallback::<u32>::for_token(token);
    assert_eq!(leftover.call(9), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(diagnostics::contains(|e| *e == DiagnosticEvent::StaleCallback { token: token.get() }));
}

#[test]
fn callback_releases_its_own_source() {
    let source = Arc::new(CallbackSource::new().unwrap());
    let owner = Arc::downgrade(&source);
    let outcome = Arc::new(Mutex::new(None));
    let recorded = outcome.clone();
    source
        .set_interface(move |v| {
            if let Some(source) = owner.upgrade() {
                *recorded.lock() = Some(source.release());
            }
            v + 1
        })
        .unwrap();
    let token = source.interface_token().unwrap();

    let (tx, rx) = mpsc::channel();
    let caller = {
        let source = source.clone();
        thread::spawn(move || {
            let _ = tx.send(source.set_value(5));
        })
    };
    let answer = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("set_value did not return");
    caller.join().unwrap();

    assert_eq!(answer.unwrap(), 6);
    assert_eq!(*outcome.lock(), Some(ReleaseOutcome::Destroyed));
    // the native object went away with the call, taking its callback along
    assert!(!CallbackArena::global().is_registered(token));
    assert_eq!(source.set_value(1).unwrap_err(), Error::HandleReleased);
}

#[test]
fn panicking_callback_is_contained() {
    let source = CallbackSource::new().unwrap();
    source.set_interface(|v| if v == 13 { panic!("unlucky") } else { v }).unwrap();
    let token = source.interface_token().unwrap();
    assert_eq!(source.set_value(13).unwrap(), 0);
    assert_eq!(source.set_value(12).unwrap(), 12);
    assert!(diagnostics::contains(|e| *e == DiagnosticEvent::CallbackPanicked { token: token.get() }));
}

#[test]
fn five_characters_in_order() {
    let lazy = Arc::new(Mutex::new(Vec::new()));
    let sink = lazy.clone();
    invoke_characters("hello", move |items| sink.lock().extend(items.map(char::from))).unwrap();
    assert_eq!(*lazy.lock(), vec!['h', 'e', 'l', 'l', 'o']);

    let owned = collect_characters("hello").unwrap();
    assert_eq!(owned, b"hello");
}

#[test]
fn cursor_range_lazy_and_collected() {
    let lazy = Arc::new(Mutex::new(Vec::new()));
    let sink = lazy.clone();
    invoke_int32_range(-3, 3, move |items| sink.lock().extend(items)).unwrap();
    assert_eq!(*lazy.lock(), vec![-3, -2, -1, 0, 1, 2]);
    assert_eq!(collect_int32_range(10, 13).unwrap(), vec![10, 11, 12]);
}
