//! Diagnostic log for conditions the runtime absorbs instead of raising.
//!
//! Stale callbacks, double releases, and late completions are races inherent
//! to cross-language lifetimes; protocol violations and contained panics are
//! bugs. All of them are logged through `tracing`, counted, kept in a bounded
//! history, and optionally forwarded as JSON to a native sink.

use std::collections::VecDeque;
use std::ffi::{c_char, c_void, CString};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::DiagnosticsConfig;

/// An absorbed or reported condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    StaleCallback { token: u64 },
    DoubleRelease { type_name: &'static str },
    ProtocolViolation { detail: String },
    CallbackPanicked { token: u64 },
    LateCompletion { operation: u64 },
}

/// Versioned record wrapping every event.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRecord {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub event: DiagnosticEvent,
}

impl DiagnosticRecord {
    fn new(seq: u64, event: DiagnosticEvent) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}

/// Per-kind totals since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounts {
    pub stale_callbacks: u64,
    pub double_releases: u64,
    pub protocol_violations: u64,
    pub callback_panics: u64,
    pub late_completions: u64,
}

/// C sink signature: UTF-8 JSON (pointer + length) and opaque user data.
pub type DiagnosticCallback =
    unsafe extern "C" fn(json_ptr: *const c_char, json_len: usize, user_data: *mut c_void);

#[derive(Clone, Copy)]
struct CallbackSink {
    cb: DiagnosticCallback,
    user_data: *mut c_void,
}

// Safety: whoever subscribes guarantees `user_data` may be used from any
// thread; reports arrive from whatever thread hit the condition.
unsafe impl Send for CallbackSink {}

impl CallbackSink {
    fn dispatch(&self, json: &str) {
        let Ok(cstr) = CString::new(json) else {
            return;
        };
        unsafe { (self.cb)(cstr.as_ptr(), json.len(), self.user_data) };
    }
}

const DEFAULT_HISTORY: usize = 256;

/// Bounded record buffer; the oldest records go first.
struct History {
    capacity: usize,
    records: VecDeque<DiagnosticRecord>,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.records.len() > capacity {
            self.records.pop_front();
        }
    }

    fn push(&mut self, record: DiagnosticRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }
}

struct Diagnostics {
    seq: AtomicU64,
    stale: AtomicU64,
    double_release: AtomicU64,
    violations: AtomicU64,
    panics: AtomicU64,
    late: AtomicU64,
    history: Mutex<History>,
    sink: Mutex<Option<CallbackSink>>,
}

static DIAGNOSTICS: Lazy<Diagnostics> = Lazy::new(|| Diagnostics {
    seq: AtomicU64::new(0),
    stale: AtomicU64::new(0),
    double_release: AtomicU64::new(0),
    violations: AtomicU64::new(0),
    panics: AtomicU64::new(0),
    late: AtomicU64::new(0),
    history: Mutex::new(History::new(DEFAULT_HISTORY)),
    sink: Mutex::new(None),
});

/// Apply history settings.
pub fn configure(config: &DiagnosticsConfig) {
    DIAGNOSTICS.history.lock().resize(config.history);
}

/// Log, count, and record an event.
pub fn report(event: DiagnosticEvent) {
    let d = &*DIAGNOSTICS;
    match &event {
        DiagnosticEvent::StaleCallback { token } => {
            d.stale.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(token, "dropping invocation of a released callback");
        }
        DiagnosticEvent::DoubleRelease { type_name } => {
            d.double_release.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(type_name, "release of an already released handle ignored");
        }
        DiagnosticEvent::ProtocolViolation { detail } => {
            d.violations.fetch_add(1, Ordering::Relaxed);
            tracing::error!("protocol violation: {detail}");
        }
        DiagnosticEvent::CallbackPanicked { token } => {
            d.panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(token, "callback panicked; panic contained at the native boundary");
        }
        DiagnosticEvent::LateCompletion { operation } => {
            d.late.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(operation, "completion arrived after shutdown, discarded");
        }
    }

    let seq = d.seq.fetch_add(1, Ordering::Relaxed) + 1;
    let record = DiagnosticRecord::new(seq, event);

    // Copied out so a sink that reports again does not wait on itself.
    let sink = *d.sink.lock();
    if let Some(sink) = sink {
        if let Ok(json) = serde_json::to_string(&record) {
            sink.dispatch(&json);
        }
    }

    d.history.lock().push(record);
}

/// Shorthand for reporting a protocol violation.
pub fn protocol_violation(detail: impl Into<String>) {
    report(DiagnosticEvent::ProtocolViolation {
        detail: detail.into(),
    });
}

/// Per-kind totals.
pub fn snapshot() -> DiagnosticCounts {
    let d = &*DIAGNOSTICS;
    DiagnosticCounts {
        stale_callbacks: d.stale.load(Ordering::Relaxed),
        double_releases: d.double_release.load(Ordering::Relaxed),
        protocol_violations: d.violations.load(Ordering::Relaxed),
        callback_panics: d.panics.load(Ordering::Relaxed),
        late_completions: d.late.load(Ordering::Relaxed),
    }
}

/// The most recent records, oldest first.
pub fn recent() -> Vec<DiagnosticRecord> {
    DIAGNOSTICS.history.lock().records.iter().cloned().collect()
}

/// Whether the retained history holds a record matching `pred`.
pub fn contains(pred: impl Fn(&DiagnosticEvent) -> bool) -> bool {
    DIAGNOSTICS.history.lock().records.iter().any(|r| pred(&r.event))
}

/// Forward every future record to a native sink, replacing any previous one.
///
/// # Safety
///
/// `cb` must stay callable and `user_data` valid until [`unsubscribe`] is
/// called or another sink replaces this one.
pub unsafe fn subscribe(cb: DiagnosticCallback, user_data: *mut c_void) {
    *DIAGNOSTICS.sink.lock() = Some(CallbackSink { cb, user_data });
}

/// Stop forwarding records.
pub fn unsubscribe() {
    DIAGNOSTICS.sink.lock().take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn record_serialization() {
        let record = DiagnosticRecord::new(42, DiagnosticEvent::StaleCallback { token: 9 });
        let json = serde_json::to_string(&record).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["version"], 1);
        assert_eq!(parsed["seq"], 42);
        assert!(parsed["timestamp_ms"].as_i64().unwrap() > 0);
        assert_eq!(parsed["event"]["type"], "stale_callback");
        assert_eq!(parsed["event"]["data"]["token"], 9);
    }

    #[test]
    fn report_counts_and_records() {
        let before = snapshot();
        report(DiagnosticEvent::LateCompletion { operation: 0xfeed_0001 });
        let after = snapshot();

        assert!(after.late_completions > before.late_completions);
        assert!(contains(|e| matches!(
            e,
            DiagnosticEvent::LateCompletion { operation: 0xfeed_0001 }
        )));
    }

    // Tests that install the process-wide sink take turns.
    static SINK_TURN: Mutex<()> = Mutex::new(());
    static SINK_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count_sink(ptr: *const c_char, len: usize, _user_data: *mut c_void) {
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
        if std::str::from_utf8(bytes).is_ok_and(|s| s.contains("sink-delivery")) {
            SINK_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn sink_receives_json() {
        let _turn = SINK_TURN.lock();
        unsafe { subscribe(count_sink, std::ptr::null_mut()) };
        protocol_violation("sink-delivery");
        unsubscribe();
        protocol_violation("sink-delivery");

        assert_eq!(SINK_CALLS.load(Ordering::SeqCst), 1);
    }

    static NESTED_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn reporting_sink(ptr: *const c_char, len: usize, _user_data: *mut c_void) {
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
        let Ok(json) = std::str::from_utf8(bytes) else {
            return;
        };
        if json.contains("sink-outer") {
            protocol_violation("sink-nested");
        } else if json.contains("sink-nested") {
            NESTED_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn sink_may_report_from_inside_dispatch() {
        let _turn = SINK_TURN.lock();
        unsafe { subscribe(reporting_sink, std::ptr::null_mut()) };
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            protocol_violation("sink-outer");
            let _ = tx.send(());
        });
        let finished = rx.recv_timeout(std::time::Duration::from_secs(5));
        unsubscribe();

        assert!(finished.is_ok(), "report did not return");
        assert_eq!(NESTED_CALLS.load(Ordering::SeqCst), 1);
        assert!(contains(|e| matches!(
            e,
            DiagnosticEvent::ProtocolViolation { detail } if detail == "sink-nested"
        )));
    }

    fn record(seq: u64) -> DiagnosticRecord {
        DiagnosticRecord::new(seq, DiagnosticEvent::LateCompletion { operation: seq })
    }

    #[test]
    fn history_keeps_the_newest_records() {
        let mut history = History::new(3);
        for seq in 1..=5 {
            history.push(record(seq));
        }
        let kept: Vec<u64> = history.records.iter().map(|r| r.seq).collect();
        assert_eq!(kept, vec![3, 4, 5]);

        history.resize(1);
        let kept: Vec<u64> = history.records.iter().map(|r| r.seq).collect();
        assert_eq!(kept, vec![5]);

        history.resize(0);
        history.push(record(6));
        assert!(history.records.is_empty());
    }

    #[test]
    fn configure_bounds_the_global_history() {
        configure(&DiagnosticsConfig::default());
        for n in 0..300 {
            report(DiagnosticEvent::LateCompletion { operation: 0xbeef_0000 + n });
        }
        assert!(recent().len() <= DiagnosticsConfig::default().history);
        assert!(contains(|e| matches!(e, DiagnosticEvent::LateCompletion { operation: 0xbeef_012b })));
    }
}
