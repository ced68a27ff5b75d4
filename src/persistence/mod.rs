//! Delivery of trial and session records
//!
//! Sinks are fire-and-forget: `submit` returns immediately, failures are
//! logged and never reach the simulation. Nothing is retried. Uploads still
//! pending are counted by `InFlight` so the page can wait before leaving.
//!
//! - `JsonLinesSink`: one JSON object per line to any writer
//! - `LocalBackup`: bounded copy in LocalStorage
//! - `HttpSink` (wasm): POST to the save endpoint

pub mod backup;
#[cfg(target_arch = "wasm32")]
pub mod http;

pub use backup::{LocalBackup, MAX_BACKUP_RECORDS};
#[cfg(target_arch = "wasm32")]
pub use http::HttpSink;

use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;

use crate::error::Result;
use crate::sim::Outbound;

/// Receiver of outbound records
pub trait RecordSink {
    /// Hand over a record. Must not block the frame loop.
    fn submit(&mut self, record: &Outbound);
}

/// Serialize a record the way every sink sends it
pub fn encode(record: &Outbound) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Number of uploads still waiting for a response.
///
/// Clones share the count. Each pending upload holds an `InFlightGuard`.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Rc<Cell<usize>>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one upload as started; it settles when the guard drops
    pub fn start(&self) -> InFlightGuard {
        self.0.set(self.0.get() + 1);
        InFlightGuard(self.0.clone())
    }

    pub fn count(&self) -> usize {
        self.0.get()
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }
}

#[derive(Debug)]
pub struct InFlightGuard(Rc<Cell<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Writes each record as one line of JSON
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &Outbound) -> Result<()> {
        let line = encode(record)?;
        writeln!(self.writer, "{line}")
            .and_then(|_| self.writer.flush())
            .map_err(|e| crate::ExperimentError::Persistence(e.to_string()))
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn submit(&mut self, record: &Outbound) {
        if let Err(e) = self.write_record(record) {
            log::error!("Failed to write record for {}: {}", record.participant_id(), e);
        }
    }
}

/// Sends every record to each inner sink in turn
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn RecordSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl RecordSink for FanOut {
    fn submit(&mut self, record: &Outbound) {
        for sink in &mut self.sinks {
            sink.submit(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SessionSummary;

    fn summary() -> Outbound {
        Outbound::Session(SessionSummary {
            participant_id: "P7".to_string(),
            trials_completed: 10,
            practice_score: 5,
            total_time: 321.5,
        })
    }

    #[test]
    fn test_in_flight_counts_guards() {
        let uploads = InFlight::new();
        let view = uploads.clone();
        assert!(view.is_idle());

        let first = uploads.start();
        let second = uploads.start();
        assert_eq!(view.count(), 2);

        drop(first);
        assert_eq!(view.count(), 1);
        drop(second);
        assert!(view.is_idle());
    }

    #[test]
    fn test_in_flight_guard_moves_into_task() {
        let uploads = InFlight::new();
        let task = {
            let guard = uploads.start();
            move || drop(guard)
        };
        assert_eq!(uploads.count(), 1);
        task();
        assert!(uploads.is_idle());
    }

    #[test]
    fn test_json_lines() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.submit(&summary());
        sink.submit(&summary());
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: Outbound = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(back, summary());
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let mut sink = JsonLinesSink::new(FailingWriter);
        sink.submit(&summary());
        assert!(sink.write_record(&summary()).is_err());
    }

    #[test]
    fn test_fan_out_reaches_every_sink() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Shared(Rc<RefCell<Vec<Outbound>>>);
        impl RecordSink for Shared {
            fn submit(&mut self, record: &Outbound) {
                self.0.borrow_mut().push(record.clone());
            }
        }

        let a = Rc::new(RefCell::new(Vec::new()));
        let b = Rc::new(RefCell::new(Vec::new()));
        let mut fan = FanOut::new()
            .with(Shared(a.clone()))
            .with(Shared(b.clone()));
        fan.submit(&summary());
        assert_eq!(a.borrow().len(), 1);
        assert_eq!(b.borrow().len(), 1);
    }
}
