pub mod builders;

use std::sync::{Mutex, Once};

use spine_items::item::{ItemEvent, ItemLogger, MessageKind, OutputStream};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Collects the `ItemEvent`s of a logger.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<ItemEvent>,
    rx: Mutex<mpsc::UnboundedReceiver<ItemEvent>>,
    seen: Mutex<Vec<ItemEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A logger for `item` that reports into this sink.
    pub fn logger(&self, item: &str) -> ItemLogger {
        ItemLogger::new(item).with_sink(self.tx.clone())
    }

    /// Everything received so far.
    pub fn events(&self) -> Vec<ItemEvent> {
        let mut rx = self.rx.lock().unwrap();
        let mut seen = self.seen.lock().unwrap();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        seen.clone()
    }

    /// Texts of messages of the given kind.
    pub fn messages(&self, kind: MessageKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ItemEvent::Message { kind: k, text, .. } if k == kind => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Process output lines of one stream.
    pub fn output(&self, stream: OutputStream) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ItemEvent::ProcessOutput { stream: s, text, .. } if s == stream => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}
