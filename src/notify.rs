//! Progress notification seam.
//!
//! The pipeline reports retries, radius expansions, and tracking events
//! through this trait instead of printing directly, so tests can capture
//! what fired and when. The default sink writes timestamped lines to
//! stderr.

use std::sync::{Arc, Mutex};

/// Receiver for user-facing progress events.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default sink: timestamped stderr lines.
pub struct StderrSink;

impl ProgressSink for StderrSink {
    fn notify(&self, message: &str) {
        eprintln!(
            "[{}] {}",
            chrono::Utc::now().format("%H:%M:%S"),
            message
        );
    }
}

/// Collecting sink for tests.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressSink for MemorySink {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
