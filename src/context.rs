use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Context value while no observer is running.
pub const IDLE_CONTEXT: &str = "Stream is not running.";

/// The running description of the stream plus its health flag.
///
/// One writer (the observer) and many readers (the personas). Readers always get a
/// whole snapshot; a stale one is fine.
#[derive(Debug)]
pub struct SharedContext {
    text: RwLock<String>,
    healthy: AtomicBool,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedContext {
    pub fn new() -> Self {
        Self {
            text: RwLock::new(IDLE_CONTEXT.to_string()),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn snapshot(&self) -> String {
        match self.text.read() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn publish(&self, text: impl Into<String>) {
        let text = text.into();
        match self.text.write() {
            Ok(mut current) => *current = text,
            Err(poisoned) => *poisoned.into_inner() = text,
        }
    }

    pub fn reset(&self) {
        self.publish(IDLE_CONTEXT);
    }

    pub fn is_stream_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_stream_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}
