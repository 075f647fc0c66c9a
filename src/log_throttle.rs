use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::info;

pub const DEFAULT_LOG_WINDOW: Duration = Duration::from_secs(30);

// Suppress repeated diagnostic messages. A message is emitted at most
// once per window for each tag, later messages inside the window are dropped
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last_emitted: Mutex<HashMap<String, Instant>>,
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_WINDOW)
    }
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    // Return true if a message with this tag may be emitted now,
    // recording the emission time if so
    pub fn should_emit(&self, tag: &str) -> bool {
        let now = Instant::now();

        // A poisoned map only holds timestamps, keep using it
        let mut last_emitted = self
            .last_emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match last_emitted.get(tag) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                last_emitted.insert(tag.to_string(), now);
                true
            }
        }
    }

    // Log at info level unless the same tag was logged within the window
    pub fn info_delayed(&self, tag: &str, message: &str) {
        if self.should_emit(tag) {
            info!(tag = %tag, "{message}");
        }
    }
}
