use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

// Process wide power mode settings shared by every device monitor.
// Cloning is cheap and every clone observes the same flag
#[derive(Debug, Clone, Default)]
pub struct PowerSettings {
    disabled: Arc<AtomicBool>,
}

impl PowerSettings {
    pub fn new(disabled: bool) -> Self {
        Self {
            disabled: Arc::new(AtomicBool::new(disabled)),
        }
    }

    // When set, no device accepts power mode changes
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }
}
