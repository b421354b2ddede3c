// shutdown.rs — Process-wide shutdown flag, split into a writer half owned by
// the supervisor and read-only handles given to everything else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Create a fresh, unset shutdown flag.
///
/// The trigger goes to the supervisor; signals are cloned out of it (or out of
/// each other) and handed to components at construction.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        ShutdownTrigger {
            flag: Arc::clone(&flag),
        },
        ShutdownSignal { flag },
    )
}

/// Writer half. Setting the flag is one-way: it is never reset.
#[derive(Clone)]
pub struct ShutdownTrigger {
    flag: Arc<AtomicBool>,
}

impl ShutdownTrigger {
    /// Set the flag. Returns `true` only for the call that actually flipped it,
    /// so callers can act exactly once.
    pub fn fire(&self, reason: &str) -> bool {
        let flipped = self
            .flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if flipped {
            log::info!("Shutdown requested ({})", reason);
        } else {
            log::debug!("Shutdown already requested; ignoring '{}'", reason);
        }
        flipped
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Read-only handle onto the same flag.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Read-only half of the flag.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
