use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Level-triggered open/closed signal between a session's ingress and egress.
///
/// Opening an open gate or closing a closed one is a no-op. A waiter that
/// arrives after the gate opened returns immediately, so an `open` issued
/// just before `wait_open` is never lost.
#[derive(Debug)]
pub struct ResumeGate {
    open: watch::Sender<bool>,
    shut: AtomicBool,
}

impl ResumeGate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open,
            shut: AtomicBool::new(false),
        }
    }

    pub fn open(&self) {
        self.open.send_if_modified(|open| !std::mem::replace(open, true));
    }

    pub fn close(&self) {
        self.open.send_if_modified(|open| std::mem::replace(open, false));
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Resolve once the gate is open
    pub async fn wait_open(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Mark the session as closing and wake any waiter for good
    pub fn shut(&self) {
        self.shut.store(true, Ordering::Release);
        self.open();
    }

    pub fn is_shut(&self) -> bool {
        self.shut.load(Ordering::Acquire)
    }
}

impl Default for ResumeGate {
    fn default() -> Self {
        Self::new()
    }
}
