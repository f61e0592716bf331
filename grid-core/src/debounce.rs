use crate::host::{Host, Task, TimerId};

/// A single cancel-and-replace timer. Scheduling again before expiry drops
/// the earlier timer, so only the last request fires (trailing edge).
#[derive(Debug, Default)]
pub struct TimerSlot {
    pending: Option<TimerId>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn replace<H: Host + ?Sized>(&mut self, host: &mut H, delay_ms: u32, task: Task) -> TimerId {
        self.cancel(host);
        let id = host.set_timeout(delay_ms, task);
        self.pending = Some(id);
        id
    }

    /// Claim an expiry. Returns `false` for a timer this slot no longer owns.
    pub fn fire(&mut self, id: TimerId) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn cancel<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(id) = self.pending.take() {
            host.clear_timer(id);
        }
    }
}
