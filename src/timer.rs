use embedded_hal::delay::DelayNs;

pub const POLL_STEP_MS: u32 = 10; // granularity of every bounded wait
pub const OPERATOR_POLL_MS: u32 = 50;
pub const SAMPLE_INTERVAL_MS: u32 = 30_000; // one sampling cycle every 30s

/// Source of monotonic milliseconds since boot
pub trait Monotonic {
    fn now_ms(&self) -> u64;
}

/// Decides when the next sampling cycle is due
pub struct CycleTimer {
    interval_ms: u32,
    last_run_ms: Option<u64>,
}

impl CycleTimer {
    pub fn new(interval_ms: u32) -> CycleTimer {
        Self {
            interval_ms,
            last_run_ms: None,
        }
    }

    pub fn set_interval(&mut self, interval_ms: u32) {
        self.interval_ms = interval_ms;
    }

    /// The first check after boot is always due
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_run_ms {
            Some(last) => now_ms.saturating_sub(last) >= u64::from(self.interval_ms),
            None => true,
        }
    }

    pub fn mark(&mut self, now_ms: u64) {
        self.last_run_ms = Some(now_ms);
    }
}

/// A wait budget spent in fixed steps.
///
/// Replaces open-ended busy loops: the owner checks its condition, then calls
/// [`Deadline::wait_step`], which sleeps one step and reports whether any
/// budget is left.
pub struct Deadline {
    remaining_ms: u32,
    step_ms: u32,
}

impl Deadline {
    pub fn new(budget_ms: u32, step_ms: u32) -> Deadline {
        Self {
            remaining_ms: budget_ms,
            step_ms: step_ms.max(1),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ms == 0
    }

    /// Sleeps one step. Returns false, without sleeping, once the budget is spent.
    pub fn wait_step<D: DelayNs>(&mut self, delay: &mut D) -> bool {
        if self.is_expired() {
            return false;
        }
        let step = self.step_ms.min(self.remaining_ms);
        delay.delay_ms(step);
        self.remaining_ms -= step;
        true
    }
}
