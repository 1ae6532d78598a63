//! Alert deduplication
//!
//! The first critical occurrence of a condition is dispatched immediately.
//! While it persists, re-notification waits for the rate-limit window to pass.
//! One cycle without any critical finding re-arms immediate dispatch.

use heapless::String;

use crate::threshold::{has_critical, Severity, ThresholdFinding, MAX_FINDINGS, MESSAGE_CAPACITY};

pub const ALERT_WINDOW_MS: u64 = 60_000;
pub const NOTIFY_MAX_CHARS: usize = 160; // SMS segment
pub const TRUNCATION_MARKER: &str = "...";

pub type AlertMessage = String<NOTIFY_MAX_CHARS>;

type JoinedFindings = String<{ MAX_FINDINGS * (MESSAGE_CAPACITY + 1) }>;

/// Receives dispatched alerts (cloud channel, SMS gateway, local buzzer)
pub trait Notifier {
    type Error;

    fn notify(&mut self, message: &str, severity: Severity) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlertWindowState {
    pub last_fired_at_ms: u64,
    pub alert_currently_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateDecision {
    /// Notification dispatched this cycle
    Fire,
    /// Critical findings present but still inside the rate-limit window
    Suppress,
    /// No critical finding; gate re-armed
    Clear,
}

pub struct AlertDispatchGate {
    state: AlertWindowState,
    window_ms: u64,
}

impl Default for AlertDispatchGate {
    fn default() -> Self {
        Self::new(ALERT_WINDOW_MS)
    }
}

impl AlertDispatchGate {
    pub fn new(window_ms: u64) -> Self {
        Self {
            state: AlertWindowState::default(),
            window_ms,
        }
    }

    pub fn state(&self) -> AlertWindowState {
        self.state
    }

    pub fn set_window(&mut self, window_ms: u64) {
        self.window_ms = window_ms;
    }

    /// Advances the gate for one cycle and reports what it decided
    pub fn decide(&mut self, findings: &[ThresholdFinding], now_ms: u64) -> GateDecision {
        if !has_critical(findings) {
            self.state.alert_currently_active = false;
            return GateDecision::Clear;
        }

        let window_elapsed =
            now_ms.saturating_sub(self.state.last_fired_at_ms) > self.window_ms;
        if !self.state.alert_currently_active || window_elapsed {
            self.state.last_fired_at_ms = now_ms;
            self.state.alert_currently_active = true;
            GateDecision::Fire
        } else {
            GateDecision::Suppress
        }
    }

    /// [`decide`](Self::decide), then hand the joined messages to `notifier` on a fire.
    ///
    /// A notifier failure is logged and not retried; the window still counts
    /// from this cycle.
    pub fn dispatch<N: Notifier>(
        &mut self,
        findings: &[ThresholdFinding],
        now_ms: u64,
        notifier: &mut N,
    ) -> GateDecision {
        let decision = self.decide(findings, now_ms);
        match decision {
            GateDecision::Fire => {
                let message = compose_message(findings);
                info!("alert: firing at {} ms ({} findings)", now_ms, findings.len());
                if notifier.notify(&message, Severity::Critical).is_err() {
                    warn!("alert: notifier rejected message");
                }
            }
            GateDecision::Suppress => {
                debug!(
                    "alert: suppressed, last fired at {} ms",
                    self.state.last_fired_at_ms
                );
            }
            GateDecision::Clear => {}
        }
        decision
    }
}

/// Newline-joined finding messages, cut to [`NOTIFY_MAX_CHARS`] with a
/// trailing [`TRUNCATION_MARKER`] when too long
pub fn compose_message(findings: &[ThresholdFinding]) -> AlertMessage {
    let mut joined = JoinedFindings::new();
    for (i, finding) in findings.iter().enumerate() {
        if i > 0 {
            let _ = joined.push('\n');
        }
        let _ = joined.push_str(&finding.message);
    }

    let mut out = AlertMessage::new();
    if joined.chars().count() <= NOTIFY_MAX_CHARS {
        let _ = out.push_str(&joined);
        return out;
    }

    let keep = NOTIFY_MAX_CHARS - TRUNCATION_MARKER.chars().count();
    for c in joined.chars().take(keep) {
        let _ = out.push(c);
    }
    let _ = out.push_str(TRUNCATION_MARKER);
    out
}
