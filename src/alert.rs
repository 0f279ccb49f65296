use crate::bay::{BayId, BayStatus, MAX_BAYS};
use crate::error::PeripheralError;
use crate::peripherals::{AlertOutputs, IndicatorColor};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertKind {
    Ack,
    TheftAlarm,
}

impl AlertKind {
    /// Higher value wins when patterns compete for a bay.
    pub fn priority(self) -> u8 {
        match self {
            AlertKind::Ack => 1,
            AlertKind::TheftAlarm => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTiming {
    pub ack_pulse_ms: u64,
    pub theft_high_ms: u64,
    pub theft_low_ms: u64,
    pub theft_cycles: u8,
}

impl Default for AlertTiming {
    fn default() -> Self {
        Self {
            ack_pulse_ms: 100,
            theft_high_ms: 1000,
            theft_low_ms: 1000,
            theft_cycles: 5,
        }
    }
}

impl AlertTiming {
    fn phases(&self, kind: AlertKind) -> (u64, u64) {
        match kind {
            AlertKind::Ack => (self.ack_pulse_ms, 0),
            AlertKind::TheftAlarm => (self.theft_high_ms, self.theft_low_ms),
        }
    }
}

/// A running cadence. Phase and cycle count are derived from elapsed time,
/// so a late tick never skips a high→low edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPattern {
    pub kind: AlertKind,
    pub started_at: u64,
    pub cycles_done: u8,
    pub max_cycles: u8,
}

impl AlertPattern {
    pub fn new(kind: AlertKind, started_at: u64, timing: &AlertTiming) -> Self {
        let max_cycles = match kind {
            AlertKind::Ack => 1,
            AlertKind::TheftAlarm => timing.theft_cycles,
        };
        Self {
            kind,
            started_at,
            cycles_done: 0,
            max_cycles,
        }
    }

    /// Recompute `cycles_done` for `now`.
    pub fn advance(&mut self, now: u64, timing: &AlertTiming) {
        let (high_ms, low_ms) = timing.phases(self.kind);
        let period = high_ms.saturating_add(low_ms).max(1);
        let elapsed = now.saturating_sub(self.started_at);

        let mut edges = elapsed / period;
        if elapsed % period >= high_ms {
            edges = edges.saturating_add(1);
        }
        self.cycles_done = edges.min(u64::from(self.max_cycles)) as u8;
    }

    pub fn is_high(&self, now: u64, timing: &AlertTiming) -> bool {
        if self.is_complete() {
            return false;
        }
        let (high_ms, low_ms) = timing.phases(self.kind);
        let period = high_ms.saturating_add(low_ms).max(1);
        let elapsed = now.saturating_sub(self.started_at);
        elapsed % period < high_ms
    }

    pub fn is_complete(&self) -> bool {
        self.cycles_done >= self.max_cycles
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub acks_triggered: u32,
    pub acks_dropped: u32,
    pub theft_alarms_triggered: u32,
    pub patterns_completed: u32,
    pub output_failures: u32,
}

#[derive(Debug, Clone, Copy)]
struct AlertSlot {
    bay: BayId,
    pattern: Option<AlertPattern>,
    indicator: Option<IndicatorColor>,
}

/// Drives the shared buzzer and per-bay indicators from one pattern slot per
/// bay. Concurrent theft alarms run independent cadences; the buzzer sounds
/// while any of them is in its high phase.
pub struct AlertEngine {
    timing: AlertTiming,
    outputs: Box<dyn AlertOutputs + Send>,
    slots: Vec<AlertSlot, MAX_BAYS>,
    alarm_on: Option<bool>,
    stats: AlertStats,
}

impl AlertEngine {
    pub fn new(
        timing: AlertTiming,
        outputs: Box<dyn AlertOutputs + Send>,
        bays: impl IntoIterator<Item = BayId>,
    ) -> Self {
        let mut slots = Vec::new();
        for bay in bays {
            let _ = slots.push(AlertSlot {
                bay,
                pattern: None,
                indicator: None,
            });
        }

        Self {
            timing,
            outputs,
            slots,
            alarm_on: None,
            stats: AlertStats::default(),
        }
    }

    /// Start a pattern on `bay`. Returns `false` when the request was dropped
    /// (unknown bay, or an Ack while a theft alarm is running there).
    pub fn trigger(&mut self, bay: BayId, kind: AlertKind, now: u64) -> bool {
        let timing = self.timing;
        let Some(slot) = self.slots.iter_mut().find(|s| s.bay == bay) else {
            warn!(bay = bay.get(), ?kind, "alert for unknown bay ignored");
            return false;
        };

        if let Some(running) = slot.pattern {
            if !running.is_complete() && running.kind.priority() > kind.priority() {
                debug!(bay = bay.get(), ?kind, running = ?running.kind, "alert dropped");
                if kind == AlertKind::Ack {
                    self.stats.acks_dropped = self.stats.acks_dropped.saturating_add(1);
                }
                return false;
            }
        }

        slot.pattern = Some(AlertPattern::new(kind, now, &timing));
        match kind {
            AlertKind::Ack => {
                self.stats.acks_triggered = self.stats.acks_triggered.saturating_add(1);
            }
            AlertKind::TheftAlarm => {
                info!(bay = bay.get(), cycles = timing.theft_cycles, "theft alarm started");
                self.stats.theft_alarms_triggered = self.stats.theft_alarms_triggered.saturating_add(1);
            }
        }
        true
    }

    /// Advance every pattern to `now` and update outputs that changed.
    /// `statuses` gives each bay's steady indicator colour.
    pub fn tick(&mut self, now: u64, statuses: &[(BayId, BayStatus)]) {
        let timing = self.timing;
        let mut buzzer = false;
        let mut failures = 0u32;

        for slot in &mut self.slots {
            let mut flashing = None;
            if let Some(pattern) = slot.pattern.as_mut() {
                pattern.advance(now, &timing);
                if pattern.is_complete() {
                    debug!(bay = slot.bay.get(), kind = ?pattern.kind, "alert pattern complete");
                    self.stats.patterns_completed = self.stats.patterns_completed.saturating_add(1);
                    slot.pattern = None;
                } else {
                    let high = pattern.is_high(now, &timing);
                    buzzer |= high;
                    if pattern.kind == AlertKind::TheftAlarm {
                        flashing = Some(high);
                    }
                }
            }

            let steady = statuses
                .iter()
                .find(|(id, _)| *id == slot.bay)
                .map_or(IndicatorColor::Off, |(_, status)| status_color(*status));
            let color = match flashing {
                Some(true) => IndicatorColor::Orange,
                Some(false) => IndicatorColor::Off,
                None => steady,
            };

            if slot.indicator != Some(color) {
                slot.indicator = Some(color);
                if let Err(e) = self.outputs.set_indicator(slot.bay, color) {
                    log_output_failure("indicator", e);
                    failures += 1;
                }
            }
        }

        if self.alarm_on != Some(buzzer) {
            self.alarm_on = Some(buzzer);
            if let Err(e) = self.outputs.set_alarm(buzzer) {
                log_output_failure("buzzer", e);
                failures += 1;
            }
        }

        self.stats.output_failures = self.stats.output_failures.saturating_add(failures);
    }

    pub fn active_pattern(&self, bay: BayId) -> Option<&AlertPattern> {
        self.slots
            .iter()
            .find(|s| s.bay == bay)
            .and_then(|s| s.pattern.as_ref())
    }

    pub fn is_alarm_on(&self) -> bool {
        self.alarm_on.unwrap_or(false)
    }

    pub fn timing(&self) -> &AlertTiming {
        &self.timing
    }

    pub fn stats(&self) -> &AlertStats {
        &self.stats
    }
}

impl core::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("timing", &self.timing)
            .field("slots", &self.slots)
            .field("alarm_on", &self.alarm_on)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Remote monitor colour scheme.
pub fn status_color(status: BayStatus) -> IndicatorColor {
    match status {
        BayStatus::Available => IndicatorColor::Green,
        BayStatus::Occupied => IndicatorColor::Red,
        BayStatus::Stolen => IndicatorColor::Orange,
    }
}

fn log_output_failure(output: &str, error: PeripheralError) {
    warn!(output, %error, "alert output write failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theft_pattern_counts_high_to_low_edges() {
        let timing = AlertTiming::default();
        let mut pattern = AlertPattern::new(AlertKind::TheftAlarm, 0, &timing);

        pattern.advance(999, &timing);
        assert_eq!(pattern.cycles_done, 0);
        assert!(pattern.is_high(999, &timing));

        pattern.advance(1000, &timing);
        assert_eq!(pattern.cycles_done, 1);
        assert!(!pattern.is_high(1000, &timing));

        pattern.advance(2500, &timing);
        assert_eq!(pattern.cycles_done, 1);
        assert!(pattern.is_high(2500, &timing));

        pattern.advance(9000, &timing);
        assert_eq!(pattern.cycles_done, 5);
        assert!(pattern.is_complete());
        assert!(!pattern.is_high(10_500, &timing));
    }

    #[test]
    fn test_huge_phases_do_not_overflow() {
        let timing = AlertTiming {
            theft_high_ms: u64::MAX,
            theft_low_ms: u64::MAX,
            ..AlertTiming::default()
        };
        let mut pattern = AlertPattern::new(AlertKind::TheftAlarm, 10, &timing);

        pattern.advance(u64::MAX, &timing);
        assert_eq!(pattern.cycles_done, 0);
        assert!(pattern.is_high(u64::MAX, &timing));
    }

    #[test]
    fn test_ack_is_single_pulse() {
        let timing = AlertTiming::default();
        let mut pattern = AlertPattern::new(AlertKind::Ack, 500, &timing);

        pattern.advance(550, &timing);
        assert!(pattern.is_high(550, &timing));
        assert!(!pattern.is_complete());

        pattern.advance(600, &timing);
        assert!(pattern.is_complete());
        assert!(!pattern.is_high(700, &timing));
    }

    #[test]
    fn test_late_tick_saturates_cycle_count() {
        let timing = AlertTiming::default();
        let mut pattern = AlertPattern::new(AlertKind::TheftAlarm, 0, &timing);
        pattern.advance(60_000, &timing);
        assert_eq!(pattern.cycles_done, pattern.max_cycles);
    }
}
