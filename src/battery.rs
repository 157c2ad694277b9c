// FaceCube — Battery Monitor
//
// Edge-triggered state machine over (voltage, charging).  The ADC and the
// charger GPIO stay outside — the cube task feeds readings in, so an ADC
// failure simply means "no new reading" and the previous state is retained.

use crate::config::*;

/// Convert battery voltage (mV) to percentage over the measured LiPo
/// discharge curve (3.62 V full, 3.00 V cutoff).  Monotonic by construction.
pub fn voltage_to_percentage(mv: u16) -> u8 {
    match mv {
        m if m >= 3620 => 100,
        m if m >= 3550 => 90,
        m if m >= 3500 => 75,
        m if m >= 3450 => 60,
        m if m >= 3400 => 45,
        m if m >= 3350 => 30,
        m if m >= 3300 => 20,
        m if m >= 3250 => 10,
        m if m >= 3200 => 5,
        _ => 0,
    }
}

/// What a poll decided.  Ordered: edges first, broadcast last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryEvent {
    ChargingStarted,
    ChargingStopped,
    FullyCharged,
    LowBattery,
    /// Voltage at or below the cutoff while discharging — the caller is
    /// expected to emit a shutdown event and enter deep sleep.
    CriticalLow,
    StatusBroadcast { mv: u16, pct: u8, charging: bool },
}

pub struct BatteryMonitor {
    mv: u16,
    pct: u8,
    charging: bool,
    low_warned: bool,
    full_notified: bool,
    last_broadcast_ms: i64,
}

impl BatteryMonitor {
    pub fn new(initial_mv: u16, charging: bool, now_ms: i64) -> Self {
        Self {
            mv: initial_mv,
            pct: voltage_to_percentage(initial_mv),
            charging,
            low_warned: false,
            full_notified: false,
            last_broadcast_ms: now_ms,
        }
    }

    pub fn millivolts(&self) -> u16 {
        self.mv
    }

    pub fn percentage(&self) -> u8 {
        self.pct
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// One poll cycle.  `reading` is `None` when the ADC read failed this
    /// round; the previous voltage is kept until the next successful poll.
    pub fn poll(
        &mut self,
        reading: Option<u16>,
        charging: bool,
        now_ms: i64,
    ) -> Vec<BatteryEvent> {
        let mut events = Vec::new();

        if let Some(mv) = reading {
            self.mv = mv;
            self.pct = voltage_to_percentage(mv);
        }

        if charging != self.charging {
            self.charging = charging;
            if charging {
                events.push(BatteryEvent::ChargingStarted);
            } else {
                events.push(BatteryEvent::ChargingStopped);
                // Next plug-in may announce full again.
                self.full_notified = false;
            }
        }

        if self.charging && self.pct >= 100 && !self.full_notified {
            self.full_notified = true;
            events.push(BatteryEvent::FullyCharged);
        }

        if !self.charging {
            if self.low_warned {
                // Re-arm only once the voltage has clearly recovered.
                if self.mv > LOW_BATT_MV + LOW_BATT_HYST_MV {
                    self.low_warned = false;
                }
            } else if self.mv <= LOW_BATT_MV {
                self.low_warned = true;
                events.push(BatteryEvent::LowBattery);
            }

            if self.mv <= CRITICAL_BATT_MV {
                events.push(BatteryEvent::CriticalLow);
            }
        }

        if now_ms - self.last_broadcast_ms >= BATTERY_BROADCAST_INTERVAL_MS {
            self.last_broadcast_ms = now_ms;
            events.push(BatteryEvent::StatusBroadcast {
                mv: self.mv,
                pct: self.pct,
                charging: self.charging,
            });
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_table_is_monotonic() {
        let mut last = 100;
        for mv in (2900u16..=4200).rev().step_by(10) {
            let pct = voltage_to_percentage(mv);
            assert!(pct <= last, "{} mV -> {}% after {}%", mv, pct, last);
            last = pct;
        }
        assert_eq!(voltage_to_percentage(3620), 100);
        assert_eq!(voltage_to_percentage(3200), 5);
        assert_eq!(voltage_to_percentage(3000), 0);
    }

    #[test]
    fn low_battery_fires_once_with_hysteresis() {
        let mut m = BatteryMonitor::new(3650, false, 0);

        // Discharge 3650 -> 3150 in 100 mV steps: exactly one warning, at
        // the first sample at or below 3200.
        let mut warnings = Vec::new();
        for (i, mv) in (0u16..6).map(|i| (i, 3650 - i * 100)) {
            let evs = m.poll(Some(mv), false, (i as i64 + 1) * 10_000);
            if evs.contains(&BatteryEvent::LowBattery) {
                warnings.push(mv);
            }
        }
        assert_eq!(warnings, vec![3150]);

        // Hovering just above threshold does not re-arm...
        assert!(m.poll(Some(3250), false, 70_000).is_empty());
        assert!(m.poll(Some(3150), false, 80_000).is_empty());

        // ...but recovering past threshold + hysteresis does.
        assert!(m.poll(Some(3350), false, 90_000).is_empty());
        assert_eq!(
            m.poll(Some(3150), false, 100_000),
            vec![BatteryEvent::LowBattery]
        );
    }

    #[test]
    fn charging_edges_are_reported_once() {
        let mut m = BatteryMonitor::new(3500, false, 0);
        assert_eq!(
            m.poll(Some(3500), true, 10_000),
            vec![BatteryEvent::ChargingStarted]
        );
        assert!(m.poll(Some(3520), true, 20_000).is_empty());
        assert_eq!(
            m.poll(Some(3520), false, 30_000),
            vec![BatteryEvent::ChargingStopped]
        );
        assert!(m.poll(Some(3510), false, 40_000).is_empty());
    }

    #[test]
    fn fully_charged_once_per_charge_cycle() {
        let mut m = BatteryMonitor::new(3500, false, 0);
        m.poll(Some(3500), true, 10_000);
        assert_eq!(
            m.poll(Some(3650), true, 20_000),
            vec![BatteryEvent::FullyCharged]
        );
        // Still full, still charging: silent.
        assert!(m.poll(Some(3650), true, 30_000).is_empty());
        // Unplug, drain a little, replug: announced again on reaching full.
        m.poll(Some(3600), false, 40_000);
        m.poll(Some(3600), true, 50_000);
        assert_eq!(
            m.poll(Some(3650), true, 60_000),
            vec![BatteryEvent::FullyCharged]
        );
    }

    #[test]
    fn charging_suppresses_low_battery() {
        let mut m = BatteryMonitor::new(3150, true, 0);
        assert!(m.poll(Some(3100), true, 10_000).is_empty());
    }

    #[test]
    fn failed_reading_retains_previous_state() {
        let mut m = BatteryMonitor::new(3400, false, 0);
        assert!(m.poll(None, false, 10_000).is_empty());
        assert_eq!(m.millivolts(), 3400);
        assert_eq!(m.percentage(), 45);
    }

    #[test]
    fn critical_voltage_requests_shutdown() {
        let mut m = BatteryMonitor::new(3100, false, 0);
        let evs = m.poll(Some(2990), false, 10_000);
        assert!(evs.contains(&BatteryEvent::CriticalLow));
        // A charging cube is never shut down for voltage.
        let mut m = BatteryMonitor::new(3100, true, 0);
        assert!(!m
            .poll(Some(2990), true, 10_000)
            .contains(&BatteryEvent::CriticalLow));
    }

    #[test]
    fn status_broadcast_every_interval() {
        let mut m = BatteryMonitor::new(3500, false, 0);
        assert!(m.poll(Some(3500), false, 10_000).is_empty());
        let evs = m.poll(Some(3490), false, BATTERY_BROADCAST_INTERVAL_MS);
        assert_eq!(
            evs,
            vec![BatteryEvent::StatusBroadcast {
                mv: 3490,
                pct: 60,
                charging: false
            }]
        );
        assert!(m
            .poll(Some(3490), false, BATTERY_BROADCAST_INTERVAL_MS + 10_000)
            .is_empty());
    }
}
