//! SI retransmission timers.
//!
//! Each table owns a [`TableTimer`] ticked once per PES-cell loop iteration.
//! A table fires when its packet counter reaches the period, on the first
//! opportunity with a valid DTS, when the user-configured wall-clock period
//! has elapsed in DTS time, or on an external force (video key frames with
//! PAT_PMT_AT_FRAMES, or the REEMIT flag).

/// Retransmission state for one table.
#[derive(Debug, Default)]
pub struct TableTimer {
    packet_count: i32,
    packet_period: i32,
    last_ts: Option<i64>,
    user_period_s: Option<f64>,
}

impl TableTimer {
    /// Set the packet period; a user period in seconds replaces packet-count
    /// scheduling entirely. The counter is primed so the first tick fires.
    pub fn configure(&mut self, packet_period: i32, user_period_s: Option<f64>) {
        self.packet_period = if user_period_s.is_some() {
            i32::MAX
        } else {
            packet_period
        };
        self.user_period_s = user_period_s;
        self.packet_count = self.packet_period - 1;
        self.last_ts = None;
    }

    /// Prime the counter so the next tick fires regardless of period.
    pub fn force(&mut self) {
        self.packet_count = self.packet_period - 1;
    }

    /// Advance the counter and decide whether the table is due. A firing
    /// tick resets the counter and records `dts` as the last emission time.
    pub fn tick(&mut self, dts: Option<i64>, force: bool) -> bool {
        self.packet_count += 1;
        let period_elapsed = match (dts, self.last_ts, self.user_period_s) {
            (Some(d), Some(l), Some(p)) => (d - l) as f64 >= p * 90_000.0,
            _ => false,
        };
        let fire = self.packet_count == self.packet_period
            || (dts.is_some() && self.last_ts.is_none())
            || period_elapsed
            || force;
        if fire {
            self.packet_count = 0;
            if let Some(d) = dts {
                self.last_ts = Some(self.last_ts.map_or(d, |l| l.max(d)));
            }
        }
        fire
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_fires() {
        let mut timer = TableTimer::default();
        timer.configure(40, None);
        assert!(timer.tick(None, false));
        assert!(!timer.tick(None, false));
    }

    #[test]
    fn test_packet_period() {
        let mut timer = TableTimer::default();
        timer.configure(5, None);
        assert!(timer.tick(None, false));
        for _ in 0..4 {
            assert!(!timer.tick(None, false));
        }
        assert!(timer.tick(None, false));
    }

    #[test]
    fn test_first_dts_fires_even_mid_period() {
        let mut timer = TableTimer::default();
        timer.configure(100, None);
        assert!(timer.tick(None, false)); // counter-primed first fire
        assert!(timer.tick(Some(90_000), false)); // no last_ts yet
        assert!(!timer.tick(Some(90_001), false));
    }

    #[test]
    fn test_user_period_replaces_packet_count() {
        let mut timer = TableTimer::default();
        timer.configure(2, Some(1.0));
        assert!(timer.tick(Some(0), false));
        // two packet periods pass without firing
        assert!(!timer.tick(Some(30_000), false));
        assert!(!timer.tick(Some(60_000), false));
        // one second of DTS elapses
        assert!(timer.tick(Some(90_000), false));
    }

    #[test]
    fn test_force_fires_and_resets() {
        let mut timer = TableTimer::default();
        timer.configure(10, None);
        assert!(timer.tick(Some(0), false));
        assert!(timer.tick(Some(10), true));
        assert!(!timer.tick(Some(20), false));
    }

    #[test]
    fn test_last_ts_is_monotonic() {
        let mut timer = TableTimer::default();
        timer.configure(3, None);
        assert!(timer.tick(Some(90_000), false));
        // an older dts must not rewind the emission clock
        timer.force();
        assert!(timer.tick(Some(45_000), true));
        assert!(!timer.tick(Some(90_001), false));
    }
}
