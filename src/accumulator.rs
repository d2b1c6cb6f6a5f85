// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Energy counter accumulation
//!
//! Each trigger from the edge detector represents one disk revolution,
//! i.e. a fixed energy quantum of `1 / rev_per_kwh` kWh. The
//! accumulator adds that quantum to a monotonically growing counter
//! and derives the per-trigger consumption value that the store's
//! ABSOLUTE series averages into watts.

/// Joules per kilowatt-hour. Multiplying the per-trigger quantum (kWh)
/// by this constant yields the energy of one revolution in watt-seconds,
/// which the store's averaging consolidation turns into mean power.
pub const JOULES_PER_KWH: f64 = 3_600_000.0;

/// One consumption reading produced by a single trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Absolute meter counter in kWh
    pub counter_kwh: f64,
    /// Per-trigger consumption in watt-seconds (constant for a given
    /// meter rating; the time dimension is supplied by the store)
    pub power_w: f64,
}

/// Running energy counter.
///
/// Owned by the poll loop for the process lifetime; initialized from
/// the last persisted value at startup and only ever incremented.
#[derive(Debug, Clone)]
pub struct Accumulator {
    counter_kwh: f64,
    quantum_kwh: f64,
}

impl Accumulator {
    /// Create an accumulator starting at `initial_kwh`, for a meter
    /// rated at `rev_per_kwh` disk revolutions per kilowatt-hour.
    pub fn new(initial_kwh: f64, rev_per_kwh: u32) -> Self {
        Self {
            counter_kwh: initial_kwh,
            quantum_kwh: 1.0 / f64::from(rev_per_kwh),
        }
    }

    /// Record one trigger: advance the counter by one quantum and
    /// return the reading to persist and forward.
    pub fn record_trigger(&mut self) -> Reading {
        self.counter_kwh += self.quantum_kwh;
        Reading {
            counter_kwh: self.counter_kwh,
            power_w: self.quantum_kwh * JOULES_PER_KWH,
        }
    }

    /// Current counter value in kWh.
    pub fn counter_kwh(&self) -> f64 {
        self.counter_kwh
    }

    /// Energy represented by a single trigger, in kWh.
    pub fn quantum_kwh(&self) -> f64 {
        self.quantum_kwh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_trigger() {
        // 75 revolutions per kWh, counter restored to 10.0
        let mut acc = Accumulator::new(10.0, 75);
        let reading = acc.record_trigger();

        assert_relative_eq!(reading.counter_kwh, 10.0 + 1.0 / 75.0);
        assert_relative_eq!(reading.power_w, 48_000.0);
    }

    #[test]
    fn test_counter_after_n_triggers() {
        let mut acc = Accumulator::new(0.0, 75);
        for _ in 0..300 {
            acc.record_trigger();
        }
        // 300 triggers at 1/75 kWh each = 4 kWh, independent of timing
        assert_relative_eq!(acc.counter_kwh(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_power_is_constant_per_trigger() {
        let mut acc = Accumulator::new(0.0, 150);
        let first = acc.record_trigger();
        for _ in 0..10 {
            let reading = acc.record_trigger();
            assert_relative_eq!(reading.power_w, first.power_w);
        }
        assert_relative_eq!(first.power_w, 24_000.0);
    }

    #[test]
    fn test_counter_is_monotonic() {
        let mut acc = Accumulator::new(5.0, 75);
        let mut last = acc.counter_kwh();
        for _ in 0..50 {
            let reading = acc.record_trigger();
            assert!(reading.counter_kwh > last);
            last = reading.counter_kwh;
        }
    }
}
