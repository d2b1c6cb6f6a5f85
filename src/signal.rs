// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Pulse signal decoding and edge detection
//!
//! The sensor MCU streams one line per sample: `"1"` while the meter
//! disk's reflective mark is in front of the sensor, `"0"` otherwise.
//! One full revolution of the disk produces one active-to-inactive
//! transition, which is the event everything downstream counts.

/// One decoded sample of the sensor line state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Reflective mark in front of the sensor (line reads "1")
    Active,
    /// No mark in front of the sensor (line reads "0")
    Inactive,
}

impl Sample {
    /// Decode a raw text line into a sample.
    ///
    /// Exactly `"1"` (after trimming whitespace and the line terminator)
    /// is [`Sample::Active`], exactly `"0"` is [`Sample::Inactive`].
    /// Anything else is `None`: malformed lines leave the detector state
    /// untouched and never produce a trigger.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "1" => Some(Sample::Active),
            "0" => Some(Sample::Inactive),
            _ => None,
        }
    }
}

/// Two-state falling-edge detector.
///
/// Fires exactly once per active-to-inactive transition. Rising edges
/// and repeated same-level samples never fire, so a noisy stream of
/// duplicates is collapsed into one trigger per disk revolution.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    state: Sample,
}

impl EdgeDetector {
    /// Create a detector in the inactive state.
    pub fn new() -> Self {
        Self {
            state: Sample::Inactive,
        }
    }

    /// Feed one valid sample; returns `true` iff this observation is a
    /// falling edge (previous sample active, this one inactive).
    pub fn observe(&mut self, sample: Sample) -> bool {
        let old_state = self.state;
        self.state = sample;
        old_state == Sample::Active && sample == Sample::Inactive
    }

    /// Current line state as of the last valid sample.
    pub fn state(&self) -> Sample {
        self.state
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}
