// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Simulation Clock

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScale {
    #[default]
    Paused,
    Normal,
    Fast,
}

impl TimeScale {
    pub fn factor(&self) -> f64 {
        match self {
            Self::Paused => 0.0,
            Self::Normal => 1.0,
            Self::Fast => 3.0,
        }
    }

    pub fn from_factor(factor: u32) -> Option<Self> {
        match factor {
            0 => Some(Self::Paused),
            1 => Some(Self::Normal),
            3 => Some(Self::Fast),
            _ => None,
        }
    }
}

/// Turns host wall-clock deltas into simulated seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationClock {
    scale: TimeScale,
    max_frame_dt: f64,
    elapsed: f64,
    ticks: u64,
}

impl SimulationClock {
    pub fn new(max_frame_dt: f64) -> Self {
        Self {
            scale: TimeScale::Paused,
            max_frame_dt,
            elapsed: 0.0,
            ticks: 0,
        }
    }

    pub fn scale(&self) -> TimeScale {
        self.scale
    }

    pub fn set_scale(&mut self, scale: TimeScale) {
        self.scale = scale;
    }

    /// Clamp the wall delta (absorbs stalls such as a backgrounded tab),
    /// then apply the player's time multiplier.
    pub fn scaled_dt(&self, wall_dt: f64) -> f64 {
        if !wall_dt.is_finite() {
            return 0.0;
        }
        wall_dt.clamp(0.0, self.max_frame_dt) * self.scale.factor()
    }

    /// Record that `dt` simulated seconds have been consumed.
    pub fn advance(&mut self, dt: f64) {
        self.elapsed += dt;
        self.ticks += 1;
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn restore_elapsed(&mut self, elapsed: f64) {
        self.elapsed = elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_clock_yields_zero() {
        let clock = SimulationClock::new(0.1);
        assert_eq!(clock.scaled_dt(0.016), 0.0);
    }

    #[test]
    fn stalls_are_clamped_before_scaling() {
        let mut clock = SimulationClock::new(0.1);
        clock.set_scale(TimeScale::Fast);
        assert!((clock.scaled_dt(5.0) - 0.3).abs() < 1e-12);
        clock.set_scale(TimeScale::Normal);
        assert!((clock.scaled_dt(0.05) - 0.05).abs() < 1e-12);
        assert_eq!(clock.scaled_dt(-1.0), 0.0);
        assert_eq!(clock.scaled_dt(f64::NAN), 0.0);
    }

    #[test]
    fn factor_round_trip() {
        for scale in [TimeScale::Paused, TimeScale::Normal, TimeScale::Fast] {
            assert_eq!(TimeScale::from_factor(scale.factor() as u32), Some(scale));
        }
        assert_eq!(TimeScale::from_factor(2), None);
    }
}
