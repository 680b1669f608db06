use chrono::{NaiveDate, NaiveDateTime};

use crate::{
    core::horizon::quarter_of_day,
    quantity::{Zero, power::Watts},
};

/// Quarter whose samples have all been collected.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FinishedQuarter {
    pub date: NaiveDate,
    pub quarter_of_day: usize,
    pub mean_power: Watts,
}

/// Averages the power samples within the current quarter.
#[derive(Copy, Clone, Debug)]
pub struct QuarterAccumulator {
    current: Option<(NaiveDate, usize)>,
    total_power: Watts,
    n_samples: usize,
}

impl QuarterAccumulator {
    pub const fn new() -> Self {
        Self { current: None, total_power: Watts::ZERO, n_samples: 0 }
    }

    /// Add the sample and return the previous quarter once the sample falls into a new one.
    pub fn push(&mut self, power: Watts, timestamp: NaiveDateTime) -> Option<FinishedQuarter> {
        let slot = (timestamp.date(), quarter_of_day(&timestamp));
        let finished = match self.current {
            Some(current) if current != slot && self.n_samples != 0 => {
                #[expect(clippy::cast_precision_loss)]
                let mean_power = self.total_power / self.n_samples as f64;
                Some(FinishedQuarter { date: current.0, quarter_of_day: current.1, mean_power })
            }
            _ => None,
        };
        if self.current != Some(slot) {
            self.current = Some(slot);
            self.total_power = Watts::ZERO;
            self.n_samples = 0;
        }
        self.total_power += power;
        self.n_samples += 1;
        finished
    }

    #[must_use]
    pub const fn n_samples(&self) -> usize {
        self.n_samples
    }
}
