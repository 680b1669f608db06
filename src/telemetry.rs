use std::{fs, path::Path};

use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    forecast::{consumption::ConsumptionPredictor, production::ProductionPredictor},
    prelude::*,
    quantity::{Zero, power::Watts, proportions::Percentage},
};

/// Single inverter telemetry reading in local time.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub load_power: Watts,
    pub pv_power: Watts,
}

/// Read the JSON array of samples.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let samples: Vec<Sample> = serde_json::from_slice(
        &fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))?,
    )
    .with_context(|| format!("failed to parse `{}`", path.display()))?;
    info!(n_samples = samples.len(), "read the telemetry");
    Ok(samples)
}

/// Latest inverter reading, kept up to date by the telemetry collector.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
pub struct LiveState {
    pub state_of_charge: Percentage,
    pub load_power: Option<Watts>,
    pub pv_power: Option<Watts>,
}

impl LiveState {
    pub const fn with_state_of_charge(state_of_charge: Percentage) -> Self {
        Self { state_of_charge, load_power: None, pv_power: None }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read_from(path: &Path) -> Result<Self> {
        let state: Self = serde_json::from_slice(
            &fs::read(path).with_context(|| format!("failed to read `{}`", path.display()))?,
        )
        .with_context(|| format!("failed to parse `{}`", path.display()))?;
        ensure!(
            state.state_of_charge.is_finite()
                && (Percentage::ZERO..=Percentage::HUNDRED).contains(&state.state_of_charge),
            "invalid state of charge: {}",
            state.state_of_charge,
        );
        Ok(state)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Replay {
    pub n_samples: usize,
    pub n_consumption_quarters: usize,
    pub n_production_quarters: usize,
}

/// Feed the samples in chronological order through both predictors.
#[instrument(skip_all)]
pub fn replay(
    samples: impl IntoIterator<Item = Sample>,
    consumption: &mut ConsumptionPredictor,
    production: &mut ProductionPredictor,
) -> Replay {
    let mut replay = Replay::default();
    for sample in samples.into_iter().sorted_by_key(|sample| sample.timestamp) {
        replay.n_samples += 1;
        if consumption.add_sample(sample.load_power, sample.timestamp) {
            replay.n_consumption_quarters += 1;
        }
        if production.add_sample(sample.pv_power, sample.timestamp) {
            replay.n_production_quarters += 1;
        }
    }
    info!(
        replay.n_samples,
        replay.n_consumption_quarters,
        replay.n_production_quarters,
        "replayed the telemetry",
    );
    replay
}
