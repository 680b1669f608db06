use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use clap::Parser;

use crate::{
    cli::{HistoryArgs, SettingsArgs, prices::PriceFile},
    core::prices::{PriceCurve, RetailCoefficients},
    forecast::{consumption::ConsumptionPredictor, production::ProductionPredictor},
    prelude::*,
    quantity::proportions::Percentage,
    settings::Settings,
    storage::HistoryStore,
    telemetry::LiveState,
};

/// Inputs shared by the planning commands.
#[derive(Parser)]
pub struct PlanningArgs {
    #[clap(flatten)]
    pub settings: SettingsArgs,

    #[clap(flatten)]
    pub history: HistoryArgs,

    /// JSON file with today's, and optionally tomorrow's, quarter-hourly spot prices.
    #[clap(long, env = "PRICES")]
    pub prices: PathBuf,

    #[clap(flatten)]
    pub state: StateArgs,

    /// Local time to plan from, defaults to now.
    #[clap(long)]
    pub now: Option<NaiveDateTime>,
}

/// Where the current battery state comes from.
#[derive(Parser)]
pub struct StateArgs {
    /// Current battery state-of-charge percentage.
    #[clap(
        long = "state-of-charge",
        env = "STATE_OF_CHARGE",
        required_unless_present = "state_file",
        conflicts_with = "state_file"
    )]
    pub state_of_charge: Option<Percentage>,

    /// JSON file with `state_of_charge` and, optionally, `load_power` and `pv_power`.
    #[clap(long = "state-file", env = "STATE_FILE")]
    pub state_file: Option<PathBuf>,
}

impl StateArgs {
    pub fn read(&self) -> Result<LiveState> {
        match (self.state_of_charge, &self.state_file) {
            (Some(state_of_charge), _) => Ok(LiveState::with_state_of_charge(state_of_charge)),
            (None, Some(path)) => LiveState::read_from(path),
            (None, None) => bail!("either the state of charge or the state file is required"),
        }
    }
}

/// Everything the simulator needs, loaded from the disk.
pub struct Planning {
    pub settings: Settings,
    pub consumption: ConsumptionPredictor,
    pub production: ProductionPredictor,
    pub prices: PriceCurve,
    pub state: LiveState,
    pub now: NaiveDateTime,
}

impl PlanningArgs {
    pub fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }

    pub fn read_prices(&self, now: NaiveDateTime, retail: RetailCoefficients) -> Result<PriceCurve> {
        PriceFile::read_from(&self.prices)?.into_curve(now.date(), retail)
    }

    #[instrument(skip_all)]
    pub fn load(&self) -> Result<Planning> {
        let now = self.now();
        let settings = self.settings.load()?;
        let store = HistoryStore::new(&self.history.directory);
        let consumption = ConsumptionPredictor::new(store.load_consumption());
        let production = ProductionPredictor::new(store.load_production(), settings.installed_power);
        let prices = self.read_prices(now, settings.retail)?;
        let state = self.state.read()?;
        info!(
            %now,
            state_of_charge = %state.state_of_charge,
            reliable_consumption = consumption.has_reliable_data(),
            "loaded the planning inputs",
        );
        Ok(Planning { settings, consumption, production, prices, state, now })
    }
}
