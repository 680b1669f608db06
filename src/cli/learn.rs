use std::path::PathBuf;

use chrono::Local;
use clap::Parser;

use crate::{
    cli::{HistoryArgs, SettingsArgs},
    core::horizon::month_of_year,
    forecast::{consumption::ConsumptionPredictor, production::ProductionPredictor},
    prelude::*,
    storage::HistoryStore,
    telemetry::{read_samples, replay},
};

#[derive(Parser)]
pub struct LearnArgs {
    /// JSON array of `{timestamp, load_power, pv_power}` samples.
    #[clap(long, env = "TELEMETRY")]
    pub telemetry: PathBuf,

    #[clap(flatten)]
    pub history: HistoryArgs,

    #[clap(flatten)]
    pub settings: SettingsArgs,

    /// Forget the saved history before the replay.
    #[clap(long)]
    pub reset: bool,
}

#[instrument(skip_all)]
pub fn learn(args: &LearnArgs) -> Result {
    let settings = args.settings.load()?;
    let store = HistoryStore::new(&args.history.directory);
    let mut consumption = ConsumptionPredictor::new(store.load_consumption());
    let mut production = ProductionPredictor::new(store.load_production(), settings.installed_power);

    if args.reset {
        consumption.clear();
        production.clear();
    }

    let samples = read_samples(&args.telemetry)?;
    let last_timestamp = samples.iter().map(|sample| sample.timestamp).max();
    let replay = replay(samples, &mut consumption, &mut production);
    ensure!(replay.n_samples != 0, "the telemetry is empty");

    store.save_consumption(consumption.history())?;
    store.save_production(production.history())?;

    let month = month_of_year(&last_timestamp.unwrap_or_else(|| Local::now().naive_local()));
    info!(
        n_consumption_samples = consumption.n_samples(),
        last_week = ?consumption.history().last_week(),
        average_daily_consumption = %consumption.average_daily_consumption(),
        reliable_consumption = consumption.has_reliable_data(),
        expected_daily_production = %production.expected_daily_production(month),
        reliable_production = production.has_reliable_data(month),
        "learned",
    );
    Ok(())
}
