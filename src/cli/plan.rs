use clap::Parser;

use crate::{
    cli::planning::PlanningArgs,
    core::{
        horizon::{QUARTERS_PER_HOUR, month_of_year},
        simulator::Simulator,
    },
    forecast::Predictors,
    prelude::*,
    tables::{build_forecast_table, build_plan_table},
};

#[derive(Parser)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub planning: PlanningArgs,

    /// Also print the hourly consumption and production forecast for the rest of the day.
    #[clap(long)]
    pub forecast: bool,
}

#[instrument(skip_all)]
pub fn plan(args: &PlanArgs) -> Result {
    let planning = args.planning.load()?;
    let now = planning.now;
    let state_of_charge = planning.state.state_of_charge;

    info!(
        remaining_consumption = %planning.consumption.predict_remaining_day(now),
        remaining_production = %planning.production.predict_remaining_day(now),
        next_hour_consumption = %planning.consumption.predict_next_quarters(now, QUARTERS_PER_HOUR),
        expected_daily_production = %planning.production.expected_daily_production(month_of_year(&now)),
        "forecast",
    );
    if args.forecast {
        println!("{}", build_forecast_table(&planning.consumption, &planning.production, now));
    }

    let simulator = Simulator::builder()
        .forecast(Predictors { consumption: &planning.consumption, production: &planning.production })
        .battery(planning.settings.battery)
        .build();
    let plans = simulator.simulate(state_of_charge, &planning.prices, now);
    ensure!(!plans.is_empty(), "the prices do not cover {now}");

    println!("{}", build_plan_table(&plans));
    println!("{}", simulator.summarize(&plans, state_of_charge));
    Ok(())
}
