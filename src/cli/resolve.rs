use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bon::Builder;
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use clap::Parser;
use tokio::time::sleep;

use crate::{
    cli::planning::PlanningArgs,
    core::{
        horizon::horizon_index,
        prices::PriceCurve,
        resolver::{Actuator, Resolution, Resolver},
    },
    forecast::{Predictors, consumption::ConsumptionPredictor, production::ProductionPredictor},
    prelude::*,
    settings::Settings,
    storage::HistoryStore,
    tables::{build_plan_table, build_resolution_table},
    telemetry::LiveState,
};

/// Longer silence makes the intraday corrections meaningless.
const MAX_TELEMETRY_GAP_MINUTES: i64 = 60;

#[derive(Parser)]
pub struct ResolveArgs {
    #[clap(flatten)]
    pub planning: PlanningArgs,

    /// How long a computed plan stays valid.
    #[clap(long = "cache-ttl", env = "CACHE_TTL", default_value = "60s")]
    pub cache_ttl: humantime::Duration,

    /// How often the state file and the prices are re-read.
    #[clap(long = "polling-interval", env = "POLLING_INTERVAL", default_value = "10s")]
    pub polling_interval: humantime::Duration,

    /// Resolve once at `--now` and exit.
    #[clap(long)]
    pub once: bool,

    /// Also print the whole plan when the decision is reported.
    #[clap(long = "print-plan")]
    pub print_plan: bool,
}

#[instrument(skip_all)]
pub async fn resolve(args: &ResolveArgs) -> Result {
    let mut controller = Controller::new(args)?;

    if args.once {
        let (resolution, should_send) = controller.tick(args.planning.now())?;
        controller.report(&resolution, should_send);
        return Ok(());
    }

    let should_terminate = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&should_terminate))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&should_terminate))?;

    let polling_interval: Duration = args.polling_interval.into();
    info!(?polling_interval, enabled = controller.resolver.is_enabled(), "running the control loop");

    while !should_terminate.load(Ordering::Relaxed) {
        let (resolution, should_send) = controller.tick(Local::now().naive_local())?;
        if should_send {
            info!(?resolution.decision, ?resolution.reason, "sending the decision");
            controller.report(&resolution, should_send);
        } else {
            debug!(?resolution.decision, ?resolution.reason, "nothing to send");
        }
        sleep(polling_interval).await;
    }

    info!("terminating, saving the history");
    controller.save()
}

fn build_resolver(settings: &Settings, ttl: Duration) -> Resolver {
    Resolver::builder().enabled(settings.enabled).battery(settings.battery).ttl(ttl).build()
}

/// State of the control loop between the ticks.
#[derive(Builder)]
struct Controller<'a> {
    args: &'a ResolveArgs,
    settings: Settings,
    store: HistoryStore,
    consumption: ConsumptionPredictor,
    production: ProductionPredictor,
    resolver: Resolver,

    #[builder(default)]
    actuator: Actuator,

    /// First day and length of the last seen price curve.
    price_key: Option<(NaiveDate, usize)>,

    last_sample_at: Option<NaiveDateTime>,
}

impl<'a> Controller<'a> {
    fn new(args: &'a ResolveArgs) -> Result<Self> {
        let settings = args.planning.settings.load()?;
        let store = HistoryStore::new(&args.planning.history.directory);
        Ok(Self::builder()
            .args(args)
            .consumption(ConsumptionPredictor::new(store.load_consumption()))
            .production(ProductionPredictor::new(store.load_production(), settings.installed_power))
            .resolver(build_resolver(&settings, args.cache_ttl.into()))
            .settings(settings)
            .store(store)
            .build())
    }

    /// Resolve the quarter containing `now`, and tell whether the decision must be sent.
    #[instrument(skip_all, fields(now = %now))]
    fn tick(&mut self, now: NaiveDateTime) -> Result<(Resolution, bool)> {
        self.reload_settings()?;
        let state = self.args.planning.state.read()?;
        self.learn(&state, now)?;

        let prices = if self.resolver.is_enabled() {
            self.args
                .planning
                .read_prices(now, self.settings.retail)
                .inspect_err(|error| warn!("no usable prices: {error:#}"))
                .ok()
        } else {
            None
        };
        if let Some(prices) = &prices {
            self.observe_prices(prices);
        }

        let resolution = self
            .resolver
            .resolve()
            .forecast(Predictors { consumption: &self.consumption, production: &self.production })
            .maybe_prices(prices.as_ref())
            .state_of_charge(state.state_of_charge)
            .now(now)
            .call();
        let should_send = self.actuator.should_send(&resolution);
        Ok((resolution, should_send))
    }

    fn report(&self, resolution: &Resolution, should_send: bool) {
        let next = resolution
            .quarter_start
            .zip(self.price_key)
            .and_then(|(start, (first_day, _))| horizon_index(first_day, start))
            .map(|index| self.resolver.decision_for(index + 1));
        println!("{}", build_resolution_table(resolution, next, should_send));
        if self.args.print_plan && !self.resolver.plans().is_empty() {
            println!("{}", build_plan_table(self.resolver.plans()));
        }
        if let Some(summary) = self.resolver.summary() {
            println!("{summary}");
        }
    }

    /// Pick up the edited settings file without restarting.
    fn reload_settings(&mut self) -> Result {
        let settings = self.args.planning.settings.load()?;
        if settings == self.settings {
            return Ok(());
        }
        info!(enabled = settings.enabled, "the settings have changed");
        if settings.installed_power != self.production.installed_power() {
            self.production.set_installed_power(settings.installed_power);
        }
        self.resolver = build_resolver(&settings, self.args.cache_ttl.into());
        self.settings = settings;
        Ok(())
    }

    /// Tomorrow's prices extend the horizon, so the cached plan is no longer complete.
    fn observe_prices(&mut self, prices: &PriceCurve) {
        let key = (prices.first_day(), prices.len());
        if self.price_key.is_some_and(|last_key| last_key != key) {
            info!(first_day = %key.0, n_quarters = key.1, "new prices, dropping the cached plan");
            self.resolver.invalidate();
        }
        self.price_key = Some(key);
    }

    fn learn(&mut self, state: &LiveState, now: NaiveDateTime) -> Result {
        if state.load_power.is_none() && state.pv_power.is_none() {
            return Ok(());
        }
        if let Some(last_sample_at) = self.last_sample_at
            && now - last_sample_at > TimeDelta::minutes(MAX_TELEMETRY_GAP_MINUTES)
        {
            warn!(%last_sample_at, "telemetry gap, resetting the corrections");
            self.consumption.reset_correction();
            self.production.reset_correction();
        }
        self.last_sample_at = Some(now);

        let is_consumption_committed =
            state.load_power.is_some_and(|power| self.consumption.add_sample(power, now));
        let is_production_committed =
            state.pv_power.is_some_and(|power| self.production.add_sample(power, now));
        if is_consumption_committed || is_production_committed {
            debug!(
                consumption_correction = %self.consumption.correction(),
                production_correction = %self.production.correction(),
                "committed the quarter",
            );
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result {
        self.store.save_consumption(self.consumption.history())?;
        self.store.save_production(self.production.history())
    }
}
