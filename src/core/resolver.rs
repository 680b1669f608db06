use std::time::{Duration, Instant};

use bon::bon;
use chrono::{NaiveDate, NaiveDateTime};

use crate::{
    core::{
        battery::BatteryParameters,
        decision::{Decision, Reason},
        horizon::{EnergyForecast, horizon_index},
        plan::{PlanSummary, QuarterPlan},
        prices::PriceCurve,
        simulator::Simulator,
    },
    prelude::*,
    quantity::{Zero, cost::Cost, proportions::Percentage},
};

/// Dispatch decision for the current quarter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    pub reason: Reason,

    /// Start of the resolved quarter, if it is covered by the plan.
    pub quarter_start: Option<NaiveDateTime>,

    /// Savings of the resolved quarter versus buying everything from the grid.
    pub expected_savings: Cost,
}

impl Resolution {
    const fn without_plan(decision: Decision, reason: Reason) -> Self {
        Self { decision, reason, quarter_start: None, expected_savings: Cost::ZERO }
    }
}

struct CachedPlan {
    computed_at: Instant,
    first_day: NaiveDate,
    plans: Vec<QuarterPlan>,
    summary: PlanSummary,
}

impl CachedPlan {
    fn find(&self, index: usize) -> Option<&QuarterPlan> {
        self.plans.iter().find(|plan| plan.index == index)
    }
}

/// Caching facade over the simulator.
pub struct Resolver {
    enabled: bool,
    battery: BatteryParameters,
    ttl: Duration,
    cached: Option<CachedPlan>,
}

#[bon]
impl Resolver {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    #[builder]
    pub fn new(
        #[builder(default)] enabled: bool,
        battery: BatteryParameters,
        #[builder(default = Resolver::DEFAULT_TTL)] ttl: Duration,
    ) -> Self {
        Self { enabled, battery, ttl, cached: None }
    }

    /// Resolve the decision for the quarter containing `now`.
    ///
    /// The plan is recomputed when the cached one is older than the TTL, was built for another
    /// price curve, does not cover the quarter, or when `force_refresh` is set.
    #[builder]
    #[instrument(skip_all, fields(now = %now, force_refresh = force_refresh))]
    pub fn resolve<F: EnergyForecast>(
        &mut self,
        forecast: F,
        prices: Option<&PriceCurve>,
        state_of_charge: Percentage,
        now: NaiveDateTime,
        #[builder(default = Instant::now())] instant: Instant,
        #[builder(default)] force_refresh: bool,
    ) -> Resolution {
        if !self.enabled {
            return Resolution::without_plan(Decision::SelfUse, Reason::Disabled);
        }
        let Some(prices) = prices else {
            warn!("no price data");
            return Resolution::without_plan(Decision::Unknown, Reason::NoPriceData);
        };
        let Some(index) = horizon_index(prices.first_day(), now).filter(|index| *index < prices.len())
        else {
            warn!(first_day = %prices.first_day(), "stale price data");
            return Resolution::without_plan(Decision::Unknown, Reason::NoPriceData);
        };

        let is_fresh = self.cached.as_ref().is_some_and(|cached| {
            instant.saturating_duration_since(cached.computed_at) < self.ttl
                && cached.first_day == prices.first_day()
                && cached.find(index).is_some()
        });
        if force_refresh || !is_fresh {
            let simulator = Simulator::builder().forecast(forecast).battery(self.battery).build();
            let plans = simulator.simulate(state_of_charge, prices, now);
            let summary = simulator.summarize(&plans, state_of_charge);
            info!(n_quarters = plans.len(), total_savings = %summary.total_savings, "refreshed the plan");
            self.cached =
                Some(CachedPlan { computed_at: instant, first_day: prices.first_day(), plans, summary });
        } else {
            debug!("using the cached plan");
        }

        self.cached
            .as_ref()
            .and_then(|cached| cached.find(index))
            .map_or(Resolution::without_plan(Decision::Unknown, Reason::OutsideHorizon), |plan| {
                Resolution {
                    decision: plan.decision,
                    reason: plan.reason,
                    quarter_start: Some(plan.start),
                    expected_savings: plan.savings_vs_grid,
                }
            })
    }
}

impl Resolver {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Latest plan, empty when nothing has been resolved yet.
    #[must_use]
    pub fn plans(&self) -> &[QuarterPlan] {
        self.cached.as_ref().map_or(&[], |cached| cached.plans.as_slice())
    }

    #[must_use]
    pub fn summary(&self) -> Option<&PlanSummary> {
        self.cached.as_ref().map(|cached| &cached.summary)
    }

    /// Cached decision for the horizon index, without recomputing.
    #[must_use]
    pub fn decision_for(&self, index: usize) -> (Decision, Reason) {
        self.cached
            .as_ref()
            .and_then(|cached| cached.find(index))
            .map_or((Decision::Unknown, Reason::OutsideHorizon), |plan| (plan.decision, plan.reason))
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

/// Tracks what has been sent to the inverter.
#[derive(Default)]
pub struct Actuator {
    last_sent: Option<(NaiveDateTime, Decision)>,
}

impl Actuator {
    /// Whether the decision must be sent, and remember it if so.
    ///
    /// A decision is sent when the quarter changes or the decision differs from the last sent one.
    /// [`Decision::Unknown`] is never sent.
    pub fn should_send(&mut self, resolution: &Resolution) -> bool {
        let Some(quarter_start) = resolution.quarter_start else {
            return false;
        };
        if resolution.decision == Decision::Unknown {
            return false;
        }
        let command = (quarter_start, resolution.decision);
        if self.last_sent == Some(command) {
            return false;
        }
        self.last_sent = Some(command);
        true
    }
}
