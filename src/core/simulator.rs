mod baseline;
mod outlook;

use chrono::NaiveDateTime;
use itertools::Itertools;

pub use self::outlook::{Outlook, QuarterForecast};
use crate::{
    core::{
        battery::{Battery, BatteryParameters},
        decision::{Decision, Reason},
        horizon::{EnergyForecast, HorizonQuarter, horizon_index},
        plan::{PlanSummary, QuarterPlan},
        prices::PriceCurve,
        simulator::outlook::build_outlooks,
    },
    prelude::*,
    quantity::{
        Zero,
        cost::Cost,
        energy::KilowattHours,
        proportions::Percentage,
        rate::KilowattHourRate,
        time::Hours,
    },
};

/// Production below this is treated as no production at all.
const NEGLIGIBLE_PRODUCTION: KilowattHours = KilowattHours(0.1);

/// Selling within this fraction of the best remaining sell price is good enough.
const BEST_SELL_FRACTION: f64 = 0.9;

/// Buying within this factor of the cheapest remaining buy price is a cheap window.
const CHEAP_WINDOW_FACTOR: f64 = 1.1;

/// Required arbitrage margin, relative to the buy price.
const ARBITRAGE_MARGIN: f64 = 0.15;

/// Required battery energy above the reserve before selling, relative to the reserve.
const DISCHARGE_RESERVE_FACTOR: f64 = 1.2;

/// Expected remaining consumption overshoot before charging in a cheap window.
const CONSUMPTION_MARGIN: f64 = 1.2;

/// Quarter-by-quarter greedy dispatch over the price horizon.
#[derive(bon::Builder)]
pub struct Simulator<F> {
    forecast: F,
    battery: BatteryParameters,
}

impl<F: EnergyForecast> Simulator<F> {
    /// Simulate every quarter from the current one till the end of the price curve.
    #[instrument(skip_all, fields(state_of_charge = %state_of_charge, now = %now))]
    pub fn simulate(
        &self,
        state_of_charge: Percentage,
        prices: &PriceCurve,
        now: NaiveDateTime,
    ) -> Vec<QuarterPlan> {
        let Some(current_index) =
            horizon_index(prices.first_day(), now).filter(|index| *index < prices.len())
        else {
            warn!(first_day = %prices.first_day(), n_quarters = prices.len(), "now is outside the price curve");
            return Vec::new();
        };
        let forecasts = (current_index..prices.len())
            .map(|index| {
                let quarter = HorizonQuarter::new(prices.first_day(), index, current_index);
                QuarterForecast {
                    quarter,
                    production: self.forecast.production(&quarter).max(KilowattHours::ZERO),
                    consumption: self.forecast.consumption(&quarter).max(KilowattHours::ZERO),
                    spot_price: prices.spot(index),
                    buy_price: prices.buy_price(index),
                    sell_price: prices.sell_price(index),
                }
            })
            .collect_vec();
        let outlooks = build_outlooks(&forecasts);
        let mut battery = Battery::new(&self.battery, state_of_charge);
        let plans = forecasts
            .iter()
            .zip(&outlooks)
            .map(|(forecast, outlook)| self.dispatch(forecast, outlook, &mut battery))
            .collect_vec();
        debug!(
            n_quarters = plans.len(),
            final_energy = %battery.energy(),
            "simulated",
        );
        plans
    }

    #[expect(clippy::too_many_lines)]
    fn dispatch(
        &self,
        forecast: &QuarterForecast,
        outlook: &Outlook,
        battery: &mut Battery,
    ) -> QuarterPlan {
        let cycle_cost = self.battery.cycle_cost;
        let buy_price = forecast.buy_price;
        let sell_price = forecast.sell_price;
        let charge_limit = self.battery.max_charging_power * Hours::QUARTER;
        let discharge_limit = self.battery.max_discharging_power * Hours::QUARTER;

        let battery_before = battery.energy();
        let state_of_charge_before = self.battery.state_of_charge(battery_before);
        let mut decision = Decision::SelfUse;
        let mut reason = Reason::SolarCoversLoad;
        let mut cost = Cost::ZERO;

        // Serve the consumption:
        let from_solar = forecast.production.min(forecast.consumption);
        let deficit = forecast.consumption - from_solar;
        let mut from_battery = KilowattHours::ZERO;
        let mut from_grid = KilowattHours::ZERO;
        if deficit > KilowattHours::ZERO {
            let should_hold = cycle_cost < buy_price
                && buy_price < outlook.mean_buy_price
                && outlook.max_buy_price - buy_price - cycle_cost > KilowattHourRate::ZERO
                && outlook.has_deficit()
                && battery.available() > KilowattHours::ZERO;
            if should_hold {
                decision = Decision::HoldBattery;
                reason = Reason::HoldForPricierQuarter;
            } else if cycle_cost < buy_price {
                from_battery = battery.discharge(deficit.min(discharge_limit));
            }
            from_grid = deficit - from_battery;
            if !should_hold {
                reason = if from_battery == KilowattHours::ZERO {
                    Reason::GridCheaperThanBattery
                } else if from_grid > KilowattHours::ZERO {
                    Reason::BatteryPartiallyCovers
                } else {
                    Reason::BatteryCheaperThanGrid
                };
            }
            cost += from_battery * cycle_cost + from_grid * buy_price;
        }

        // Allocate the surplus:
        let surplus = forecast.production - from_solar;
        let mut to_battery = KilowattHours::ZERO;
        let mut to_grid = KilowattHours::ZERO;
        if surplus > KilowattHours::ZERO {
            let worth_storing = sell_price < cycle_cost + outlook.min_buy_price;
            let worth_selling = sell_price > cycle_cost
                || sell_price >= outlook.max_sell_price * BEST_SELL_FRACTION;
            if (worth_storing && battery.headroom() > KilowattHours::ZERO) || !worth_selling {
                to_battery = battery.charge(surplus.min(charge_limit));
            }
            to_grid = surplus - to_battery;
            cost -= to_grid * sell_price;
            reason = if to_battery > KilowattHours::ZERO {
                Reason::StoringSurplus
            } else {
                Reason::SellingSurplus
            };
        }

        // Charge from the grid when it pays off later:
        let mut grid_to_battery = KilowattHours::ZERO;
        if battery.headroom() > KilowattHours::ZERO {
            let is_cheap_window = buy_price <= outlook.min_buy_price * CHEAP_WINDOW_FACTOR
                && buy_price + cycle_cost * 2.0 < outlook.max_buy_price
                && outlook.consumption * CONSUMPTION_MARGIN > outlook.production;
            let is_arbitrage = outlook.max_sell_price - buy_price - cycle_cost * 2.0
                > buy_price * ARBITRAGE_MARGIN;
            if is_cheap_window || is_arbitrage {
                grid_to_battery = battery.charge(charge_limit - to_battery);
                if grid_to_battery > KilowattHours::ZERO {
                    cost += grid_to_battery * (buy_price + cycle_cost);
                    decision = Decision::ChargeFromGrid;
                    reason = if is_arbitrage { Reason::Arbitrage } else { Reason::CheapGridWindow };
                }
            }
        }

        // Sell the excess battery energy at the peak:
        let mut battery_to_grid = KilowattHours::ZERO;
        if decision == Decision::SelfUse && surplus == KilowattHours::ZERO {
            let reserve = self.battery.min_energy() + outlook.deficit();
            let should_sell = battery.energy() > reserve * DISCHARGE_RESERVE_FACTOR
                && sell_price >= outlook.max_sell_price * BEST_SELL_FRACTION
                && sell_price > outlook.mean_buy_price
                && sell_price > cycle_cost;
            if should_sell {
                let excess = battery.energy() - reserve;
                battery_to_grid = battery.discharge(excess.min(discharge_limit - from_battery));
                if battery_to_grid > KilowattHours::ZERO {
                    to_grid += battery_to_grid;
                    cost += battery_to_grid * cycle_cost - battery_to_grid * sell_price;
                    decision = Decision::DischargeToGrid;
                    reason = Reason::SellingAtPeak;
                }
            }
        }

        if decision == Decision::SelfUse
            && forecast.production < NEGLIGIBLE_PRODUCTION
            && outlook.has_surplus()
            && state_of_charge_before < self.battery.max_state_of_charge
        {
            decision = Decision::HoldBattery;
            reason = Reason::WaitingForSolar;
        }

        battery.settle();
        trace!(
            index = forecast.quarter.index,
            ?decision,
            ?reason,
            before = %battery_before,
            after = %battery.energy(),
            cost = %cost,
        );

        QuarterPlan {
            index: forecast.quarter.index,
            start: forecast.quarter.start,
            production: forecast.production,
            consumption: forecast.consumption,
            battery_before,
            state_of_charge_before,
            battery_after: battery.energy(),
            from_solar,
            from_battery,
            from_grid,
            to_battery,
            to_grid,
            grid_to_battery,
            battery_to_grid,
            spot_price: forecast.spot_price,
            buy_price,
            sell_price,
            cost,
            savings_vs_grid: forecast.consumption * buy_price - cost,
            decision,
            reason,
        }
    }

    /// Aggregate the plan and compare it against the baseline strategy.
    #[instrument(skip_all)]
    pub fn summarize(&self, plans: &[QuarterPlan], starting_state_of_charge: Percentage) -> PlanSummary {
        let baseline = self.simulate_baseline(plans, starting_state_of_charge);
        let final_energy = plans
            .last()
            .map_or_else(|| self.battery.energy_at(starting_state_of_charge), |plan| plan.battery_after);
        let mean_buy_price = if plans.is_empty() {
            KilowattHourRate::ZERO
        } else {
            #[expect(clippy::cast_precision_loss)]
            let n_quarters = plans.len() as f64;
            plans.iter().map(|plan| plan.buy_price).sum::<KilowattHourRate>() / n_quarters
        };
        let total_cost: Cost = plans.iter().map(|plan| plan.cost).sum();
        let battery_value_adjustment = (final_energy - baseline.final_energy) * mean_buy_price;
        let summary = PlanSummary {
            n_quarters: plans.len(),
            total_production: plans.iter().map(|plan| plan.production).sum(),
            total_consumption: plans.iter().map(|plan| plan.consumption).sum(),
            total_from_solar: plans.iter().map(|plan| plan.from_solar).sum(),
            total_from_battery: plans.iter().map(|plan| plan.from_battery).sum(),
            total_from_grid: plans.iter().map(|plan| plan.from_grid).sum(),
            total_to_battery: plans.iter().map(|plan| plan.to_battery).sum(),
            total_to_grid: plans.iter().map(|plan| plan.to_grid).sum(),
            total_grid_to_battery: plans.iter().map(|plan| plan.grid_to_battery).sum(),
            total_battery_to_grid: plans.iter().map(|plan| plan.battery_to_grid).sum(),
            total_cost,
            total_savings_vs_grid: plans.iter().map(|plan| plan.savings_vs_grid).sum(),
            final_state_of_charge: self.battery.state_of_charge(final_energy),
            baseline,
            battery_value_adjustment,
            total_savings: (baseline.cost - total_cost) + battery_value_adjustment,
        };
        debug!(
            total_cost = %summary.total_cost,
            baseline_cost = %summary.baseline.cost,
            total_savings = %summary.total_savings,
            "summarized",
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        core::prices::RetailCoefficients,
        quantity::{power::Kilowatts, rate::KilowattHourRate},
    };

    struct FixedForecast {
        production: Vec<f64>,
        consumption: Vec<f64>,
    }

    impl EnergyForecast for FixedForecast {
        fn consumption(&self, quarter: &HorizonQuarter) -> KilowattHours {
            KilowattHours(self.consumption.get(quarter.index).copied().unwrap_or_default())
        }

        fn production(&self, quarter: &HorizonQuarter) -> KilowattHours {
            KilowattHours(self.production.get(quarter.index).copied().unwrap_or_default())
        }
    }

    fn first_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    fn midnight() -> NaiveDateTime {
        first_day().and_hms_opt(0, 0, 0).unwrap()
    }

    fn battery(cycle_cost: f64) -> BatteryParameters {
        BatteryParameters::builder()
            .capacity(KilowattHours(10.0))
            .min_state_of_charge(Percentage(10.0))
            .max_state_of_charge(Percentage(95.0))
            .cycle_cost(KilowattHourRate(cycle_cost))
            .max_charging_power(Kilowatts(12.0))
            .max_discharging_power(Kilowatts(8.0))
            .build()
    }

    /// Buy price follows the spot price, sell price is flat.
    fn curve(spot: &[f64], sell: f64) -> PriceCurve {
        let retail = RetailCoefficients {
            buy_multiplier: 1.0,
            buy_offset: KilowattHourRate::ZERO,
            sell_multiplier: 0.0,
            sell_offset: KilowattHourRate(sell),
        };
        PriceCurve::try_new(first_day(), "EUR", spot.iter().copied().map(KilowattHourRate).collect(), retail)
            .unwrap()
    }

    #[test]
    fn battery_serves_load_under_flat_prices() {
        let forecast = FixedForecast { production: vec![0.0; 4], consumption: vec![2.0, 0.0, 0.0, 0.0] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let plans = simulator.simulate(Percentage(50.0), &curve(&[5.0; 4], 2.0), midnight());
        assert_eq!(plans.len(), 4);

        let plan = &plans[0];
        assert_eq!(plan.decision, Decision::SelfUse);
        assert_eq!(plan.reason, Reason::BatteryCheaperThanGrid);
        assert_abs_diff_eq!(plan.from_battery.0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plan.from_grid.0, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plan.cost.0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plan.savings_vs_grid.0, 8.0, epsilon = 1e-9);

        let summary = simulator.summarize(&plans, Percentage(50.0));
        assert_abs_diff_eq!(summary.total_savings.0, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn battery_is_held_for_expensive_quarter() {
        let forecast = FixedForecast {
            production: vec![0.0; 8],
            consumption: vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0],
        };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let spot = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 15.0];
        let plans = simulator.simulate(Percentage(95.0), &curve(&spot, 2.0), midnight());

        assert_eq!(plans[0].decision, Decision::HoldBattery);
        assert_eq!(plans[0].reason, Reason::HoldForPricierQuarter);
        assert_abs_diff_eq!(plans[0].from_grid.0, 1.0, epsilon = 1e-9);
        assert_eq!(plans[0].from_battery, KilowattHours::ZERO);

        assert_abs_diff_eq!(plans[7].from_battery.0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plans[7].battery_after.0, 7.5, epsilon = 1e-9);

        let summary = simulator.summarize(&plans, Percentage(95.0));
        assert_abs_diff_eq!(summary.total_cost.0, 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.baseline.cost.0, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.baseline.final_energy.0, 6.5, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.battery_value_adjustment.0, 6.25, epsilon = 1e-9);
        assert_abs_diff_eq!(summary.total_savings.0, 2.25, epsilon = 1e-9);
    }

    #[test]
    fn cheap_surplus_is_stored() {
        let forecast = FixedForecast { production: vec![3.0], consumption: vec![0.0] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(2.0)).build();
        let plans = simulator.simulate(Percentage(45.0), &curve(&[4.0], 1.0), midnight());

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].decision, Decision::SelfUse);
        assert_eq!(plans[0].reason, Reason::StoringSurplus);
        assert_abs_diff_eq!(plans[0].to_battery.0, 3.0, epsilon = 1e-9);
        assert_eq!(plans[0].to_grid, KilowattHours::ZERO);
        assert_abs_diff_eq!(plans[0].battery_after.0, 7.5, epsilon = 1e-9);
    }

    #[test]
    fn surplus_is_sold_at_good_price() {
        let forecast = FixedForecast { production: vec![3.0], consumption: vec![0.0] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let plans = simulator.simulate(Percentage(45.0), &curve(&[4.0], 6.0), midnight());

        assert_eq!(plans[0].reason, Reason::SellingSurplus);
        assert_abs_diff_eq!(plans[0].to_grid.0, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plans[0].cost.0, -18.0, epsilon = 1e-9);
    }

    #[test]
    fn arbitrage_charges_from_grid() {
        let forecast = FixedForecast { production: vec![0.0; 2], consumption: vec![0.0; 2] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let retail = RetailCoefficients {
            buy_multiplier: 1.0,
            buy_offset: KilowattHourRate::ZERO,
            sell_multiplier: 1.0,
            sell_offset: KilowattHourRate::ZERO,
        };
        let prices = PriceCurve::try_new(
            first_day(),
            "EUR",
            vec![KilowattHourRate(1.0), KilowattHourRate(10.0)],
            retail,
        )
        .unwrap();
        let plans = simulator.simulate(Percentage(50.0), &prices, midnight());

        assert_eq!(plans[0].decision, Decision::ChargeFromGrid);
        assert_eq!(plans[0].reason, Reason::Arbitrage);
        assert_abs_diff_eq!(plans[0].grid_to_battery.0, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plans[0].cost.0, 6.0, epsilon = 1e-9);
        assert_eq!(plans[0].from_grid, KilowattHours::ZERO);
    }

    #[test]
    fn sells_battery_at_peak() {
        let forecast = FixedForecast { production: vec![0.0; 2], consumption: vec![0.0; 2] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let retail = RetailCoefficients {
            buy_multiplier: 0.0,
            buy_offset: KilowattHourRate(5.0),
            sell_multiplier: 1.0,
            sell_offset: KilowattHourRate::ZERO,
        };
        let prices = PriceCurve::try_new(
            first_day(),
            "EUR",
            vec![KilowattHourRate(8.0), KilowattHourRate(2.0)],
            retail,
        )
        .unwrap();
        let plans = simulator.simulate(Percentage(90.0), &prices, midnight());

        assert_eq!(plans[0].decision, Decision::DischargeToGrid);
        assert_abs_diff_eq!(plans[0].battery_to_grid.0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plans[0].to_grid.0, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plans[0].cost.0, -14.0, epsilon = 1e-9);
    }

    #[test]
    fn holds_for_upcoming_solar() {
        let forecast = FixedForecast { production: vec![0.0, 3.0], consumption: vec![0.0; 2] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let plans = simulator.simulate(Percentage(50.0), &curve(&[5.0; 2], 2.0), midnight());
        assert_eq!(plans[0].decision, Decision::HoldBattery);
        assert_eq!(plans[0].reason, Reason::WaitingForSolar);
    }

    #[test]
    fn tiny_battery_flows_are_suppressed() {
        let forecast = FixedForecast { production: vec![0.0], consumption: vec![0.005] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let plans = simulator.simulate(Percentage(50.0), &curve(&[5.0], 2.0), midnight());
        assert_eq!(plans[0].from_battery, KilowattHours::ZERO);
        assert_abs_diff_eq!(plans[0].from_grid.0, 0.005, epsilon = 1e-9);
    }

    #[test]
    fn starts_at_current_quarter() {
        let forecast = FixedForecast { production: vec![], consumption: vec![] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let now = first_day().and_hms_opt(23, 50, 0).unwrap();
        let plans = simulator.simulate(Percentage(50.0), &curve(&[5.0; 192], 2.0), now);
        assert_eq!(plans.len(), 97);
        assert_eq!(plans[0].index, 95);
        assert!(!plans[0].is_tomorrow());
        assert!(plans[1].is_tomorrow());
    }

    #[test]
    fn empty_outside_horizon() {
        let forecast = FixedForecast { production: vec![], consumption: vec![] };
        let simulator = Simulator::builder().forecast(forecast).battery(battery(1.0)).build();
        let now = first_day().succ_opt().unwrap().and_hms_opt(0, 0, 0).unwrap();
        let plans = simulator.simulate(Percentage(50.0), &curve(&[5.0; 96], 2.0), now);
        assert!(plans.is_empty());
        let summary = simulator.summarize(&plans, Percentage(50.0));
        assert_eq!(summary.total_cost, Cost::ZERO);
        assert_eq!(summary.total_savings, Cost::ZERO);
    }

    /// Daily shapes with solar surplus around noon and an evening price peak.
    fn realistic_simulator() -> (Simulator<FixedForecast>, PriceCurve) {
        let production = (0..192)
            .map(|index| {
                let hour = (index % 96) as f64 / 4.0;
                (std::f64::consts::PI * (hour - 6.0) / 14.0).sin().max(0.0) * 1.5
            })
            .collect();
        let consumption = (0..192).map(|index| if (68..84).contains(&(index % 96)) { 0.9 } else { 0.3 }).collect();
        let spot = (0..192)
            .map(|index| {
                let hour = (index % 96) as f64 / 4.0;
                KilowattHourRate(3.0 + 2.0 * (std::f64::consts::PI * (hour - 12.0) / 12.0).cos())
            })
            .collect();
        let prices = PriceCurve::try_new(first_day(), "EUR", spot, RetailCoefficients::default()).unwrap();
        let simulator = Simulator::builder()
            .forecast(FixedForecast { production, consumption })
            .battery(BatteryParameters::default())
            .build();
        (simulator, prices)
    }

    #[test]
    fn energy_is_conserved() {
        let (simulator, prices) = realistic_simulator();
        let plans = simulator.simulate(Percentage(50.0), &prices, midnight());
        assert_eq!(plans.len(), 192);
        let parameters = BatteryParameters::default();
        for plan in &plans {
            assert_abs_diff_eq!(
                (plan.from_solar + plan.from_battery + plan.from_grid).0,
                plan.consumption.0,
                epsilon = 1e-9,
            );
            assert!((plan.to_battery + plan.to_grid).0 <= (plan.production + plan.battery_to_grid).0 + 1e-9);
            assert!(plan.battery_after.0 >= parameters.min_energy().0 - 1e-9);
            assert!(plan.battery_after.0 <= parameters.max_energy().0 + 1e-9);
        }
        for (previous, next) in plans.iter().tuple_windows() {
            assert_eq!(previous.battery_after, next.battery_before);
        }
    }

    #[test]
    fn simulation_is_idempotent() {
        let (simulator, prices) = realistic_simulator();
        let first = simulator.simulate(Percentage(50.0), &prices, midnight());
        let second = simulator.simulate(Percentage(50.0), &prices, midnight());
        assert_eq!(first, second);
        assert_eq!(simulator.summarize(&first, Percentage(50.0)), simulator.summarize(&second, Percentage(50.0)));
    }
}
