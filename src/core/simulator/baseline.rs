use crate::{
    core::{
        battery::Battery,
        horizon::EnergyForecast,
        plan::{Baseline, QuarterPlan},
        simulator::Simulator,
    },
    quantity::{Zero, cost::Cost, energy::KilowattHours, proportions::Percentage, time::Hours},
};

impl<F: EnergyForecast> Simulator<F> {
    /// Replay the plan's forecast and prices with plain self-use.
    ///
    /// The battery only absorbs solar surplus and only covers the load: no grid charging, no selling.
    pub fn simulate_baseline(&self, plans: &[QuarterPlan], starting_state_of_charge: Percentage) -> Baseline {
        let charge_limit = self.battery.max_charging_power * Hours::QUARTER;
        let discharge_limit = self.battery.max_discharging_power * Hours::QUARTER;
        let mut battery = Battery::new(&self.battery, starting_state_of_charge);
        let mut cost = Cost::ZERO;

        for plan in plans {
            let from_solar = plan.production.min(plan.consumption);

            let deficit = plan.consumption - from_solar;
            if deficit > KilowattHours::ZERO {
                let from_battery = battery.discharge(deficit.min(discharge_limit));
                cost += from_battery * self.battery.cycle_cost + (deficit - from_battery) * plan.buy_price;
            }

            let surplus = plan.production - from_solar;
            if surplus > KilowattHours::ZERO {
                let to_battery = battery.charge(surplus.min(charge_limit));
                cost -= (surplus - to_battery) * plan.sell_price;
            }

            battery.settle();
        }

        Baseline {
            cost,
            final_energy: battery.energy(),
            final_state_of_charge: self.battery.state_of_charge(battery.energy()),
        }
    }
}
