use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    quantity::{
        Zero,
        energy::KilowattHours,
        power::Kilowatts,
        proportions::Percentage,
        rate::KilowattHourRate,
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct BatteryParameters {
    /// Usable capacity at 100% state-of-charge.
    #[builder(default = BatteryParameters::DEFAULT_CAPACITY)]
    pub capacity: KilowattHours,

    #[builder(default = BatteryParameters::DEFAULT_MIN_STATE_OF_CHARGE)]
    pub min_state_of_charge: Percentage,

    #[builder(default = BatteryParameters::DEFAULT_MAX_STATE_OF_CHARGE)]
    pub max_state_of_charge: Percentage,

    /// Wear cost per kilowatt-hour cycled through the battery.
    #[builder(default = BatteryParameters::DEFAULT_CYCLE_COST)]
    pub cycle_cost: KilowattHourRate,

    #[builder(default = BatteryParameters::DEFAULT_POWER)]
    pub max_charging_power: Kilowatts,

    #[builder(default = BatteryParameters::DEFAULT_POWER)]
    pub max_discharging_power: Kilowatts,
}

impl Default for BatteryParameters {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BatteryParameters {
    const DEFAULT_CAPACITY: KilowattHours = KilowattHours(10.0);
    const DEFAULT_MIN_STATE_OF_CHARGE: Percentage = Percentage(30.0);
    const DEFAULT_MAX_STATE_OF_CHARGE: Percentage = Percentage(85.0);
    const DEFAULT_CYCLE_COST: KilowattHourRate = KilowattHourRate(1.0);
    const DEFAULT_POWER: Kilowatts = Kilowatts(8.0);

    /// Clamp the state-of-charge bounds into `0..=100` and keep `min <= max`.
    pub fn normalized(mut self) -> Self {
        self.min_state_of_charge = self.min_state_of_charge.clamp(Percentage::ZERO, Percentage::HUNDRED);
        self.max_state_of_charge = self.max_state_of_charge.clamp(Percentage::ZERO, Percentage::HUNDRED);
        if self.min_state_of_charge > self.max_state_of_charge {
            warn!(
                min = %self.min_state_of_charge,
                max = %self.max_state_of_charge,
                "minimum state-of-charge exceeds the maximum, swapping",
            );
            std::mem::swap(&mut self.min_state_of_charge, &mut self.max_state_of_charge);
        }
        self
    }

    /// Replace degenerate values with the defaults and normalize the bounds.
    pub fn or_defaults(mut self) -> Self {
        if !(self.capacity > KilowattHours::ZERO && self.capacity.is_finite()) {
            warn!(capacity = ?self.capacity, "invalid battery capacity, using the default");
            self.capacity = Self::DEFAULT_CAPACITY;
        }
        if !(self.max_charging_power > Kilowatts::ZERO && self.max_charging_power.is_finite()) {
            warn!(power = ?self.max_charging_power, "invalid charging power, using the default");
            self.max_charging_power = Self::DEFAULT_POWER;
        }
        if !(self.max_discharging_power > Kilowatts::ZERO && self.max_discharging_power.is_finite()) {
            warn!(power = ?self.max_discharging_power, "invalid discharging power, using the default");
            self.max_discharging_power = Self::DEFAULT_POWER;
        }
        if !(self.cycle_cost >= KilowattHourRate::ZERO && self.cycle_cost.is_finite()) {
            warn!(cycle_cost = ?self.cycle_cost, "invalid cycle cost, using the default");
            self.cycle_cost = Self::DEFAULT_CYCLE_COST;
        }
        self.normalized()
    }

    pub fn energy_at(&self, state_of_charge: Percentage) -> KilowattHours {
        self.capacity * state_of_charge.to_ratio()
    }

    pub fn state_of_charge(&self, energy: KilowattHours) -> Percentage {
        Percentage::from_ratio(energy / self.capacity)
    }

    pub fn min_energy(&self) -> KilowattHours {
        self.energy_at(self.min_state_of_charge)
    }

    pub fn max_energy(&self) -> KilowattHours {
        self.energy_at(self.max_state_of_charge)
    }
}

/// Battery energy accumulator for a single simulation run.
#[derive(Copy, Clone, Debug)]
pub struct Battery {
    energy: KilowattHours,
    min_energy: KilowattHours,
    max_energy: KilowattHours,
}

impl Battery {
    pub fn new(parameters: &BatteryParameters, state_of_charge: Percentage) -> Self {
        Self {
            energy: parameters.energy_at(state_of_charge),
            min_energy: parameters.min_energy(),
            max_energy: parameters.max_energy(),
        }
    }

    pub const fn energy(&self) -> KilowattHours {
        self.energy
    }

    /// Energy that may be discharged before hitting the minimum.
    pub fn available(&self) -> KilowattHours {
        (self.energy - self.min_energy).max(KilowattHours::ZERO)
    }

    /// Energy that may be charged before hitting the maximum.
    pub fn headroom(&self) -> KilowattHours {
        (self.max_energy - self.energy).max(KilowattHours::ZERO)
    }

    /// Discharge up to the requested energy and return the actual amount.
    ///
    /// Flows below [`KilowattHours::MIN_ORDER`] are not executed.
    pub fn discharge(&mut self, requested: KilowattHours) -> KilowattHours {
        let actual = requested.min(self.available());
        if actual < KilowattHours::MIN_ORDER {
            return KilowattHours::ZERO;
        }
        self.energy -= actual;
        actual
    }

    /// Charge up to the requested energy and return the actual amount.
    pub fn charge(&mut self, requested: KilowattHours) -> KilowattHours {
        let actual = requested.min(self.headroom());
        if actual < KilowattHours::MIN_ORDER {
            return KilowattHours::ZERO;
        }
        self.energy += actual;
        actual
    }

    /// Pull the energy back into the allowed bounds.
    pub fn settle(&mut self) {
        self.energy = self.energy.clamp(self.min_energy, self.max_energy);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn defaults() {
        let parameters = BatteryParameters::default();
        assert_eq!(parameters.capacity, KilowattHours(10.0));
        assert_abs_diff_eq!(parameters.min_energy().0, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(parameters.max_energy().0, 8.5, epsilon = 1e-9);
    }

    #[test]
    fn normalized_swaps_and_clamps() {
        let parameters = BatteryParameters::builder()
            .min_state_of_charge(Percentage(120.0))
            .max_state_of_charge(Percentage(40.0))
            .build()
            .normalized();
        assert_eq!(parameters.min_state_of_charge, Percentage(40.0));
        assert_eq!(parameters.max_state_of_charge, Percentage::HUNDRED);
    }

    #[test]
    fn or_defaults_replaces_degenerate_values() {
        let parameters = BatteryParameters::builder()
            .capacity(KilowattHours::ZERO)
            .max_charging_power(Kilowatts(-1.0))
            .max_discharging_power(Kilowatts(f64::NAN))
            .build()
            .or_defaults();
        assert_eq!(parameters, BatteryParameters::default());
    }

    #[test]
    fn discharge_stops_at_minimum() {
        let parameters = BatteryParameters::default();
        let mut battery = Battery::new(&parameters, Percentage(40.0));
        assert_abs_diff_eq!(battery.discharge(KilowattHours(5.0)).0, 1.0, epsilon = 1e-9);
        assert_eq!(battery.discharge(KilowattHours(1.0)), KilowattHours::ZERO);
        assert_abs_diff_eq!(battery.energy().0, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn tiny_flows_are_suppressed() {
        let mut battery = Battery::new(&BatteryParameters::default(), Percentage(50.0));
        assert_eq!(battery.charge(KilowattHours(0.005)), KilowattHours::ZERO);
        assert_eq!(battery.discharge(KilowattHours(0.009)), KilowattHours::ZERO);
        assert_abs_diff_eq!(battery.energy().0, 5.0, epsilon = 1e-9);
    }
}
