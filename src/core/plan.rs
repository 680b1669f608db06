use std::fmt::{Display, Formatter};

use chrono::NaiveDateTime;
use comfy_table::{Cell, CellAlignment, Color, Table, modifiers, presets};
use serde::Serialize;

use crate::{
    core::{
        decision::{Decision, Reason},
        horizon::QUARTERS_PER_DAY,
    },
    quantity::{
        Zero,
        cost::Cost,
        energy::KilowattHours,
        proportions::Percentage,
        rate::KilowattHourRate,
    },
};

/// Simulated dispatch of a single quarter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuarterPlan {
    /// Position within the price curve.
    pub index: usize,

    pub start: NaiveDateTime,

    pub production: KilowattHours,
    pub consumption: KilowattHours,

    pub battery_before: KilowattHours,
    pub state_of_charge_before: Percentage,
    pub battery_after: KilowattHours,

    /// Solar energy consumed directly by the load.
    pub from_solar: KilowattHours,

    /// Battery energy consumed by the load.
    pub from_battery: KilowattHours,

    /// Grid energy consumed by the load.
    pub from_grid: KilowattHours,

    /// Solar surplus stored in the battery.
    pub to_battery: KilowattHours,

    /// Total export, including [`QuarterPlan::battery_to_grid`].
    pub to_grid: KilowattHours,

    /// Forced charging from the grid.
    pub grid_to_battery: KilowattHours,

    /// Forced discharging into the grid.
    pub battery_to_grid: KilowattHours,

    pub spot_price: KilowattHourRate,
    pub buy_price: KilowattHourRate,
    pub sell_price: KilowattHourRate,

    /// Net cost of the quarter, negative when it earns.
    pub cost: Cost,

    /// Versus buying the whole consumption from the grid.
    pub savings_vs_grid: Cost,

    pub decision: Decision,
    pub reason: Reason,
}

impl QuarterPlan {
    #[must_use]
    pub const fn is_tomorrow(&self) -> bool {
        self.index >= QUARTERS_PER_DAY
    }

    /// Energy bought from the grid, both for the load and for the battery.
    pub fn grid_import(&self) -> KilowattHours {
        self.from_grid + self.grid_to_battery
    }
}

/// Outcome of the battery-less-strategy replay over the same forecast.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Baseline {
    pub cost: Cost,
    pub final_energy: KilowattHours,
    pub final_state_of_charge: Percentage,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub n_quarters: usize,

    pub total_production: KilowattHours,
    pub total_consumption: KilowattHours,
    pub total_from_solar: KilowattHours,
    pub total_from_battery: KilowattHours,
    pub total_from_grid: KilowattHours,
    pub total_to_battery: KilowattHours,
    pub total_to_grid: KilowattHours,
    pub total_grid_to_battery: KilowattHours,
    pub total_battery_to_grid: KilowattHours,

    /// Net cost of the plan.
    pub total_cost: Cost,

    /// Sum of the per-quarter savings versus buying everything from the grid.
    pub total_savings_vs_grid: Cost,

    pub final_state_of_charge: Percentage,

    /// Plain self-use over the same forecast, used as the reference.
    pub baseline: Baseline,

    /// Difference in the final battery energy, valued at the mean buy price.
    pub battery_value_adjustment: Cost,

    pub total_savings: Cost,
}

impl PlanSummary {
    /// Cost savings alone, without the battery value adjustment.
    pub fn cost_savings(&self) -> Cost {
        self.baseline.cost - self.total_cost
    }
}

impl Display for PlanSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
            .enforce_styling()
            .set_header(vec![
                "Production",
                "Consumption",
                "Grid import",
                "Grid export",
                "Cost",
                "Baseline",
                "Final SoC",
                "Cost savings",
                "Adjustment",
                "Savings",
            ])
            .add_row(vec![
                Cell::new(self.total_production).set_alignment(CellAlignment::Right),
                Cell::new(self.total_consumption).set_alignment(CellAlignment::Right),
                Cell::new(self.total_from_grid + self.total_grid_to_battery)
                    .set_alignment(CellAlignment::Right),
                Cell::new(self.total_to_grid).set_alignment(CellAlignment::Right),
                Cell::new(self.total_cost).set_alignment(CellAlignment::Right),
                Cell::new(self.baseline.cost).set_alignment(CellAlignment::Right),
                Cell::new(self.final_state_of_charge).set_alignment(CellAlignment::Right),
                Cell::new(self.cost_savings()).set_alignment(CellAlignment::Right),
                Cell::new(self.battery_value_adjustment).set_alignment(CellAlignment::Right),
                Cell::new(self.total_savings).set_alignment(CellAlignment::Right).fg(
                    if self.total_savings >= Cost::ZERO { Color::Green } else { Color::Red },
                ),
            ]);
        write!(f, "{table}")
    }
}
