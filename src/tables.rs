use chrono::{NaiveDateTime, Timelike};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    core::{
        decision::{Decision, Reason},
        horizon::{day_of_week, month_of_year},
        plan::QuarterPlan,
        resolver::Resolution,
    },
    forecast::{consumption::ConsumptionPredictor, production::ProductionPredictor},
    quantity::{Zero, cost::Cost, energy::{KilowattHours, WattHours}, rate::KilowattHourRate},
};

const HOURS_PER_DAY: usize = 24;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

pub fn build_plan_table(plans: &[QuarterPlan]) -> Table {
    let mean_buy_price = if plans.is_empty() {
        KilowattHourRate::ZERO
    } else {
        #[expect(clippy::cast_precision_loss)]
        let n_quarters = plans.len() as f64;
        plans.iter().map(|plan| plan.buy_price).sum::<KilowattHourRate>() / n_quarters
    };

    let mut table = new_table();
    table.set_header(vec![
        "Date", "Start", "Buy", "Sell", "Solar", "Load", "Mode", "Before", "After", "Import",
        "Export", "Cost", "Reason",
    ]);
    for plan in plans {
        table.add_row(vec![
            Cell::new(plan.start.format("%b %d")).add_attribute(if plan.is_tomorrow() {
                Attribute::Bold
            } else {
                Attribute::Dim
            }),
            Cell::new(plan.start.format("%H:%M")),
            Cell::new(plan.buy_price).fg(if plan.buy_price >= mean_buy_price {
                Color::Red
            } else {
                Color::Green
            }),
            Cell::new(plan.sell_price).add_attribute(Attribute::Dim),
            Cell::new(plan.production).set_alignment(CellAlignment::Right),
            Cell::new(plan.consumption).set_alignment(CellAlignment::Right),
            Cell::new(plan.decision).fg(plan.decision.color()),
            Cell::new(plan.state_of_charge_before)
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            Cell::new(plan.battery_after).set_alignment(CellAlignment::Right),
            Cell::new(plan.grid_import()).set_alignment(CellAlignment::Right).fg(
                if plan.grid_import() >= KilowattHours::MIN_ORDER {
                    Color::Red
                } else {
                    Color::Green
                },
            ),
            Cell::new(plan.to_grid).set_alignment(CellAlignment::Right),
            Cell::new(plan.cost)
                .set_alignment(CellAlignment::Right)
                .fg(if plan.cost > Cost::ZERO { Color::Red } else { Color::Green }),
            Cell::new(plan.reason).add_attribute(Attribute::Dim),
        ]);
    }
    table
}

/// Hourly consumption and production from the current hour till midnight.
pub fn build_forecast_table(
    consumption: &ConsumptionPredictor,
    production: &ProductionPredictor,
    now: NaiveDateTime,
) -> Table {
    let day = day_of_week(&now);
    let month = month_of_year(&now);

    let mut table = new_table();
    table.set_header(vec!["Hour", "Consumption", "Production", "Net"]);
    for hour in (now.hour() as usize)..HOURS_PER_DAY {
        let consumed = consumption.predict_hourly(day, hour, now);
        let produced = production.predict_hourly(month, hour);
        let net = produced - consumed;
        table.add_row(vec![
            Cell::new(format!("{hour:02}:00")),
            Cell::new(consumed).set_alignment(CellAlignment::Right),
            Cell::new(produced).set_alignment(CellAlignment::Right),
            Cell::new(net)
                .set_alignment(CellAlignment::Right)
                .fg(if net >= WattHours::ZERO { Color::Green } else { Color::Red }),
        ]);
    }
    table
}

pub fn build_resolution_table(
    resolution: &Resolution,
    next: Option<(Decision, Reason)>,
    should_send: bool,
) -> Table {
    let mut table = new_table();
    table
        .set_header(vec!["Quarter", "Mode", "Reason", "Savings", "Next", "Send"])
        .add_row(vec![
            Cell::new(
                resolution
                    .quarter_start
                    .map_or_else(|| "-".to_string(), |start| start.format("%b %d %H:%M").to_string()),
            ),
            Cell::new(resolution.decision).fg(resolution.decision.color()),
            Cell::new(resolution.reason),
            Cell::new(resolution.expected_savings).set_alignment(CellAlignment::Right),
            next.map_or_else(
                || Cell::new("-"),
                |(decision, reason)| Cell::new(format!("{decision} ({reason})")).fg(decision.color()),
            ),
            Cell::new(if should_send { "yes" } else { "no" }),
        ]);
    table
}
