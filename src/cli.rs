mod config;
mod learn;
mod plan;
mod planning;
mod prices;
mod resolve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use self::{config::config, learn::learn, plan::plan, resolve::resolve};
use crate::{
    cli::{config::ConfigArgs, learn::LearnArgs, plan::PlanArgs, resolve::ResolveArgs},
    prelude::*,
    quantity::{
        energy::KilowattHours,
        power::{Kilowatts, Watts},
        proportions::Percentage,
        rate::KilowattHourRate,
    },
    settings::Settings,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay the telemetry through the predictors and save the learned history.
    #[clap(name = "learn")]
    Learn(Box<LearnArgs>),

    /// Simulate the whole price horizon and print the plan.
    #[clap(name = "plan")]
    Plan(Box<PlanArgs>),

    /// Keep resolving the battery mode for the current quarter.
    #[clap(name = "resolve")]
    Resolve(Box<ResolveArgs>),

    /// Print the effective settings, optionally saving them.
    #[clap(name = "config")]
    Config(Box<ConfigArgs>),
}

#[derive(Parser)]
pub struct HistoryArgs {
    /// Directory with the learned consumption and production history.
    #[clap(long = "history-dir", env = "HISTORY_DIR", default_value = "history")]
    pub directory: PathBuf,
}

/// Settings file and per-field overrides.
#[derive(Parser)]
pub struct SettingsArgs {
    #[clap(long = "settings", env = "SETTINGS", default_value = "sunwise.toml")]
    pub path: PathBuf,

    /// Allow the planner to take control of the battery.
    #[clap(long, env = "ENABLED")]
    pub enabled: Option<bool>,

    /// Usable battery capacity in kilowatt-hours.
    #[clap(long = "battery-capacity", env = "BATTERY_CAPACITY")]
    pub capacity: Option<KilowattHours>,

    #[clap(long = "min-state-of-charge", env = "MIN_STATE_OF_CHARGE")]
    pub min_state_of_charge: Option<Percentage>,

    #[clap(long = "max-state-of-charge", env = "MAX_STATE_OF_CHARGE")]
    pub max_state_of_charge: Option<Percentage>,

    /// Battery wear cost per cycled kilowatt-hour.
    #[clap(long = "cycle-cost", env = "CYCLE_COST")]
    pub cycle_cost: Option<KilowattHourRate>,

    /// Charging power in kilowatts.
    #[clap(long = "charging-power", env = "CHARGING_POWER")]
    pub max_charging_power: Option<Kilowatts>,

    /// Discharging power in kilowatts.
    #[clap(long = "discharging-power", env = "DISCHARGING_POWER")]
    pub max_discharging_power: Option<Kilowatts>,

    /// Installed peak PV power in watts.
    #[clap(long = "installed-power", env = "INSTALLED_POWER")]
    pub installed_power: Option<Watts>,
}

impl SettingsArgs {
    /// Read the settings file and apply the overrides on top of it.
    pub fn load(&self) -> Result<Settings> {
        let mut settings = Settings::read_from(&self.path)?;
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        let battery = &mut settings.battery;
        if let Some(capacity) = self.capacity {
            battery.capacity = capacity;
        }
        if let Some(min_state_of_charge) = self.min_state_of_charge {
            battery.min_state_of_charge = min_state_of_charge;
        }
        if let Some(max_state_of_charge) = self.max_state_of_charge {
            battery.max_state_of_charge = max_state_of_charge;
        }
        if let Some(cycle_cost) = self.cycle_cost {
            battery.cycle_cost = cycle_cost;
        }
        if let Some(max_charging_power) = self.max_charging_power {
            battery.max_charging_power = max_charging_power;
        }
        if let Some(max_discharging_power) = self.max_discharging_power {
            battery.max_discharging_power = max_discharging_power;
        }
        if let Some(installed_power) = self.installed_power {
            settings.installed_power = installed_power;
        }
        settings.battery = settings.battery.or_defaults();
        debug!(?settings, "loaded the settings");
        Ok(settings)
    }
}
