use std::fmt::{Display, Formatter};

use comfy_table::Color;
use serde::{Deserialize, Serialize};

/// Battery dispatch mode for a single quarter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Solar first, then the battery, then the grid.
    #[default]
    SelfUse,

    /// Force charging from the grid.
    ChargeFromGrid,

    /// Force discharging into the grid.
    DischargeToGrid,

    /// Keep the battery energy for later, serve the load from the grid.
    HoldBattery,

    /// No plan covers the quarter.
    Unknown,
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfUse => write!(f, "Self-use"),
            Self::ChargeFromGrid => write!(f, "Charge"),
            Self::DischargeToGrid => write!(f, "Discharge"),
            Self::HoldBattery => write!(f, "Hold"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Decision {
    pub const fn color(self) -> Color {
        match self {
            Self::ChargeFromGrid => Color::Green,
            Self::DischargeToGrid => Color::Blue,
            Self::SelfUse => Color::DarkYellow,
            Self::HoldBattery => Color::Cyan,
            Self::Unknown => Color::Reset,
        }
    }
}

/// Why the simulator picked the decision.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum Reason {
    #[default]
    SolarCoversLoad,
    BatteryCheaperThanGrid,
    BatteryPartiallyCovers,
    GridCheaperThanBattery,
    HoldForPricierQuarter,
    StoringSurplus,
    SellingSurplus,
    CheapGridWindow,
    Arbitrage,
    SellingAtPeak,
    WaitingForSolar,
    Disabled,
    NoPriceData,
    OutsideHorizon,
}

impl Display for Reason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SolarCoversLoad => write!(f, "solar covers the load"),
            Self::BatteryCheaperThanGrid => write!(f, "battery is cheaper than the grid"),
            Self::BatteryPartiallyCovers => write!(f, "battery covers part of the load"),
            Self::GridCheaperThanBattery => write!(f, "grid is cheaper than the battery"),
            Self::HoldForPricierQuarter => write!(f, "saving the battery for a pricier quarter"),
            Self::StoringSurplus => write!(f, "storing solar surplus"),
            Self::SellingSurplus => write!(f, "selling solar surplus"),
            Self::CheapGridWindow => write!(f, "cheap grid window"),
            Self::Arbitrage => write!(f, "arbitrage"),
            Self::SellingAtPeak => write!(f, "selling at the peak"),
            Self::WaitingForSolar => write!(f, "waiting for solar"),
            Self::Disabled => write!(f, "planning is disabled"),
            Self::NoPriceData => write!(f, "no price data"),
            Self::OutsideHorizon => write!(f, "outside the price horizon"),
        }
    }
}
