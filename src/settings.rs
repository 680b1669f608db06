use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    core::{battery::BatteryParameters, prices::RetailCoefficients},
    prelude::*,
    quantity::power::Watts,
};

/// User-editable planner settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether the planner may take control of the battery.
    pub enabled: bool,

    /// Installed peak PV power.
    pub installed_power: Watts,

    pub battery: BatteryParameters,
    pub retail: RetailCoefficients,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            installed_power: Watts(10_000.0),
            battery: BatteryParameters::default(),
            retail: RetailCoefficients::default(),
        }
    }
}

impl Settings {
    /// Read the settings, falling back to the defaults when the file does not exist.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read_from(path: &Path) -> Result<Self> {
        if path.is_file() {
            let settings = toml::from_slice(&fs::read(path)?)
                .with_context(|| format!("failed to parse `{}`", path.display()))?;
            Ok(settings)
        } else {
            info!("no settings file, using the defaults");
            Ok(Self::default())
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn write_to(&self, path: &Path) -> Result {
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }
}
