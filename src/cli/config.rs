use clap::Parser;

use crate::{cli::SettingsArgs, prelude::*};

#[derive(Parser)]
pub struct ConfigArgs {
    #[clap(flatten)]
    pub settings: SettingsArgs,

    /// Save the settings, overrides included, back into the settings file.
    #[clap(long)]
    pub write: bool,
}

#[instrument(skip_all)]
pub fn config(args: &ConfigArgs) -> Result {
    let settings = args.settings.load()?;
    print!("{}", toml::to_string(&settings)?);
    if args.write {
        settings.write_to(&args.settings.path)?;
        info!(path = %args.settings.path.display(), "saved the settings");
    }
    Ok(())
}
