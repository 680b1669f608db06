mod cli;
mod core;
mod forecast;
mod prelude;
mod quantity;
mod settings;
mod storage;
mod tables;
mod telemetry;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command, config, learn, plan, resolve},
    prelude::*,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();

    match args.command {
        Command::Learn(args) => learn(&args)?,
        Command::Plan(args) => plan(&args)?,
        Command::Resolve(args) => resolve(&args).await?,
        Command::Config(args) => config(&args)?,
    }

    info!("done!");
    Ok(())
}
