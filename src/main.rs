use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use raster_zstats::{
    args::{Subaction, ZStatsCliArgs},
    metadata, run_zonal_stats, Result,
};

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = ZStatsCliArgs::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: ZStatsCliArgs) -> Result<()> {
    match args.subcmd {
        Subaction::Zstats(cmd) => {
            let config = cmd.to_config()?;
            let out_csv = run_zonal_stats(&config)?;
            info!("Done, results written to {:?}", out_csv);
        }
        Subaction::Metadata(cmd) => {
            metadata::report(&cmd.raster)?;
            println!("\nDone!\n");
        }
        Subaction::Prj(cmd) => {
            metadata::esri_prj_to_standards(&cmd.prj)?;
        }
    }
    Ok(())
}
