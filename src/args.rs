use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use crate::config::{NoDataMode, ZonalConfig};
use crate::errors::Result;
use crate::zonal::parse_statistics;

#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
pub struct ZStatsCliArgs {
    #[clap(subcommand)]
    pub subcmd: Subaction,
}

#[derive(Debug, Subcommand)]
pub enum Subaction {
    /// computes zonal statistics for every raster of a directory and merges them into one CSV
    Zstats(ZStatsCommand),

    /// prints the projection, Proj4 string and Earth Engine transform of a raster
    Metadata(MetadataCommand),

    /// converts an ESRI .prj file into WKT, Proj4 and EPSG
    Prj(PrjCommand),
}

#[derive(Debug, Args)]
pub struct ZStatsCommand {
    /// the zone polygon dataset
    #[clap(short, long)]
    pub zones: PathBuf,

    /// the field holding the unique zone identifier
    #[clap(short, long)]
    pub unique_field: String,

    /// the input raster directory
    #[clap(short, long)]
    pub rasters: PathBuf,

    /// statistics to compute: ALL, or a list such as "MEAN COUNT" or "MIN_MAX_MEAN"
    #[clap(short, long, default_value = "ALL")]
    pub stats: String,

    /// where the temporary working directory is created (system temp dir if omitted)
    #[clap(short, long)]
    pub temp: Option<PathBuf>,

    /// the directory the timestamped output CSV is written to
    #[clap(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// skip no-data cells (DATA) instead of letting them empty a zone (NODATA)
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub ignore_no_data: bool,

    /// multiply float rasters and truncate them to integers before computing statistics
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub integerize_floats: bool,

    /// the multiplier used when integerizing floats
    #[clap(short, long, default_value_t = 100.0)]
    pub multiplier: f64,

    /// comma separated raster file extensions
    #[clap(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,
}

impl ZStatsCommand {
    pub fn to_config(&self) -> Result<ZonalConfig> {
        let mut config =
            ZonalConfig::new(&self.zones, &self.unique_field, &self.rasters, &self.out_dir);
        config.stats = parse_statistics(&self.stats)?;
        if let Some(temp) = &self.temp {
            config.temp_path = temp.clone();
        }
        config.no_data = NoDataMode::from_ignore_flag(self.ignore_no_data);
        config.integerize_floats = self.integerize_floats;
        config.multiplier = self.multiplier;
        if let Some(extensions) = &self.extensions {
            config.extensions = extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct MetadataCommand {
    /// the raster to report on
    pub raster: PathBuf,
}

#[derive(Debug, Args)]
pub struct PrjCommand {
    /// the ESRI .prj file
    pub prj: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zonal::Statistic;
    use clap::Parser;

    fn zstats(args: &[&str]) -> ZStatsCommand {
        let mut argv = vec!["raster_zstats", "zstats"];
        argv.extend_from_slice(args);
        match ZStatsCliArgs::try_parse_from(argv).unwrap().subcmd {
            Subaction::Zstats(cmd) => cmd,
            other => panic!("unexpected subcommand {:?}", other),
        }
    }

    #[test]
    fn zstats_defaults() {
        let cmd = zstats(&["-z", "zones.shp", "-u", "SPATIAL_ID", "-r", "rasters"]);
        let config = cmd.to_config().unwrap();
        assert_eq!(config.stats, Statistic::all().to_vec());
        assert_eq!(config.no_data, NoDataMode::Data);
        assert!(config.integerize_floats);
        assert_eq!(config.multiplier, 100.0);
        assert_eq!(config.unique_field, "SPATIAL_ID");
    }

    #[test]
    fn zstats_overrides() {
        let cmd = zstats(&[
            "--zones", "zones.shp",
            "--unique-field", "ID",
            "--rasters", "rasters",
            "--stats", "MEAN COUNT",
            "--ignore-no-data", "false",
            "--integerize-floats", "false",
            "--multiplier", "1000",
            "--extensions", ".TIF,img",
            "--temp", "/scratch",
        ]);
        let config = cmd.to_config().unwrap();
        assert_eq!(config.stats, vec![Statistic::Mean, Statistic::Count]);
        assert_eq!(config.no_data, NoDataMode::NoData);
        assert!(!config.integerize_floats);
        assert_eq!(config.multiplier, 1000.0);
        assert_eq!(config.extensions, vec!["tif", "img"]);
        assert!(config.temp_dir().starts_with("/scratch"));
    }

    #[test]
    fn metadata_and_prj() {
        let args = ZStatsCliArgs::try_parse_from(["raster_zstats", "metadata", "a.img"]).unwrap();
        assert!(matches!(
            args.subcmd,
            Subaction::Metadata(MetadataCommand { ref raster }) if raster == &PathBuf::from("a.img")
        ));

        let args = ZStatsCliArgs::try_parse_from(["raster_zstats", "prj", "zones.prj"]).unwrap();
        assert!(matches!(args.subcmd, Subaction::Prj(_)));
    }
}
