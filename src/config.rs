use chrono::Local;
use std::path::{Path, PathBuf};

use crate::errors::{config_error, Result, ZStatsError};
use crate::zonal::Statistic;

pub const DEFAULT_MULTIPLIER: f64 = 100.0;

pub const DEFAULT_RASTER_EXTENSIONS: &[&str] = &[
    "tif", "tiff", "img", "vrt", "asc", "bil", "dem", "jp2", "nc", "grd",
];

/// how no-data cells of the value raster are treated inside a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDataMode {
    /// no-data cells are skipped, statistics use the remaining cells
    Data,
    /// a single no-data cell makes every statistic of the zone empty
    NoData,
}

impl NoDataMode {
    /// `true` maps to `DATA`, `false` to `NODATA`
    pub fn from_ignore_flag(ignore_no_data: bool) -> Self {
        if ignore_no_data {
            NoDataMode::Data
        } else {
            NoDataMode::NoData
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoDataMode::Data => "DATA",
            NoDataMode::NoData => "NODATA",
        }
    }
}

/// Everything a zonal statistics run needs. Built once by the caller and passed into
/// [`crate::pipeline::run_zonal_stats`].
#[derive(Debug, Clone)]
pub struct ZonalConfig {
    /// zone polygon dataset (any vector format GDAL can open)
    pub zones: PathBuf,
    /// field holding the unique zone identifier, also the join key of the merged table
    pub unique_field: String,
    /// directory holding the value rasters
    pub raster_dir: PathBuf,
    pub stats: Vec<Statistic>,
    /// parent of the per-run temporary directory
    pub temp_path: PathBuf,
    pub no_data: NoDataMode,
    /// multiply float rasters by `multiplier` and truncate before computing statistics
    pub integerize_floats: bool,
    pub multiplier: f64,
    /// final CSV file
    pub out_csv: PathBuf,
    /// lowercase file extensions recognised as rasters
    pub extensions: Vec<String>,
    /// `YYYYMMDD_HHMMSS` stamp shared by the output file and the temp directory
    pub run_stamp: String,
}

impl ZonalConfig {
    /// config with the default settings: all statistics, no-data ignored, floats integerized
    /// with a multiplier of 100, temp directory under the system temp dir
    pub fn new(
        zones: impl AsRef<Path>,
        unique_field: &str,
        raster_dir: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> Self {
        let run_stamp = run_stamp();
        ZonalConfig {
            zones: zones.as_ref().to_path_buf(),
            unique_field: unique_field.to_string(),
            raster_dir: raster_dir.as_ref().to_path_buf(),
            stats: Statistic::all().to_vec(),
            temp_path: std::env::temp_dir(),
            no_data: NoDataMode::Data,
            integerize_floats: true,
            multiplier: DEFAULT_MULTIPLIER,
            out_csv: out_dir.as_ref().join(out_csv_name(&run_stamp)),
            extensions: DEFAULT_RASTER_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            run_stamp,
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_path.join(temp_dir_name(&self.run_stamp))
    }

    /// checks the inputs before anything is written
    pub fn validate(&self) -> Result<()> {
        if !self.zones.exists() {
            return Err(ZStatsError::InputNotFound(self.zones.clone()));
        }
        if !self.raster_dir.is_dir() {
            return Err(ZStatsError::InputNotFound(self.raster_dir.clone()));
        }
        if self.unique_field.trim().is_empty() {
            return Err(config_error("unique field name is empty"));
        }
        if self.stats.is_empty() {
            return Err(config_error("no statistics requested"));
        }
        if !self.multiplier.is_finite() || self.multiplier == 0.0 {
            return Err(config_error(format!(
                "multiplier must be finite and non-zero, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

pub fn run_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn out_csv_name(stamp: &str) -> String {
    format!("out_zstat_{}.csv", stamp)
}

pub fn temp_dir_name(stamp: &str) -> String {
    format!("tempZstat_{}", stamp)
}
