//! # raster_zstats
//!
//! `raster_zstats` is a crate that provides two raster utilities used when preparing data for a
//! cloud geospatial platform: a zonal statistics batch run over a directory of rasters, and a
//! report of a raster's georeferencing metadata (projection and affine transform).
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use raster_zstats::{metadata, run_zonal_stats, ZonalConfig};
//!
//! let mut config = ZonalConfig::new("data/zones.shp", "SPATIAL_ID", "data/rasters", "output");
//! config.multiplier = 1000.0;
//! let csv = run_zonal_stats(&config).unwrap();
//! println!("zonal statistics written to {:?}", csv);
//!
//! let wkt = metadata::get_projection_wkt(Path::new("data/rasters/dem.img")).unwrap();
//! metadata::convert_wkt_to_proj4(&wkt).unwrap();
//! metadata::get_transform_for_gee(Path::new("data/rasters/dem.img")).unwrap();
//! ```
//!
//! ## Usage
//! ### rust api
//! - `run_zonal_stats`: computes zonal statistics for every raster (one unit per band for
//!   multi-band rasters), integerizing float rasters if configured, and merges the per-unit
//!   tables into one CSV by inner join on the zone identifier.
//! - `metadata`: functions to read the transform and projection of a raster, reorder the
//!   transform for Earth Engine and convert WKT or ESRI `.prj` text to Proj4.
//!
//! ### Command line
//! the clap framework is used to provide a command line interface for the crate.
//!```zsh
//! cargo run --release -- -h
//!```
//! lists the `zstats`, `metadata` and `prj` commands.
//!
//! ## Installation
//! gdal must be installed and the path environment variable must be set to the gdal binaries.
//! build using
//!```zsh
//! cargo build --release
//! cargo install --path .
//! ```
//!
pub mod args;
pub mod config;
pub mod errors;
pub mod metadata;
pub mod pipeline;
pub mod table;
pub mod units;
pub mod zonal;

pub use config::{NoDataMode, ZonalConfig};
pub use errors::{Result, ZStatsError};
pub use pipeline::run_zonal_stats;
pub use units::{ComputationUnit, PixelType, UnitKind};
pub use zonal::Statistic;
