use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ZStatsError>;

#[derive(Error, Debug)]
pub enum ZStatsError {
    #[error("input not found: {0}")]
    InputNotFound(PathBuf),

    #[error("unsupported pixel type {pixel_type} in {raster} (band {band})")]
    UnsupportedPixelType {
        raster: String,
        band: isize,
        pixel_type: String,
    },

    #[error("zonal statistics failed for {unit}: {reason}")]
    StatisticsEngineFailure { unit: String, reason: String },

    #[error("join key {key} not found in table {table}")]
    MergeKeyMismatch { key: String, table: String },

    #[error("unit name {name} is used by both {first} and {second}")]
    DuplicateUnitName {
        name: String,
        first: String,
        second: String,
    },

    #[error("could not remove temporary directory {0}")]
    CleanupFailure(PathBuf),

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub fn engine_failure(unit: impl ToString, reason: impl ToString) -> ZStatsError {
    ZStatsError::StatisticsEngineFailure {
        unit: unit.to_string(),
        reason: reason.to_string(),
    }
}

pub fn config_error(msg: impl ToString) -> ZStatsError {
    ZStatsError::ConfigError(msg.to_string())
}
