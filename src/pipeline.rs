use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::{
    config::ZonalConfig,
    errors::{engine_failure, Result, ZStatsError},
    table::merge_table_files,
    units::{check_unique_unit_names, expand_units, list_rasters},
    zonal::{zonal_statistics, ZoneLayer},
};

/// runs zonal statistics for every raster (or band) of the raster directory and writes the
/// merged table to `config.out_csv`. Returns the path of the written CSV.
///
/// Any failure aborts the run and no CSV is written. The temporary directory is removed at the
/// end in either case; failing to remove it only logs a warning.
pub fn run_zonal_stats(config: &ZonalConfig) -> Result<PathBuf> {
    config.validate()?;
    let zones = ZoneLayer::open(&config.zones, &config.unique_field)?;
    info!("Running Zonal Stats on {} segments...", zones.feature_count());

    let temp_dir = config.temp_dir();
    fs::create_dir_all(&temp_dir)?;

    let result = compute_and_merge(config, &zones, &temp_dir);

    if let Err(e) = remove_temp_dir(&temp_dir) {
        if result.is_ok() {
            warn!(
                "Warning: Script was successful. However, some temporary files may not have \
                 been removed. ({})",
                e
            );
        } else {
            warn!("{}", e);
        }
    }
    result
}

fn compute_and_merge(
    config: &ZonalConfig,
    zones: &ZoneLayer,
    temp_dir: &Path,
) -> Result<PathBuf> {
    let rasters = list_rasters(&config.raster_dir, &config.extensions)?;

    // every unit is planned before any statistics run so name clashes fail fast
    let mut units = Vec::new();
    for raster in &rasters {
        let raster_units = expand_units(raster).map_err(|e| match e {
            ZStatsError::Gdal(_) => engine_failure(raster.display(), e),
            other => other,
        })?;
        info!("Working on {:?} ({} bands)...", raster, raster_units.len());
        units.extend(raster_units);
    }
    check_unique_unit_names(&units)?;

    let mut out_tables = Vec::new();
    for unit in &units {
        if unit.band_label.is_some() {
            info!("Processing {} [{}] with {}", unit, unit.pixel_type, config.no_data.as_str());
        }
        let table = zonal_statistics(zones, unit, config)?;
        let table_path = temp_dir.join(unit.table_file_name());
        table.write_csv(&table_path)?;
        out_tables.push(table_path);
    }
    info!("Zonal Stats calculation finished...");

    info!("Merging Tables...");
    let merged = merge_table_files(&out_tables, &config.unique_field)?;
    info!("Tables merged!");

    if let Some(parent) = config.out_csv.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    merged.write_csv(&config.out_csv)?;
    Ok(config.out_csv.clone())
}

/// best-effort removal of the per-run temporary directory
pub fn remove_temp_dir(temp_dir: &Path) -> Result<()> {
    if !temp_dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(temp_dir).map_err(|_| ZStatsError::CleanupFailure(temp_dir.to_path_buf()))
}
