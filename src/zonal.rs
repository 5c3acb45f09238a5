//! zonal statistics of one computation unit against a zone polygon layer.
//!
//! Zones are burned into an in-memory raster aligned with the unit's grid (GDAL rasterize,
//! burn value = zone code, later features overwrite earlier ones), then the unit's pixels are
//! grouped by zone code and summarised.

use gdal::{
    raster::rasterize,
    spatial_ref::SpatialRef,
    vector::{Geometry, LayerAccess},
    Dataset, DriverManager,
};
use ndarray::{Array2, Zip};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{info, warn};

use crate::{
    config::{NoDataMode, ZonalConfig},
    errors::{engine_failure, Result, ZStatsError},
    table::Table,
    units::{prepare_values, should_integerize, ComputationUnit},
};

pub const OID_FIELD: &str = "OID_";
pub const ZONE_CODE_FIELD: &str = "ZONE_CODE";

const MIN_STRIP_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Count,
    Area,
    Min,
    Max,
    Range,
    Mean,
    Std,
    Sum,
    Variety,
    Majority,
    Minority,
    Median,
}

const ALL_STATISTICS: [Statistic; 12] = [
    Statistic::Count,
    Statistic::Area,
    Statistic::Min,
    Statistic::Max,
    Statistic::Range,
    Statistic::Mean,
    Statistic::Std,
    Statistic::Sum,
    Statistic::Variety,
    Statistic::Majority,
    Statistic::Minority,
    Statistic::Median,
];

impl Statistic {
    /// every statistic, in the column order of an "ALL" table
    pub fn all() -> &'static [Statistic] {
        &ALL_STATISTICS
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Count => "COUNT",
            Statistic::Area => "AREA",
            Statistic::Min => "MIN",
            Statistic::Max => "MAX",
            Statistic::Range => "RANGE",
            Statistic::Mean => "MEAN",
            Statistic::Std => "STD",
            Statistic::Sum => "SUM",
            Statistic::Variety => "VARIETY",
            Statistic::Majority => "MAJORITY",
            Statistic::Minority => "MINORITY",
            Statistic::Median => "MEDIAN",
        }
    }

    /// only defined on integer rasters
    pub fn integer_only(&self) -> bool {
        matches!(
            self,
            Statistic::Variety | Statistic::Majority | Statistic::Minority
        )
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Statistic {
    type Err = ZStatsError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Statistic::all()
            .iter()
            .find(|stat| stat.name() == upper)
            .copied()
            .ok_or_else(|| ZStatsError::ConfigError(format!("unknown statistic '{}'", s)))
    }
}

/// parses a statistics selection such as "ALL", "MEAN COUNT", "MIN_MAX_MEAN" or "mean,std".
/// Duplicates are dropped, the first occurrence keeps its position.
pub fn parse_statistics(selection: &str) -> Result<Vec<Statistic>> {
    let mut stats: Vec<Statistic> = Vec::new();
    for token in selection
        .split(|c: char| c == '_' || c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let selected: Vec<Statistic> = if token.eq_ignore_ascii_case("ALL") {
            Statistic::all().to_vec()
        } else {
            vec![token.parse()?]
        };
        for stat in selected {
            if !stats.contains(&stat) {
                stats.push(stat);
            }
        }
    }
    Ok(stats)
}

/// statistics that make it into a unit's table, integer-only ones are dropped for float units
pub fn effective_statistics(requested: &[Statistic], integer_unit: bool) -> Vec<Statistic> {
    requested
        .iter()
        .filter(|s| integer_unit || !s.integer_only())
        .copied()
        .collect()
}

/// zone polygons keyed by the unique field, loaded once per run
pub struct ZoneLayer {
    pub path: PathBuf,
    pub unique_field: String,
    /// distinct zone values, index + 1 is the zone code
    keys: Vec<String>,
    geometries: Vec<Geometry>,
    burn_values: Vec<f64>,
    srs: Option<SpatialRef>,
    feature_count: u64,
}

impl ZoneLayer {
    /// reads all features of the first layer of a vector dataset
    pub fn open(path: &Path, unique_field: &str) -> Result<ZoneLayer> {
        if !path.exists() {
            return Err(ZStatsError::InputNotFound(path.to_path_buf()));
        }
        let ds = Dataset::open(path)?;
        let mut layer = ds.layer(0)?;
        let srs = layer.spatial_ref();
        let feature_count = layer.feature_count();
        let zone_source = path.display().to_string();

        let mut codes: HashMap<String, usize> = HashMap::new();
        let mut keys = Vec::new();
        let mut geometries = Vec::new();
        let mut burn_values = Vec::new();

        for feature in layer.features() {
            let key = feature
                .field_as_string_by_name(unique_field)
                .map_err(|e| engine_failure(&zone_source, e))?
                .ok_or_else(|| {
                    engine_failure(
                        &zone_source,
                        format!("feature without value for field {}", unique_field),
                    )
                })?;
            let geometry = feature.geometry_by_index(0)?.clone();

            let code = *codes.entry(key.clone()).or_insert_with(|| {
                keys.push(key);
                keys.len()
            });
            geometries.push(geometry);
            burn_values.push(code as f64);
        }

        Ok(ZoneLayer {
            path: path.to_path_buf(),
            unique_field: unique_field.to_string(),
            keys,
            geometries,
            burn_values,
            srs,
            feature_count,
        })
    }

    pub fn feature_count(&self) -> u64 {
        self.feature_count
    }

    pub fn zone_count(&self) -> usize {
        self.keys.len()
    }

    /// zone value of a 1-based zone code
    pub fn key(&self, zone_code: i32) -> Option<&str> {
        if zone_code < 1 {
            return None;
        }
        self.keys.get(zone_code as usize - 1).map(|k| k.as_str())
    }

    /// burns the zone codes into a grid with the given geotransform and projection,
    /// cells outside every zone are 0
    fn rasterize_onto(
        &self,
        size: (usize, usize),
        geo_transform: &[f64; 6],
        projection: &str,
    ) -> Result<Array2<i32>> {
        let (cols, rows) = size;
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut zone_ds =
            driver.create_with_band_type::<i32, _>("", cols as isize, rows as isize, 1)?;
        zone_ds.set_geo_transform(geo_transform)?;
        if !projection.is_empty() {
            zone_ds.set_projection(projection)?;
        }

        if !self.geometries.is_empty() {
            rasterize(
                &mut zone_ds,
                &[1],
                &self.geometries,
                &self.burn_values,
                None,
            )?;
        }

        let buffer = zone_ds
            .rasterband(1)?
            .read_as::<i32>((0, 0), (cols, rows), (cols, rows), None)?;
        Ok(Array2::from_shape_vec((rows, cols), buffer.data)?)
    }
}

/// cells of one zone
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ZoneCells {
    pub values: Vec<f64>,
    pub has_no_data: bool,
}

/// adds the cells of one strip to the per-zone cells. Cells with zone code 0 are outside
/// every zone, NaN cells are no-data.
pub fn accumulate_zones(
    zones: &mut BTreeMap<i32, ZoneCells>,
    zone_codes: &Array2<i32>,
    values: &Array2<f64>,
) {
    Zip::from(zone_codes).and(values).for_each(|&code, &v| {
        if code <= 0 {
            return;
        }
        let cells = zones.entry(code).or_default();
        if v.is_nan() {
            cells.has_no_data = true;
        } else {
            cells.values.push(v);
        }
    });
}

/// groups the valid cell values of a whole grid by zone code
pub fn group_by_zone(
    zone_codes: &Array2<i32>,
    values: &Array2<f64>,
) -> BTreeMap<i32, ZoneCells> {
    let mut zones = BTreeMap::new();
    accumulate_zones(&mut zones, zone_codes, values);
    zones
}

/// rows read per strip, at least one block high
pub fn strip_height(block_rows: usize, raster_rows: usize) -> usize {
    block_rows.max(MIN_STRIP_ROWS).min(raster_rows.max(1))
}

/// geotransform of the strip starting at `row`
pub fn strip_transform(gt: &[f64; 6], row: usize) -> [f64; 6] {
    let r = row as f64;
    [gt[0] + r * gt[2], gt[1], gt[2], gt[3] + r * gt[5], gt[4], gt[5]]
}

/// summary of one zone's values
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSummary {
    sorted: Vec<f64>,
    sum: f64,
    pixel_area: f64,
}

impl ZoneSummary {
    /// None if there is nothing to summarise
    pub fn new(mut values: Vec<f64>, pixel_area: f64) -> Option<ZoneSummary> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let sum = values.iter().sum();
        Some(ZoneSummary {
            sorted: values,
            sum,
            pixel_area,
        })
    }

    fn count(&self) -> f64 {
        self.sorted.len() as f64
    }

    fn mean(&self) -> f64 {
        self.sum / self.count()
    }

    /// value -> number of cells, lowest value first
    fn frequencies(&self) -> Vec<(f64, usize)> {
        let mut freq: Vec<(f64, usize)> = Vec::new();
        for &v in &self.sorted {
            match freq.last_mut() {
                Some((last, n)) if *last == v => *n += 1,
                _ => freq.push((v, 1)),
            }
        }
        freq
    }

    pub fn value(&self, stat: Statistic) -> f64 {
        let n = self.sorted.len();
        match stat {
            Statistic::Count => self.count(),
            Statistic::Area => self.count() * self.pixel_area,
            Statistic::Min => self.sorted[0],
            Statistic::Max => self.sorted[n - 1],
            Statistic::Range => self.sorted[n - 1] - self.sorted[0],
            Statistic::Mean => self.mean(),
            Statistic::Std => {
                let mean = self.mean();
                let squares: f64 = self.sorted.iter().map(|v| (v - mean).powi(2)).sum();
                (squares / self.count()).sqrt()
            }
            Statistic::Sum => self.sum,
            Statistic::Variety => self.frequencies().len() as f64,
            // ties go to the lowest value since frequencies are ordered by value
            Statistic::Majority => {
                let freq = self.frequencies();
                let max = freq.iter().map(|(_, n)| *n).max().unwrap_or(0);
                freq.iter().find(|(_, n)| *n == max).map(|(v, _)| *v).unwrap_or(f64::NAN)
            }
            Statistic::Minority => {
                let freq = self.frequencies();
                let min = freq.iter().map(|(_, n)| *n).min().unwrap_or(0);
                freq.iter().find(|(_, n)| *n == min).map(|(v, _)| *v).unwrap_or(f64::NAN)
            }
            // lower middle value for an even count
            Statistic::Median => self.sorted[(n - 1) / 2],
        }
    }
}

/// builds the result table of a unit from its grouped cells. Zones without any counted cell
/// get no row; in NODATA mode a zone touching a no-data cell gets a row with empty statistics.
pub fn summarise_zones(
    zones: &ZoneLayer,
    grouped: BTreeMap<i32, ZoneCells>,
    stats: &[Statistic],
    mode: NoDataMode,
    pixel_area: f64,
) -> Table {
    let mut columns = vec![
        OID_FIELD.to_string(),
        zones.unique_field.clone(),
        ZONE_CODE_FIELD.to_string(),
    ];
    columns.extend(stats.iter().map(|s| s.name().to_string()));
    let mut table = Table::new(columns);

    for (code, cells) in grouped {
        let Some(key) = zones.key(code) else { continue };

        let stat_values: Vec<String> = match mode {
            NoDataMode::NoData if cells.has_no_data => vec![String::new(); stats.len()],
            _ => match ZoneSummary::new(cells.values, pixel_area) {
                Some(summary) => stats
                    .iter()
                    .map(|s| format_value(summary.value(*s)))
                    .collect(),
                None => continue,
            },
        };

        let mut row = vec![
            (table.rows.len() + 1).to_string(),
            key.to_string(),
            code.to_string(),
        ];
        row.extend(stat_values);
        table.rows.push(row);
    }
    table
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{}", v)
    }
}

/// computes the zonal statistics table of one unit
pub fn zonal_statistics(
    zones: &ZoneLayer,
    unit: &ComputationUnit,
    config: &ZonalConfig,
) -> Result<Table> {
    compute_unit(zones, unit, config).map_err(|e| match e {
        ZStatsError::Gdal(_) | ZStatsError::Shape(_) => engine_failure(unit, e),
        other => other,
    })
}

fn compute_unit(
    zones: &ZoneLayer,
    unit: &ComputationUnit,
    config: &ZonalConfig,
) -> Result<Table> {
    let ds = Dataset::open(&unit.raster)?;
    let geo_transform = ds.geo_transform()?;
    let projection = ds.projection();

    if let (Some(zone_srs), Ok(raster_srs)) = (&zones.srs, ds.spatial_ref()) {
        if *zone_srs != raster_srs {
            warn!(
                "zone layer {:?} and raster {} use different spatial references",
                zones.path, unit
            );
        }
    }

    let band = ds.rasterband(unit.band_index())?;
    let no_data = band.no_data_value();
    let integerized = should_integerize(unit.pixel_type, config.integerize_floats);
    let multiplier = if integerized {
        info!("Converting Float Raster to Integer...");
        Some(config.multiplier)
    } else {
        None
    };

    // strips of whole blocks keep memory bounded for large rasters
    let (cols, rows) = ds.raster_size();
    let strip_rows = strip_height(band.block_size().1, rows);
    let mut grouped: BTreeMap<i32, ZoneCells> = BTreeMap::new();
    let mut row = 0;
    while row < rows {
        let height = strip_rows.min(rows - row);
        let window = (cols, height);
        let buffer = band.read_as::<f64>((0, row as isize), window, window, None)?;
        let mut values = Array2::from_shape_vec((height, cols), buffer.data)?;
        prepare_values(&mut values, no_data, multiplier);

        let strip_gt = strip_transform(&geo_transform, row);
        let zone_codes = zones.rasterize_onto(window, &strip_gt, &projection)?;
        accumulate_zones(&mut grouped, &zone_codes, &values);
        row += height;
    }

    let integer_unit = integerized || !unit.pixel_type.is_float();
    let stats = effective_statistics(&config.stats, integer_unit);
    let pixel_area = (geo_transform[1] * geo_transform[5]).abs();

    Ok(summarise_zones(zones, grouped, &stats, config.no_data, pixel_area))
}
