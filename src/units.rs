//! turns a directory of rasters into the flat list of computation units the statistics step
//! works on, and the float-to-integer conversion applied to a unit's pixels.

use gdal::{Dataset, Metadata};
use ndarray::Array2;
use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::errors::{Result, ZStatsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    F32,
    F64,
}

impl PixelType {
    /// maps a GDAL data type name ("Byte", "Int16", "Float32", ...) to a pixel type.
    /// complex and unknown types have no mapping.
    pub fn from_gdal_name(name: &str) -> Option<Self> {
        let pt = match name {
            "Byte" => PixelType::U8,
            "Int8" => PixelType::S8,
            "UInt16" => PixelType::U16,
            "Int16" => PixelType::S16,
            "UInt32" => PixelType::U32,
            "Int32" => PixelType::S32,
            "UInt64" => PixelType::U64,
            "Int64" => PixelType::S64,
            "Float32" => PixelType::F32,
            "Float64" => PixelType::F64,
            _ => return None,
        };
        Some(pt)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PixelType::F32 | PixelType::F64)
    }

    pub fn code(&self) -> &'static str {
        match self {
            PixelType::U8 => "U8",
            PixelType::S8 => "S8",
            PixelType::U16 => "U16",
            PixelType::S16 => "S16",
            PixelType::U32 => "U32",
            PixelType::S32 => "S32",
            PixelType::U64 => "U64",
            PixelType::S64 => "S64",
            PixelType::F32 => "F32",
            PixelType::F64 => "F64",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    WholeRaster,
    /// 1-based band index of a multi-band raster
    Band(isize),
}

/// a single-band raster, or one band of a multi-band raster
#[derive(Debug, Clone, PartialEq)]
pub struct ComputationUnit {
    pub raster: PathBuf,
    /// raster file name up to its first '.'
    pub base_name: String,
    pub kind: UnitKind,
    /// `<prefix>_<index>` for bands of a multi-band raster
    pub band_label: Option<String>,
    pub pixel_type: PixelType,
}

impl ComputationUnit {
    /// the GDAL band to read, whole rasters use their only band
    pub fn band_index(&self) -> isize {
        match self.kind {
            UnitKind::WholeRaster => 1,
            UnitKind::Band(i) => i,
        }
    }

    /// name used for the temp table and as column suffix of the merged table
    pub fn unit_name(&self) -> String {
        match self.kind {
            UnitKind::WholeRaster => self.base_name.clone(),
            UnitKind::Band(i) => format!("{}_band_{}", self.base_name, i),
        }
    }

    pub fn table_file_name(&self) -> String {
        format!("{}.csv", self.unit_name())
    }
}

impl fmt::Display for ComputationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .raster
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.raster.display().to_string());
        match &self.band_label {
            Some(label) => write!(f, "{} ({})", file, label),
            None => write!(f, "{}", file),
        }
    }
}

/// file name up to the first '.', "a.b.img" becomes "a"
pub fn base_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    file_name.split('.').next().unwrap_or_default().to_string()
}

/// returns the raster files of a directory, sorted by file name.
/// dir: directory holding the rasters
/// extensions: lowercase extensions that identify raster files
pub fn list_rasters(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|_| ZStatsError::InputNotFound(dir.to_path_buf()))?;

    let mut rasters = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_raster = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if is_raster {
            rasters.push(path);
        } else {
            debug!("skipping non-raster file {:?}", path);
        }
    }
    rasters.sort();
    Ok(rasters)
}

/// opens a raster and expands it into computation units, one per band for multi-band rasters
pub fn expand_units(raster: &Path) -> Result<Vec<ComputationUnit>> {
    let ds = Dataset::open(raster)?;
    let band_count = ds.raster_count();
    if band_count < 1 {
        debug!("{:?} has no raster bands", raster);
        return Ok(Vec::new());
    }

    let mut band_types = Vec::with_capacity(band_count as usize);
    for i in 1..=band_count {
        let band = ds.rasterband(i)?;
        let type_name = band.band_type().name();
        let pixel_type = PixelType::from_gdal_name(&type_name).ok_or_else(|| {
            ZStatsError::UnsupportedPixelType {
                raster: raster.display().to_string(),
                band: i,
                pixel_type: type_name.clone(),
            }
        })?;
        band_types.push(pixel_type);
    }

    let first_description = ds.rasterband(1)?.description().unwrap_or_default();
    Ok(plan_units(raster, &band_types, &first_description))
}

/// builds the units for a raster with the given band pixel types, the band count being
/// `band_types.len()`. The band label prefix is the first band's description up to its
/// first underscore.
pub fn plan_units(
    raster: &Path,
    band_types: &[PixelType],
    first_band_description: &str,
) -> Vec<ComputationUnit> {
    let base = base_name(raster);

    if band_types.len() == 1 {
        return vec![ComputationUnit {
            raster: raster.to_path_buf(),
            base_name: base,
            kind: UnitKind::WholeRaster,
            band_label: None,
            pixel_type: band_types[0],
        }];
    }

    let prefix = match first_band_description.split('_').next() {
        Some(p) if !p.is_empty() => p,
        _ => "Band",
    };

    band_types
        .iter()
        .enumerate()
        .map(|(i, pixel_type)| {
            let index = i as isize + 1;
            ComputationUnit {
                raster: raster.to_path_buf(),
                base_name: base.clone(),
                kind: UnitKind::Band(index),
                band_label: Some(format!("{}_{}", prefix, index)),
                pixel_type: *pixel_type,
            }
        })
        .collect()
}

pub fn should_integerize(pixel_type: PixelType, integerize_floats: bool) -> bool {
    integerize_floats && pixel_type.is_float()
}

/// scales a value and truncates toward zero, `-1.237 * 100` becomes `-123`
pub fn integerize(value: f64, multiplier: f64) -> f64 {
    (value * multiplier).trunc()
}

/// replaces the no-data cells of a pixel grid with NaN, must run on the source values
pub fn mask_no_data(data: &mut Array2<f64>, no_data: Option<f64>) {
    if let Some(nd) = no_data {
        data.mapv_inplace(|v| if v == nd { f64::NAN } else { v });
    }
}

/// integerizes all cells of a pixel grid, NaN (masked no-data) cells stay NaN
pub fn integerize_grid(data: &mut Array2<f64>, multiplier: f64) {
    data.mapv_inplace(|v| if v.is_nan() { v } else { integerize(v, multiplier) });
}

/// masks the no-data cells of freshly read pixels, then integerizes them if a multiplier
/// is given. Afterwards NaN is the only no-data marker.
pub fn prepare_values(data: &mut Array2<f64>, no_data: Option<f64>, multiplier: Option<f64>) {
    mask_no_data(data, no_data);
    if let Some(m) = multiplier {
        integerize_grid(data, m);
    }
}

/// unit names become temp table names and column suffixes, which are compared without case.
/// Two units sharing a name would overwrite each other's results.
pub fn check_unique_unit_names(units: &[ComputationUnit]) -> Result<()> {
    let mut seen: HashMap<String, &ComputationUnit> = HashMap::new();
    for unit in units {
        if let Some(first) = seen.insert(unit.unit_name().to_uppercase(), unit) {
            return Err(ZStatsError::DuplicateUnitName {
                name: unit.unit_name(),
                first: first.to_string(),
                second: unit.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn multi_band_expands_to_one_unit_per_band() {
        let types = [PixelType::U8, PixelType::F32, PixelType::S16];
        let units = plan_units(Path::new("/data/landsat.img"), &types, "Band_1");

        assert_eq!(units.len(), 3);
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.kind, UnitKind::Band(i as isize + 1));
            assert_eq!(unit.band_index(), i as isize + 1);
            assert_eq!(unit.pixel_type, types[i]);
        }
        assert_eq!(units[1].band_label.as_deref(), Some("Band_2"));
        assert_eq!(units[2].unit_name(), "landsat_band_3");
        assert_eq!(units[2].table_file_name(), "landsat_band_3.csv");
        assert_eq!(units[0].to_string(), "landsat.img (Band_1)");
    }

    #[test]
    fn band_prefix_falls_back_when_description_is_empty() {
        let units = plan_units(Path::new("x.tif"), &[PixelType::U8, PixelType::U8], "");
        assert_eq!(units[0].band_label.as_deref(), Some("Band_1"));

        let units = plan_units(Path::new("x.tif"), &[PixelType::U8, PixelType::U8], "nir");
        assert_eq!(units[1].band_label.as_deref(), Some("nir_2"));
    }

    #[test]
    fn single_band_is_whole_raster() {
        let units = plan_units(Path::new("dem.v2.tif"), &[PixelType::F64], "Band_1");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, UnitKind::WholeRaster);
        assert_eq!(units[0].band_index(), 1);
        assert_eq!(units[0].unit_name(), "dem");
        assert_eq!(units[0].band_label, None);
    }

    #[test]
    fn gdal_type_names() {
        assert_eq!(PixelType::from_gdal_name("Byte"), Some(PixelType::U8));
        assert_eq!(PixelType::from_gdal_name("Float32"), Some(PixelType::F32));
        assert_eq!(PixelType::from_gdal_name("CFloat32"), None);
        assert_eq!(PixelType::from_gdal_name("Unknown"), None);
    }

    #[test]
    fn integerize_only_float_with_flag() {
        assert!(should_integerize(PixelType::F32, true));
        assert!(should_integerize(PixelType::F64, true));
        assert!(!should_integerize(PixelType::F32, false));
        assert!(!should_integerize(PixelType::S32, true));
        assert!(!should_integerize(PixelType::U8, true));
    }

    #[test]
    fn integerize_truncates_toward_zero() {
        assert_eq!(integerize(1.239, 100.0), 123.0);
        assert_eq!(integerize(-1.239, 100.0), -123.0);
        assert_eq!(integerize(0.004, 100.0), 0.0);
        assert_eq!(integerize(2.5f32 as f64, 10.0), 25.0);
    }

    #[test]
    fn integerize_grid_keeps_no_data() {
        let mut grid = array![[0.555, -9999.0], [f64::NAN, -0.019]];
        prepare_values(&mut grid, Some(-9999.0), Some(100.0));
        assert_eq!(grid[[0, 0]], 55.0);
        assert!(grid[[0, 1]].is_nan());
        assert!(grid[[1, 0]].is_nan());
        assert_eq!(grid[[1, 1]], -1.0);
    }

    #[test]
    fn rescaled_value_equal_to_no_data_stays_valid() {
        // 0.004 x 100 truncates to 0, the band's no-data value
        let mut grid = array![[0.004, 1.5]];
        prepare_values(&mut grid, Some(0.0), Some(100.0));
        assert_eq!(grid[[0, 0]], 0.0);
        assert_eq!(grid[[0, 1]], 150.0);

        // -99.995 x 100 truncates to -9999
        let mut grid = array![[-99.995, -9999.0]];
        prepare_values(&mut grid, Some(-9999.0), Some(100.0));
        assert_eq!(grid[[0, 0]], -9999.0);
        assert!(grid[[0, 1]].is_nan());
    }

    #[test]
    fn prepare_without_multiplier_only_masks() {
        let mut grid = array![[0.25, 3.0]];
        prepare_values(&mut grid, Some(3.0), None);
        assert_eq!(grid[[0, 0]], 0.25);
        assert!(grid[[0, 1]].is_nan());
    }

    #[test]
    fn colliding_unit_names_are_rejected() {
        let a = plan_units(Path::new("/r/dem.v1.tif"), &[PixelType::U8], "");
        let b = plan_units(Path::new("/r/dem.v2.tif"), &[PixelType::U8], "");
        let mut units = a.clone();
        units.extend(b);
        match check_unique_unit_names(&units) {
            Err(ZStatsError::DuplicateUnitName { name, first, second }) => {
                assert_eq!(name, "dem");
                assert_eq!(first, "dem.v1.tif");
                assert_eq!(second, "dem.v2.tif");
            }
            other => panic!("unexpected result {:?}", other),
        }

        // names differing only in case collide in the uppercased column suffix
        let mut units = a.clone();
        units.extend(plan_units(Path::new("/r/DEM.tif"), &[PixelType::U8], ""));
        assert!(matches!(
            check_unique_unit_names(&units),
            Err(ZStatsError::DuplicateUnitName { .. })
        ));

        let mut units = a;
        units.extend(plan_units(Path::new("/r/slope.tif"), &[PixelType::U8, PixelType::U8], ""));
        assert!(check_unique_unit_names(&units).is_ok());
    }

    #[test]
    fn list_rasters_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.TIF", "a.img", "notes.txt", "c.img.aux.xml"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.tif")).unwrap();

        let exts: Vec<String> = vec!["tif".into(), "img".into()];
        let rasters = list_rasters(dir.path(), &exts).unwrap();
        let names: Vec<String> = rasters
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.img", "b.TIF"]);

        assert!(matches!(
            list_rasters(&dir.path().join("missing"), &exts),
            Err(ZStatsError::InputNotFound(_))
        ));
    }
}
