//! georeferencing metadata of a raster, formatted for Earth Engine ingestion.
//!
//! When creating a raster you first define the projection, then the upper-left x/y and the
//! pixel size (the transform), then the matrix of values. Earth Engine wants the transform as
//! `[x scale, x shear, x translation, y shear, y scale, y translation]`, GDAL stores it as
//! `[origin x, pixel width, row rotation, origin y, column rotation, pixel height]`.

use gdal::{spatial_ref::SpatialRef, Dataset, GeoTransform};
use std::{fs, path::Path};

use crate::errors::{Result, ZStatsError};

fn print_section(title: &str, body: &str) {
    let rule = "=".repeat(50);
    println!("{}\n{}\n{}", rule, title, rule);
    println!("{}", body);
    println!("\n");
}

fn open_raster(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(ZStatsError::InputNotFound(path.to_path_buf()));
    }
    Ok(Dataset::open(path)?)
}

/// reorders a GDAL geotransform into the Earth Engine affine transform
pub fn gee_transform(gt: &GeoTransform) -> [f64; 6] {
    [gt[1], gt[2], gt[0], gt[4], gt[5], gt[3]]
}

/// the transform of a raster in GDAL order
pub fn get_transform(path: &Path) -> Result<GeoTransform> {
    let gt = open_raster(path)?.geo_transform()?;
    print_section("Transform", &format!("{:?}", gt));
    Ok(gt)
}

/// the transform of a raster exactly how Earth Engine ingests it
pub fn get_transform_for_gee(path: &Path) -> Result<[f64; 6]> {
    let gt = open_raster(path)?.geo_transform()?;
    let reordered = gee_transform(&gt);
    print_section("Transform formatted for GEE", &format!("{:?}", reordered));
    Ok(reordered)
}

/// the projection of a raster as well-known text
pub fn get_projection_wkt(path: &Path) -> Result<String> {
    let wkt = open_raster(path)?.projection();
    print_section("Projection Well-Known Text", &wkt);
    Ok(wkt)
}

pub fn convert_wkt_to_proj4(wkt: &str) -> Result<String> {
    let proj4 = SpatialRef::from_wkt(wkt)?.to_proj4()?;
    print_section("Proj4", &proj4);
    Ok(proj4)
}

/// the definitions derived from an ESRI `.prj` file
#[derive(Debug, Clone, PartialEq)]
pub struct PrjStandards {
    pub prj: String,
    pub wkt: String,
    pub proj4: String,
    /// None if no EPSG code could be identified
    pub epsg: Option<i32>,
}

/// reads an ESRI `.prj` file and converts it to OGC WKT, Proj4 and (if it can be identified)
/// an EPSG code
pub fn esri_prj_to_standards(prj_path: &Path) -> Result<PrjStandards> {
    let prj = fs::read_to_string(prj_path)
        .map_err(|_| ZStatsError::InputNotFound(prj_path.to_path_buf()))?;
    let prj = prj.trim().to_string();

    let mut srs = SpatialRef::from_esri(&prj)?;
    let wkt = srs.to_wkt()?;
    let proj4 = srs.to_proj4()?;
    let epsg = match srs.auto_identify_epsg() {
        Ok(()) => srs.auth_code().ok(),
        Err(_) => None,
    };

    println!("Shape prj is: {}", prj);
    println!("WKT is: {}", wkt);
    println!("Proj4 is: {}", proj4);
    match epsg {
        Some(code) => println!("EPSG is: {}", code),
        None => println!("EPSG is: unknown"),
    }

    Ok(PrjStandards {
        prj,
        wkt,
        proj4,
        epsg,
    })
}

/// the full metadata report of a raster: projection WKT, Proj4 and the Earth Engine transform
pub fn report(path: &Path) -> Result<()> {
    let wkt = get_projection_wkt(path)?;
    if !wkt.is_empty() {
        convert_wkt_to_proj4(&wkt)?;
    }
    get_transform(path)?;
    get_transform_for_gee(path)?;
    Ok(())
}
