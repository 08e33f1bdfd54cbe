use crate::config::{AppConfig, ProductionSource};
use crate::types::{CountryTotal, Crop, Dataset, Organization, Region};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

// id -> year -> metric tons, for one crop.
type ProductionByRegion = HashMap<String, BTreeMap<u16, f64>>;

pub fn load_data(config: &AppConfig) -> Result<Dataset> {
    info!("Loading data...");

    // 1. Production CSVs, one per crop
    let mut production: Vec<(Crop, ProductionByRegion)> = Vec::new();
    for source in &config.input.production {
        let file = File::open(&source.path)
            .with_context(|| format!("Failed to open production CSV: {:?}", source.path))?;
        let by_region = read_production_csv(file, source)?;
        info!("Loaded {} production rows for {}", by_region.len(), source.crop);
        production.push((source.crop, by_region));
    }

    // 2. Geometry (GeoJSON or Shapefile), left-joined onto the production maps
    let extension = config
        .input
        .boundaries
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Boundary geometry file has no extension"))?;

    let regions = match extension.as_str() {
        "json" | "geojson" => {
            let file = File::open(&config.input.boundaries)
                .with_context(|| format!("Failed to open GeoJSON file: {:?}", config.input.boundaries))?;
            regions_from_geojson(BufReader::new(file), config, &production)?
        }
        "shp" => regions_from_shapefile(&config.input.boundaries, config, &production)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };
    info!("Loaded and joined geometry for {} regions", regions.len());

    // 3. Static assets: organization markers and country totals
    let organizations = read_organizations(open(&config.input.organizations)?)
        .with_context(|| format!("Failed to read organizations: {:?}", config.input.organizations))?;
    let country_totals = read_country_totals(open(&config.input.country_totals)?)
        .with_context(|| format!("Failed to read country totals: {:?}", config.input.country_totals))?;
    info!(
        "Loaded {} organizations, {} country totals",
        organizations.len(),
        country_totals.len()
    );

    Ok(Dataset { regions, organizations, country_totals })
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open: {:?}", path))
}

/// Parse one crop's production CSV into an id -> year -> tons map.
///
/// Blank cells are "no data" and simply stay absent (the Color Mapper handles
/// them as null later on); any other unparseable cell is a load error.
pub fn read_production_csv(reader: impl Read, source: &ProductionSource) -> Result<ProductionByRegion> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let join_idx = headers
        .iter()
        .position(|h| h == source.join_column)
        .ok_or_else(|| anyhow!("Join column '{}' not found in production CSV", source.join_column))?;

    let mut year_columns: Vec<(u16, usize)> = Vec::new();
    for year in &source.years {
        let idx = headers
            .iter()
            .position(|h| h == year.to_string())
            .ok_or_else(|| anyhow!("Year column '{}' not found in production CSV", year))?;
        year_columns.push((*year, idx));
    }

    let mut by_region = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let id = record.get(join_idx).unwrap_or("").trim().to_string();
        if id.is_empty() {
            continue;
        }

        let mut by_year = BTreeMap::new();
        for (year, idx) in &year_columns {
            let cell = record.get(*idx).unwrap_or("").trim();
            if cell.is_empty() {
                continue; // no data, not an error
            }
            let value: f64 = cell.parse().with_context(|| {
                format!("Invalid production value '{}' for region '{}', year {}", cell, id, year)
            })?;
            by_year.insert(*year, value);
        }
        if !by_year.is_empty() {
            by_region.insert(id, by_year);
        }
    }

    Ok(by_region)
}

fn attach_production(id: &str, production: &[(Crop, ProductionByRegion)]) -> BTreeMap<Crop, BTreeMap<u16, f64>> {
    let mut joined = BTreeMap::new();
    for (crop, by_region) in production {
        if let Some(by_year) = by_region.get(id) {
            joined.insert(*crop, by_year.clone());
        }
    }
    joined
}

/// Left join: every boundary feature becomes a `Region`, with or without
/// production rows, so full-table layers can still paint the no-data fill.
pub fn regions_from_geojson(
    reader: impl Read,
    config: &AppConfig,
    production: &[(Crop, ProductionByRegion)],
) -> Result<Vec<Region>> {
    use geojson::GeoJson;

    let geojson = GeoJson::from_reader(reader).context("Failed to parse boundary GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Boundary GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();
    for feature in collection.features {
        let props = match feature.properties.as_ref() {
            Some(props) => props,
            None => continue,
        };

        let id = match props.get(&config.input.join_column_boundaries) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue, // No usable join key
        };
        let name = match props.get(&config.input.name_column) {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => id.clone(),
        };

        let geometry = match feature.geometry {
            Some(geometry) => {
                let converted: geo::Geometry<f64> = geometry
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match converted {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        regions.push(Region {
            production: attach_production(&id, production),
            id,
            name,
            geometry,
        });
    }

    Ok(regions)
}

fn regions_from_shapefile(
    path: &Path,
    config: &AppConfig,
    production: &[(Crop, ProductionByRegion)],
) -> Result<Vec<Region>> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut regions = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let id = match field_as_string(&record, &config.input.join_column_boundaries) {
            Some(id) => id,
            None => continue,
        };
        let name = field_as_string(&record, &config.input.name_column).unwrap_or_else(|| id.clone());

        let geometry = match shape {
            shapefile::Shape::Polygon(polygon) => {
                let mp: MultiPolygon<f64> = polygon
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?;
                mp
            }
            shapefile::Shape::PolygonM(polygon) => {
                let mp: MultiPolygon<f64> = polygon
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?;
                mp
            }
            shapefile::Shape::PolygonZ(polygon) => {
                let mp: MultiPolygon<f64> = polygon
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?;
                mp
            }
            _ => continue, // Skip non-polygon shapes
        };

        regions.push(Region {
            production: attach_production(&id, production),
            id,
            name,
            geometry,
        });
    }

    Ok(regions)
}

fn field_as_string(record: &shapefile::dbase::Record, field: &str) -> Option<String> {
    match record.get(field) {
        Some(shapefile::dbase::FieldValue::Character(Some(s))) => Some(s.clone()),
        Some(shapefile::dbase::FieldValue::Numeric(Some(n))) => Some(n.to_string()),
        _ => None,
    }
}

pub fn read_organizations(reader: impl Read) -> Result<Vec<Organization>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let mut organizations = Vec::new();
    for result in rdr.deserialize() {
        let org: Organization = result.context("Malformed organization row")?;
        organizations.push(org);
    }
    Ok(organizations)
}

pub fn read_country_totals(reader: impl Read) -> Result<Vec<CountryTotal>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let mut totals = Vec::new();
    for result in rdr.deserialize() {
        let total: CountryTotal = result.context("Malformed country total row")?;
        totals.push(total);
    }
    Ok(totals)
}
