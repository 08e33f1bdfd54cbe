use crate::config::AppConfig;
use crate::layers::{self, format_quantity, MapLayer};
use crate::types::{Crop, Dataset, Organization};
use anyhow::Result;
use serde::Serialize;
use tracing::info;

pub const MARKER_LAYER_NAME: &str = "Partner Organizations";

/// The fully assembled map: everything the renderer and the embed API need.
#[derive(Debug, Serialize)]
pub struct MapDocument {
    pub title: String,
    /// (latitude, longitude)
    pub center: [f64; 2],
    pub zoom: u8,
    pub layers: Vec<MapLayer>,
    pub markers: MarkerLayer,
    pub tables: Vec<SummaryTable>,
}

#[derive(Debug, Serialize)]
pub struct MarkerLayer {
    pub name: String,
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Serialize)]
pub struct SummaryTable {
    pub title: String,
    pub rows: Vec<SummaryRow>,
}

#[derive(Debug, Serialize)]
pub struct SummaryRow {
    pub country: String,
    pub production: f64,
    pub label: String,
}

/// Compose base map, production layers, the marker layer, and the summary
/// tables. Layer order is insertion order: crop, then ascending year.
pub fn assemble(config: &AppConfig, dataset: &Dataset) -> Result<MapDocument> {
    let layers = layers::build_layers(config, &dataset.regions)?;
    info!("Assembled {} production layers", layers.len());

    Ok(MapDocument {
        title: config.title.clone(),
        center: config.map.center,
        zoom: config.map.zoom,
        layers,
        markers: MarkerLayer {
            name: MARKER_LAYER_NAME.to_string(),
            organizations: dataset.organizations.clone(),
        },
        tables: summary_tables(config, dataset),
    })
}

/// National totals per crop for the reference year, largest producers first.
fn summary_tables(config: &AppConfig, dataset: &Dataset) -> Vec<SummaryTable> {
    let year = config.map.reference_year;
    let mut tables = Vec::new();

    for crop in Crop::ALL {
        let mut rows: Vec<SummaryRow> = dataset
            .country_totals
            .iter()
            .filter(|t| t.crop == crop && t.year == year)
            .map(|t| SummaryRow {
                country: t.country.clone(),
                production: t.production,
                label: format_quantity(t.production),
            })
            .collect();
        if rows.is_empty() {
            continue;
        }
        rows.sort_by(|a, b| {
            b.production
                .partial_cmp(&a.production)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.country.cmp(&b.country))
        });
        tables.push(SummaryTable {
            title: format!("{} Production by Country, {}", crop.label(), year),
            rows,
        });
    }

    tables
}
