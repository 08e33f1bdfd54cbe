use crate::scale::ColorScale;
use crate::types::Crop;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub title: String,
    pub input: InputConfig,
    pub map: MapConfig,
    pub server: ServerConfig,
    pub crops: BTreeMap<Crop, CropConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Boundary geometry, `.geojson`/`.json` or `.shp`.
    pub boundaries: PathBuf,
    pub join_column_boundaries: String,
    pub name_column: String,
    pub production: Vec<ProductionSource>,
    pub organizations: PathBuf,
    pub country_totals: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProductionSource {
    pub crop: Crop,
    pub path: PathBuf,
    /// Column in the CSV holding the region identifier (or name, for sources
    /// keyed by region name).
    pub join_column: String,
    pub years: Vec<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    /// (latitude, longitude) the base map is centered on.
    pub center: [f64; 2],
    pub zoom: u8,
    pub primary_crop: Crop,
    pub reference_year: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CropConfig {
    /// Drop regions with no data for this crop from its layers instead of
    /// painting the whole boundary set in the no-data fill.
    #[serde(default)]
    pub skip_missing: bool,
    #[serde(flatten)]
    pub style: ColorScale,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Style for a crop; missing configuration is a contract violation, not a
    /// fallback color.
    pub fn crop_config(&self, crop: Crop) -> Result<&CropConfig> {
        self.crops
            .get(&crop)
            .ok_or_else(|| anyhow!("unsupported crop: no color scale configured for '{}'", crop))
    }

    /// Production sources in the fixed crop order, years ascending.
    pub fn production_sources(&self) -> Vec<&ProductionSource> {
        let mut sources: Vec<&ProductionSource> = Vec::new();
        for crop in Crop::ALL {
            sources.extend(self.input.production.iter().filter(|s| s.crop == crop));
        }
        sources
    }

    /// The single layer shown on load: latest configured year of the primary crop.
    pub fn default_layer_key(&self) -> Result<(Crop, u16)> {
        let primary = self.map.primary_crop;
        let latest = self
            .input
            .production
            .iter()
            .filter(|s| s.crop == primary)
            .flat_map(|s| s.years.iter().copied())
            .max()
            .ok_or_else(|| anyhow!("primary crop '{}' has no production source", primary))?;
        Ok((primary, latest))
    }

    fn validate(&self) -> Result<()> {
        for (crop, crop_config) in &self.crops {
            crop_config
                .style
                .validate()
                .with_context(|| format!("invalid color scale for crop '{}'", crop))?;
        }
        let mut seen = BTreeSet::new();
        for source in &self.input.production {
            self.crop_config(source.crop)?;
            if source.years.is_empty() {
                return Err(anyhow!("production source for '{}' lists no years", source.crop));
            }
            for year in &source.years {
                // One layer per (crop, year); a repeat would produce duplicate
                // layer names and a second default-visible layer.
                if !seen.insert((source.crop, *year)) {
                    return Err(anyhow!("duplicate production source for '{}' year {}", source.crop, year));
                }
            }
        }
        self.crop_config(self.map.primary_crop)?;
        self.default_layer_key()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
title = "Brazil Nut and Soy Production in the Amazon Basin"

[input]
boundaries = "data/BR_Municipios_2021.geojson"
join_column_boundaries = "CD_MUN"
name_column = "NM_MUN"
organizations = "data/organizations.csv"
country_totals = "data/country_totals.csv"

[[input.production]]
crop = "brazil_nut"
path = "data/bra_castana_production_by_municipality.csv"
join_column = "CD_MUN"
years = [2018, 2019, 2020, 2021, 2022]

[[input.production]]
crop = "soy"
path = "data/bra_soy_production_by_municipality.csv"
join_column = "CD_MUN"
years = [2020, 2021, 2022]

[map]
center = [-3.4653, -62.2159]
zoom = 5
primary_crop = "brazil_nut"
reference_year = 2022

[server]
port = 8080

[crops.brazil_nut]
skip_missing = true
dim_opacity = 0.01
visibility_floor = 200.0
scale = [
    { from = 1.0, color = "#fdccb8" },
    { from = 200.0, color = "#fc8f6f" },
    { from = 1000.0, color = "#f44d37" },
    { from = 2000.0, color = "#c5161b" },
    { from = 3000.0, color = "#67000d" },
]

[crops.soy]
dim_opacity = 0.1
visibility_floor = 1000.0
no_data_color = "#f7fbff"
scale = [
    { from = 1.0, color = "#c6dbef" },
    { from = 1000.0, color = "#6baed6" },
    { from = 10000.0, color = "#2171b5" },
    { from = 100000.0, color = "#08306b" },
]
"##;

    fn parse_sample() -> AppConfig {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn parses_and_validates_sample_config() {
        let config = parse_sample();
        assert_eq!(config.map.zoom, 5);
        assert!(config.crops[&Crop::BrazilNut].skip_missing);
        assert!(!config.crops[&Crop::Soy].skip_missing);
        assert_eq!(config.crops[&Crop::Soy].style.fill_opacity, 0.75);
    }

    #[test]
    fn default_layer_is_latest_primary_year() {
        let config = parse_sample();
        assert_eq!(config.default_layer_key().unwrap(), (Crop::BrazilNut, 2022));
    }

    #[test]
    fn sources_come_back_in_crop_then_declaration_order() {
        let config = parse_sample();
        let crops: Vec<Crop> = config.production_sources().iter().map(|s| s.crop).collect();
        assert_eq!(crops, vec![Crop::BrazilNut, Crop::Soy]);
    }

    #[test]
    fn unknown_crop_key_is_rejected() {
        let broken = SAMPLE.replace("[crops.soy]", "[crops.cassava]");
        assert!(toml::from_str::<AppConfig>(&broken).is_err());
    }

    #[test]
    fn unordered_scale_is_rejected() {
        let broken = SAMPLE.replace("{ from = 1000.0, color = \"#f44d37\" }", "{ from = 2.0, color = \"#f44d37\" }");
        let config: AppConfig = toml::from_str(&broken).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn repeated_year_within_a_source_is_rejected() {
        let broken = SAMPLE.replace("years = [2018, 2019, 2020, 2021, 2022]", "years = [2022, 2022]");
        let config: AppConfig = toml::from_str(&broken).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate production source"));
    }

    #[test]
    fn two_sources_may_not_share_a_crop_year() {
        let mut config = parse_sample();
        let mut extra = config.input.production[1].clone();
        extra.years = vec![2022];
        config.input.production.push(extra);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate production source"));
    }

    #[test]
    fn primary_crop_must_have_a_source() {
        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.input.production.retain(|s| s.crop != Crop::BrazilNut);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no production source"));
    }
}
