use anyhow::anyhow;
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The crops this map knows how to style. Anything else is a caller error,
/// surfaced by `FromStr` / `AppConfig::crop_config` rather than a default color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crop {
    BrazilNut,
    Soy,
}

impl Crop {
    pub const ALL: [Crop; 2] = [Crop::BrazilNut, Crop::Soy];

    pub fn label(&self) -> &'static str {
        match self {
            Crop::BrazilNut => "Brazil Nut",
            Crop::Soy => "Soy",
        }
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Crop {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brazil_nut" => Ok(Crop::BrazilNut),
            "soy" => Ok(Crop::Soy),
            other => Err(anyhow!("unsupported crop: '{}'", other)),
        }
    }
}

/// One administrative region: geometry plus whatever production values the
/// join found for it. Regions with no production rows keep an empty map.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    // Crop -> year -> metric tons. Absent entries mean "no data", not zero.
    pub production: BTreeMap<Crop, BTreeMap<u16, f64>>,
}

impl Region {
    pub fn value(&self, crop: Crop, year: u16) -> Option<f64> {
        self.production.get(&crop).and_then(|by_year| by_year.get(&year)).copied()
    }

    pub fn has_data(&self, crop: Crop) -> bool {
        self.production.get(&crop).map_or(false, |by_year| !by_year.is_empty())
    }
}

/// A partner organization rendered as a point marker, independent of the
/// production data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// National-level totals backing the summary tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryTotal {
    pub country: String,
    pub crop: Crop,
    pub year: u16,
    pub production: f64,
}

/// Everything the loader produces; held immutably for the session.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub regions: Vec<Region>,
    pub organizations: Vec<Organization>,
    pub country_totals: Vec<CountryTotal>,
}
