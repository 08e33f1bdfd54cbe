use crate::config::{AppConfig, CropConfig};
use crate::scale::Fill;
use crate::types::{Crop, Region};
use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;

pub const BORDER_COLOR: &str = "#000000";
pub const BORDER_WEIGHT: f64 = 0.5;
pub const HIGHLIGHT_COLOR: &str = "#ffff00";
pub const HIGHLIGHT_WEIGHT: f64 = 1.5;

/// Leaflet path options for one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    pub fill_color: String,
    pub color: String,
    pub weight: f64,
    pub fill_opacity: f64,
}

impl FeatureStyle {
    fn base(fill: &Fill) -> Self {
        FeatureStyle {
            fill_color: fill.color.clone(),
            color: BORDER_COLOR.to_string(),
            weight: BORDER_WEIGHT,
            fill_opacity: fill.opacity,
        }
    }

    /// Hover style: fixed highlight fill, heavier border, same opacity as base.
    fn highlight(fill: &Fill) -> Self {
        FeatureStyle {
            fill_color: HIGHLIGHT_COLOR.to_string(),
            color: BORDER_COLOR.to_string(),
            weight: HIGHLIGHT_WEIGHT,
            fill_opacity: fill.opacity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeatureProperties {
    pub name: String,
    pub value: Option<f64>,
    pub tooltip: String,
    pub style: FeatureStyle,
    pub highlight: FeatureStyle,
}

/// Serializes as a GeoJSON Feature so the renderer can hand the whole layer
/// to Leaflet unchanged.
#[derive(Debug, Serialize)]
pub struct LayerFeature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: geojson::Geometry,
    pub properties: FeatureProperties,
}

/// One toggleable (crop, year) overlay.
#[derive(Debug, Serialize)]
pub struct MapLayer {
    pub name: String,
    pub crop: Crop,
    pub year: u16,
    pub show: bool,
    pub features: Vec<LayerFeature>,
}

pub fn layer_name(crop: Crop, year: u16) -> String {
    format!("{} {} Production", year, crop.label())
}

/// Build every (crop, year) layer in crop-then-ascending-year order. Layers
/// are independent, so they are built in parallel; the indexed collect keeps
/// the order stable.
pub fn build_layers(config: &AppConfig, regions: &[Region]) -> Result<Vec<MapLayer>> {
    let default_key = config.default_layer_key()?;

    let mut jobs: Vec<(Crop, u16, &CropConfig)> = Vec::new();
    for source in config.production_sources() {
        let crop_config = config.crop_config(source.crop)?;
        let mut years = source.years.clone();
        years.sort_unstable();
        for year in years {
            jobs.push((source.crop, year, crop_config));
        }
    }

    let layers = jobs
        .par_iter()
        .map(|(crop, year, crop_config)| {
            build_layer(regions, *crop, *year, crop_config, (*crop, *year) == default_key)
        })
        .collect();
    Ok(layers)
}

/// Build a single layer. Reads the shared region table, never mutates it.
pub fn build_layer(
    regions: &[Region],
    crop: Crop,
    year: u16,
    crop_config: &CropConfig,
    show: bool,
) -> MapLayer {
    let features = regions
        .iter()
        .filter(|region| !crop_config.skip_missing || region.has_data(crop))
        .map(|region| {
            let value = region.value(crop, year);
            let fill = crop_config.style.fill(value);
            let value_label = match value {
                Some(v) => format_quantity(v),
                None => "no data".to_string(),
            };
            LayerFeature {
                kind: "Feature",
                geometry: geojson::Geometry::new(geojson::Value::from(&region.geometry)),
                properties: FeatureProperties {
                    tooltip: format!(
                        "<b>{}</b><br/>{} {} Production: {}",
                        escape_html(&region.name),
                        year,
                        crop.label(),
                        value_label
                    ),
                    name: region.name.clone(),
                    value,
                    style: FeatureStyle::base(&fill),
                    highlight: FeatureStyle::highlight(&fill),
                },
            }
        })
        .collect();

    MapLayer { name: layer_name(crop, year), crop, year, show, features }
}

/// Localized quantity formatting: thousands separators, at most one decimal.
pub fn format_quantity(value: f64) -> String {
    let tenths = (value * 10.0).round() as i64;
    let whole = (tenths / 10).abs();
    let frac = (tenths % 10).abs();
    let sign = if tenths < 0 { "-" } else { "" };

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if frac == 0 {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::{ColorScale, ScaleStop};
    use geo::{LineString, MultiPolygon, Polygon};
    use std::collections::BTreeMap;

    fn square(offset: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (offset, offset),
                (offset + 1.0, offset),
                (offset + 1.0, offset + 1.0),
                (offset, offset),
            ]),
            vec![],
        )])
    }

    fn region(id: &str, name: &str, crop_values: &[(Crop, u16, f64)]) -> Region {
        let mut production: BTreeMap<Crop, BTreeMap<u16, f64>> = BTreeMap::new();
        for (crop, year, value) in crop_values {
            production.entry(*crop).or_default().insert(*year, *value);
        }
        Region { id: id.to_string(), name: name.to_string(), geometry: square(0.0), production }
    }

    fn crop_config(skip_missing: bool) -> CropConfig {
        CropConfig {
            skip_missing,
            style: ColorScale {
                scale: vec![
                    ScaleStop { from: 1.0, color: "#fdccb8".into() },
                    ScaleStop { from: 200.0, color: "#fc8f6f".into() },
                ],
                no_data_color: "#fff5f0".into(),
                no_data_opacity: 0.01,
                fill_opacity: 0.75,
                dim_opacity: 0.01,
                visibility_floor: 200.0,
            },
        }
    }

    fn regions() -> Vec<Region> {
        vec![
            region("1", "Alta Floresta", &[(Crop::BrazilNut, 2022, 1500.0)]),
            region("2", "Ariquemes", &[(Crop::Soy, 2022, 80000.0)]),
        ]
    }

    #[test]
    fn layer_derives_name_from_crop_and_year() {
        let layer = build_layer(&regions(), Crop::BrazilNut, 2022, &crop_config(false), true);
        assert_eq!(layer.name, "2022 Brazil Nut Production");
    }

    #[test]
    fn skip_missing_restricts_to_regions_with_data() {
        let all = build_layer(&regions(), Crop::BrazilNut, 2022, &crop_config(false), false);
        assert_eq!(all.features.len(), 2);

        let restricted = build_layer(&regions(), Crop::BrazilNut, 2022, &crop_config(true), false);
        assert_eq!(restricted.features.len(), 1);
        assert_eq!(restricted.features[0].properties.name, "Alta Floresta");
    }

    #[test]
    fn feature_styling_comes_from_the_color_scale() {
        let layer = build_layer(&regions(), Crop::BrazilNut, 2022, &crop_config(true), false);
        let props = &layer.features[0].properties;
        assert_eq!(props.style.fill_color, "#fc8f6f");
        assert_eq!(props.style.fill_opacity, 0.75);
        assert_eq!(props.style.weight, BORDER_WEIGHT);
        // Highlight: fixed fill, heavier border, base opacity.
        assert_eq!(props.highlight.fill_color, HIGHLIGHT_COLOR);
        assert_eq!(props.highlight.weight, HIGHLIGHT_WEIGHT);
        assert_eq!(props.highlight.fill_opacity, props.style.fill_opacity);
    }

    #[test]
    fn tooltip_shows_localized_value_or_no_data() {
        let layer = build_layer(&regions(), Crop::BrazilNut, 2022, &crop_config(false), false);
        let with_data = &layer.features[0].properties;
        assert_eq!(with_data.tooltip, "<b>Alta Floresta</b><br/>2022 Brazil Nut Production: 1,500");
        let without = &layer.features[1].properties;
        assert!(without.tooltip.ends_with("2022 Brazil Nut Production: no data"));
        assert_eq!(without.value, None);
    }

    #[test]
    fn tooltip_escapes_region_names() {
        let rows = vec![region("1", "S<ã>o & Félix", &[])];
        let layer = build_layer(&rows, Crop::Soy, 2022, &crop_config(false), false);
        assert!(layer.features[0].properties.tooltip.contains("S&lt;ã&gt;o &amp; Félix"));
    }

    #[test]
    fn quantities_group_thousands() {
        assert_eq!(format_quantity(0.0), "0");
        assert_eq!(format_quantity(5.0), "5");
        assert_eq!(format_quantity(999.96), "1,000");
        assert_eq!(format_quantity(1234.0), "1,234");
        assert_eq!(format_quantity(1234567.5), "1,234,567.5");
        assert_eq!(format_quantity(-1234.5), "-1,234.5");
    }
}
