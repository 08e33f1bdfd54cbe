use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Fill styling for one feature: a hex color plus fill opacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub color: String,
    pub opacity: f64,
}

/// One bucket boundary: values from `from` (inclusive) up to the next stop's
/// `from` (exclusive) take `color`. The last stop is open-ended.
#[derive(Debug, Clone, Deserialize)]
pub struct ScaleStop {
    pub from: f64,
    pub color: String,
}

/// An ordered threshold color scale for a single crop.
///
/// Buckets below `visibility_floor` are drawn at `dim_opacity` so that
/// near-zero production does not dominate the map; null, non-positive, and
/// below-first-threshold values get the near-invisible no-data fill.
#[derive(Debug, Clone, Deserialize)]
pub struct ColorScale {
    pub scale: Vec<ScaleStop>,
    #[serde(default = "default_no_data_color")]
    pub no_data_color: String,
    #[serde(default = "default_no_data_opacity")]
    pub no_data_opacity: f64,
    #[serde(default = "default_fill_opacity")]
    pub fill_opacity: f64,
    pub dim_opacity: f64,
    pub visibility_floor: f64,
}

fn default_no_data_color() -> String {
    "#fff5f0".to_string()
}

fn default_no_data_opacity() -> f64 {
    0.01
}

fn default_fill_opacity() -> f64 {
    0.75
}

impl ColorScale {
    /// Pure value-to-fill mapping. Left-inclusive bucketing: a value equal to
    /// a stop's `from` belongs to the bucket that starts there.
    pub fn fill(&self, value: Option<f64>) -> Fill {
        let v = match value {
            Some(v) if v > 0.0 => v,
            _ => return self.no_data(),
        };

        match self.scale.iter().rev().find(|stop| stop.from <= v) {
            Some(stop) => Fill {
                color: stop.color.clone(),
                opacity: if stop.from >= self.visibility_floor {
                    self.fill_opacity
                } else {
                    self.dim_opacity
                },
            },
            // Positive but below the first threshold.
            None => self.no_data(),
        }
    }

    pub fn no_data(&self) -> Fill {
        Fill {
            color: self.no_data_color.clone(),
            opacity: self.no_data_opacity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale.is_empty() {
            return Err(anyhow!("color scale has no stops"));
        }
        for pair in self.scale.windows(2) {
            if pair[1].from <= pair[0].from {
                return Err(anyhow!(
                    "color scale thresholds must be strictly increasing ({} then {})",
                    pair[0].from,
                    pair[1].from
                ));
            }
        }
        for stop in &self.scale {
            validate_hex(&stop.color)?;
        }
        validate_hex(&self.no_data_color)
    }
}

fn validate_hex(color: &str) -> Result<()> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(anyhow!("invalid hex color: '{}'", color))
    }
}
