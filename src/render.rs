use crate::layers::escape_html;
use crate::map::MapDocument;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

const TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>__TITLE__</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
  body { margin: 0; font-family: system-ui, sans-serif; }
  h1 { font-size: 1.3rem; margin: 0.75rem 1rem; }
  #map { height: 70vh; margin: 0 1rem; }
  #tables { display: flex; flex-wrap: wrap; gap: 2rem; margin: 1rem; }
  table { border-collapse: collapse; font-size: 0.9rem; }
  caption { font-weight: 600; margin-bottom: 0.25rem; text-align: left; }
  th, td { border: 1px solid #ccc; padding: 0.25rem 0.6rem; text-align: left; }
  td.qty { text-align: right; }
</style>
</head>
<body>
<h1>__TITLE__</h1>
<div id="map"></div>
<section id="tables">__TABLES__</section>
<script>
var doc = __DOCUMENT_JSON__;

var map = L.map('map', { preferCanvas: true }).setView(doc.center, doc.zoom);
L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
  maxZoom: 19,
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);

var overlays = {};
doc.layers.forEach(function (layer) {
  var group = L.geoJSON({ type: 'FeatureCollection', features: layer.features }, {
    style: function (feature) { return feature.properties.style; },
    onEachFeature: function (feature, path) {
      path.bindTooltip(feature.properties.tooltip, { sticky: true });
      path.on('mouseover', function () { path.setStyle(feature.properties.highlight); });
      path.on('mouseout', function () { path.setStyle(feature.properties.style); });
    }
  });
  overlays[layer.name] = group;
  if (layer.show) { group.addTo(map); }
});

var markers = L.layerGroup(doc.markers.organizations.map(function (org) {
  return L.marker([org.latitude, org.longitude]).bindTooltip(org.name);
}));
markers.addTo(map);
overlays[doc.markers.name] = markers;

L.control.layers(null, overlays, { collapsed: false }).addTo(map);
</script>
</body>
</html>
"#;

/// Render the assembled document into a self-contained Leaflet page.
pub fn to_html(document: &MapDocument) -> Result<String> {
    let json = serde_json::to_string(document).context("Failed to serialize map document")?;
    // Keep embedded strings from terminating the script block early.
    let json = json.replace("</", "<\\/");

    Ok(TEMPLATE
        .replace("__TITLE__", &escape_html(&document.title))
        .replace("__TABLES__", &tables_html(document))
        .replace("__DOCUMENT_JSON__", &json))
}

pub fn write_html(document: &MapDocument, path: &Path) -> Result<()> {
    let html = to_html(document)?;
    fs::write(path, html).with_context(|| format!("Failed to write map page: {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}

fn tables_html(document: &MapDocument) -> String {
    let mut html = String::new();
    for table in &document.tables {
        html.push_str("<table><caption>");
        html.push_str(&escape_html(&table.title));
        html.push_str("</caption><tr><th>Country</th><th>Metric tons</th></tr>");
        for row in &table.rows {
            html.push_str("<tr><td>");
            html.push_str(&escape_html(&row.country));
            html.push_str("</td><td class=\"qty\">");
            html.push_str(&escape_html(&row.label));
            html.push_str("</td></tr>");
        }
        html.push_str("</table>");
    }
    html
}
