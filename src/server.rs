use crate::config::AppConfig;
use crate::map::MapDocument;
use crate::render;
use crate::types::{Crop, Region};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    response::{Html, Json},
    routing::get,
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

// Wrapper for RTree indexing
struct RegionIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    regions: Vec<Region>,
    tree: RTree<RegionIndex>,
    page: String,
    document: serde_json::Value,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    id: String,
    name: String,
    production: BTreeMap<Crop, BTreeMap<u16, f64>>,
}

fn build_index(regions: &[Region]) -> RTree<RegionIndex> {
    let items: Vec<RegionIndex> = regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let rect = region.geometry.bounding_rect().unwrap_or(Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));
            RegionIndex {
                index: i,
                aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            }
        })
        .collect();
    RTree::bulk_load(items)
}

fn lookup<'a>(tree: &RTree<RegionIndex>, regions: &'a [Region], lon: f64, lat: f64) -> Option<&'a Region> {
    let point = Point::new(lon, lat);
    let envelope = AABB::from_point([lon, lat]);
    tree.locate_in_envelope_intersecting(&envelope)
        .filter_map(|candidate| regions.get(candidate.index))
        .find(|region| region.geometry.contains(&point))
}

/// Serve the rendered map page plus a small JSON API for dashboard embeds.
pub async fn start_server(config: AppConfig, document: MapDocument, regions: Vec<Region>) -> Result<()> {
    let page = render::to_html(&document)?;
    let document = serde_json::to_value(&document).context("Failed to serialize map document")?;

    info!("Building spatial index for {} regions...", regions.len());
    let tree = build_index(&regions);

    let state = Arc::new(AppState { regions, tree, page, document });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/", get(page_handler))
        .route("/api/document", get(document_handler))
        .route("/api/query", get(query_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn document_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.document.clone())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let found = lookup(&state.tree, &state.regions, params.lon, params.lat);
    Json(found.map(|region| QueryResponse {
        id: region.id.clone(),
        name: region.name.clone(),
        production: region.production.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};
    use std::collections::BTreeMap;

    fn square_region(id: &str, offset: f64) -> Region {
        Region {
            id: id.to_string(),
            name: format!("Region {}", id),
            geometry: MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![
                    (offset, offset),
                    (offset + 1.0, offset),
                    (offset + 1.0, offset + 1.0),
                    (offset, offset + 1.0),
                    (offset, offset),
                ]),
                vec![],
            )]),
            production: BTreeMap::new(),
        }
    }

    #[test]
    fn lookup_finds_the_containing_region() {
        let regions = vec![square_region("a", 0.0), square_region("b", 10.0)];
        let tree = build_index(&regions);

        assert_eq!(lookup(&tree, &regions, 0.5, 0.5).map(|r| r.id.as_str()), Some("a"));
        assert_eq!(lookup(&tree, &regions, 10.5, 10.2).map(|r| r.id.as_str()), Some("b"));
        assert!(lookup(&tree, &regions, 5.0, 5.0).is_none());
    }
}
