//! Style documents for every layer the crate puts on the map.
//!
//! Breakpoints are presentation tuning. The one hard rule is that the heatmap
//! opacity reaches zero at or before the layer's max zoom, so close zooms show
//! discrete markers instead of a smear.

use crate::config::{HeatmapConfig, MarkerConfig};
use crate::surface::{LayerSpec, LayerType};
use geojson::{JsonObject, JsonValue};
use serde_json::json;

pub const AGENTS_SOURCE: &str = "agents";
pub const CLUSTERS_LAYER: &str = "clusters";
pub const CLUSTER_COUNT_LAYER: &str = "cluster-count";
pub const UNCLUSTERED_LAYER: &str = "unclustered-point";

pub const HEATMAP_SOURCE: &str = "agents-heatmap";
pub const HEATMAP_LAYER: &str = "agents-heatmap-layer";

pub const SELECTION_SOURCE: &str = "selection-polygon";
pub const SELECTION_FILL_LAYER: &str = "selection-polygon-fill";
pub const SELECTION_OUTLINE_LAYER: &str = "selection-polygon-outline";
pub const DRAWING_POINTS_SOURCE: &str = "drawing-points";
pub const DRAWING_POINTS_LAYER: &str = "drawing-points";
pub const DRAWING_LINE_SOURCE: &str = "drawing-line";
pub const DRAWING_LINE_LAYER: &str = "drawing-line";

const SELECTION_COLOR: &str = "#3B82F6";

fn object(value: JsonValue) -> JsonObject {
    match value {
        JsonValue::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn layer(
    id: &str,
    layer_type: LayerType,
    source: &str,
    filter: Option<JsonValue>,
    layout: JsonValue,
    paint: JsonValue,
) -> LayerSpec {
    LayerSpec {
        id: id.to_string(),
        layer_type,
        source: source.to_string(),
        filter,
        layout: object(layout),
        paint: object(paint),
        max_zoom: None,
    }
}

pub fn clusters_layer() -> LayerSpec {
    layer(
        CLUSTERS_LAYER,
        LayerType::Circle,
        AGENTS_SOURCE,
        Some(json!(["has", "point_count"])),
        json!({}),
        json!({
            "circle-color": [
                "step", ["get", "point_count"],
                "#51bbd6", 100, "#f1f075", 750, "#f28cb1"
            ],
            "circle-radius": ["step", ["get", "point_count"], 20, 100, 30, 750, 40]
        }),
    )
}

pub fn cluster_count_layer() -> LayerSpec {
    layer(
        CLUSTER_COUNT_LAYER,
        LayerType::Symbol,
        AGENTS_SOURCE,
        Some(json!(["has", "point_count"])),
        json!({
            "text-field": "{point_count_abbreviated}",
            "text-font": ["DIN Offc Pro Medium", "Arial Unicode MS Bold"],
            "text-size": 12
        }),
        json!({ "text-color": "#ffffff" }),
    )
}

pub fn unclustered_layer(markers: &MarkerConfig) -> LayerSpec {
    let filter = if markers.enable_clustering {
        Some(json!(["!", ["has", "point_count"]]))
    } else {
        None
    };

    layer(
        UNCLUSTERED_LAYER,
        LayerType::Circle,
        AGENTS_SOURCE,
        filter,
        json!({}),
        json!({
            "circle-color": markers.color,
            "circle-radius": [
                "interpolate", ["linear"], ["zoom"],
                10, markers.size,
                15, markers.size * 2.0
            ],
            "circle-stroke-width": 2,
            "circle-stroke-color": "#fff",
            "circle-opacity": ["interpolate", ["linear"], ["zoom"], 7, 0.6, 10, 0.8, 15, 1]
        }),
    )
}

/// Opacity stops, fading linearly from full to zero between zoom 9 and the fade-out zoom.
pub fn heatmap_opacity_stops(heatmap: &HeatmapConfig) -> Vec<(f64, f64)> {
    let fade_end = heatmap.fade_out_zoom.min(heatmap.max_zoom);
    let fade_start = 9.0_f64.min(fade_end - 1.0);
    let steps = 5;

    let mut stops = vec![(fade_start - 2.0, heatmap.opacity)];
    for step in 0..steps {
        let t = step as f64 / steps as f64;
        let zoom = fade_start + (fade_end - fade_start) * t;
        stops.push((zoom, heatmap.opacity * (1.0 - t)));
    }
    stops.push((fade_end, 0.0));

    stops
}

fn interpolate_zoom(stops: &[(f64, f64)]) -> JsonValue {
    let mut expression = vec![json!("interpolate"), json!(["linear"]), json!(["zoom"])];
    for (zoom, value) in stops {
        expression.push(json!(zoom));
        expression.push(json!(value));
    }
    JsonValue::Array(expression)
}

pub fn heatmap_layer(heatmap: &HeatmapConfig) -> LayerSpec {
    let mut spec = layer(
        HEATMAP_LAYER,
        LayerType::Heatmap,
        HEATMAP_SOURCE,
        None,
        json!({}),
        json!({
            "heatmap-weight": ["interpolate", ["linear"], ["zoom"], 0, 0.5, 9, 1],
            "heatmap-intensity": ["interpolate", ["linear"], ["zoom"], 0, 1, 9, 3],
            "heatmap-color": [
                "interpolate", ["linear"], ["heatmap-density"],
                0, "rgba(33,102,172,0)",
                0.4, "rgb(103,169,207)",
                0.5, "rgb(209,229,240)",
                0.7, "rgb(253,219,199)",
                0.85, "rgb(239,138,98)",
                1, "rgb(178,24,43)"
            ],
            "heatmap-radius": ["interpolate", ["linear"], ["zoom"], 0, 2, 9, heatmap.radius]
        }),
    );

    spec.paint.insert(
        "heatmap-opacity".to_string(),
        interpolate_zoom(&heatmap_opacity_stops(heatmap)),
    );
    spec.max_zoom = Some(heatmap.max_zoom);
    spec
}

pub fn selection_fill_layer() -> LayerSpec {
    layer(
        SELECTION_FILL_LAYER,
        LayerType::Fill,
        SELECTION_SOURCE,
        None,
        json!({}),
        json!({ "fill-color": SELECTION_COLOR, "fill-opacity": 0.2 }),
    )
}

pub fn selection_outline_layer() -> LayerSpec {
    layer(
        SELECTION_OUTLINE_LAYER,
        LayerType::Line,
        SELECTION_SOURCE,
        None,
        json!({}),
        json!({
            "line-color": SELECTION_COLOR,
            "line-width": 2,
            "line-dasharray": [2, 2]
        }),
    )
}

pub fn drawing_points_layer() -> LayerSpec {
    layer(
        DRAWING_POINTS_LAYER,
        LayerType::Circle,
        DRAWING_POINTS_SOURCE,
        None,
        json!({}),
        json!({
            "circle-color": SELECTION_COLOR,
            "circle-radius": 6,
            "circle-stroke-color": "#ffffff",
            "circle-stroke-width": 2
        }),
    )
}

pub fn drawing_line_layer() -> LayerSpec {
    layer(
        DRAWING_LINE_LAYER,
        LayerType::Line,
        DRAWING_LINE_SOURCE,
        None,
        json!({}),
        json!({
            "line-color": SELECTION_COLOR,
            "line-width": 2,
            "line-dasharray": [4, 4]
        }),
    )
}
