//! Boundary to the map rendering engine.
//!
//! The engine owns tiles, styling and hit-testing. This crate only talks to it
//! through named geojson sources, named layers keyed to a source, and pointer
//! subscriptions scoped to either the whole surface or one layer.

pub mod headless;

use geo_types::Coord;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("source '{0}' does not exist")]
    UnknownSource(String),
    #[error("source '{0}' already exists")]
    DuplicateSource(String),
    #[error("layer '{0}' does not exist")]
    UnknownLayer(String),
    #[error("layer '{0}' already exists")]
    DuplicateLayer(String),
    #[error("layer '{layer}' references missing source '{source_id}'")]
    MissingLayerSource { layer: String, source_id: String },
    #[error("cluster {cluster_id} is unknown to source '{source_id}'")]
    UnknownCluster { source_id: String, cluster_id: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClusterOptions {
    pub radius: u32,
    pub max_zoom: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceSpec {
    pub data: FeatureCollection,
    pub cluster: Option<ClusterOptions>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Circle,
    Symbol,
    Heatmap,
    Fill,
    Line,
}

/// A style layer in the engine's JSON style vocabulary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonValue>,
    #[serde(skip_serializing_if = "JsonObject::is_empty")]
    pub layout: JsonObject,
    pub paint: JsonObject,
    #[serde(rename = "maxzoom", skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointerEventKind {
    Click,
    DoubleClick,
    MouseEnter,
    MouseLeave,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTarget {
    Surface,
    Layer(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    /// Geographic position under the pointer, `x` longitude and `y` latitude.
    pub lng_lat: Coord<f64>,
    pub point: ScreenPoint,
    /// Features of the subscribed layer under the pointer. Empty for surface-wide events.
    pub features: Vec<Feature>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
    Crosshair,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PopupContent {
    pub name: String,
    pub role: String,
    pub division: String,
    pub address: String,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Popup {
    pub lng_lat: Coord<f64>,
    pub content: PopupContent,
}

/// Operations this crate needs from a map engine.
///
/// Implementations are driven from a single event loop; nothing here is
/// expected to block.
pub trait RenderSurface {
    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), SurfaceError>;
    /// Replaces the whole payload of an existing source.
    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError>;
    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError>;

    fn has_layer(&self, id: &str) -> bool;
    /// Adds a layer on top, or beneath `before` when that layer exists.
    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) -> Result<(), SurfaceError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), SurfaceError>;

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<Feature>;
    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, SurfaceError>;
    fn ease_to(&mut self, center: Coord<f64>, zoom: Option<f64>);

    fn set_cursor(&mut self, cursor: Cursor);
    fn set_double_click_zoom(&mut self, enabled: bool);
    fn show_popup(&mut self, popup: Popup);

    fn subscribe(&mut self, kind: PointerEventKind, target: EventTarget) -> SubscriptionId;
    /// Returns false when the subscription was already gone.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}

/// Removes layers then sources, skipping whatever does not exist.
pub fn remove_layers_and_sources<S: RenderSurface + ?Sized>(
    surface: &mut S,
    layers: &[&str],
    sources: &[&str],
) {
    for layer in layers {
        if surface.has_layer(layer) {
            let _ = surface.remove_layer(layer);
        }
    }

    for source in sources {
        if surface.has_source(source) {
            let _ = surface.remove_source(source);
        }
    }
}

/// Adds `spec` under `id` or replaces the payload of the existing source.
pub fn upsert_source<S: RenderSurface + ?Sized>(
    surface: &mut S,
    id: &str,
    spec: SourceSpec,
) -> Result<(), SurfaceError> {
    if surface.has_source(id) {
        surface.set_source_data(id, spec.data)
    } else {
        surface.add_source(id, spec)
    }
}
