use crate::config::{HeatmapConfig, MarkerConfig};
use crate::projection::{feature_position, property_str};
use crate::styles::{
    AGENTS_SOURCE, CLUSTER_COUNT_LAYER, CLUSTERS_LAYER, HEATMAP_LAYER, HEATMAP_SOURCE,
    UNCLUSTERED_LAYER, cluster_count_layer, clusters_layer, heatmap_layer, unclustered_layer,
};
use crate::surface::{
    ClusterOptions, Cursor, EventTarget, PointerEvent, PointerEventKind, Popup, PopupContent,
    RenderSurface, SourceSpec, SubscriptionId, SurfaceError, remove_layers_and_sources,
};
use geo_types::Coord;
use geojson::{Feature, FeatureCollection, JsonValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Operator-toggleable visualizations.
///
/// `Markers` covers the clustered circles, their count labels and the
/// interactive unclustered points, which all share one clustered source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visualization {
    Markers,
    Heatmap,
}

impl Visualization {
    pub const ALL: [Visualization; 2] = [Visualization::Markers, Visualization::Heatmap];

    pub fn source_id(&self) -> &'static str {
        match self {
            Visualization::Markers => AGENTS_SOURCE,
            Visualization::Heatmap => HEATMAP_SOURCE,
        }
    }

    pub fn layer_ids(&self) -> &'static [&'static str] {
        match self {
            Visualization::Markers => &[CLUSTERS_LAYER, CLUSTER_COUNT_LAYER, UNCLUSTERED_LAYER],
            Visualization::Heatmap => &[HEATMAP_LAYER],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MarkerHandler {
    ClusterClick,
    PointClick,
    HoverEnter,
    HoverLeave,
}

/// Sole owner of the marker and heatmap sources/layers on the surface.
///
/// A source is created the first time its visualization is enabled while
/// non-empty feature data is available. After that, toggling only flips
/// layer visibility and filter changes only replace the source payload.
pub struct LayerManager {
    markers: MarkerConfig,
    heatmap: HeatmapConfig,
    markers_enabled: bool,
    heatmap_enabled: bool,
    features: Option<FeatureCollection>,
    handlers_bound: bool,
    handlers: Vec<(SubscriptionId, MarkerHandler)>,
    interaction_suspended: bool,
}

impl LayerManager {
    pub fn new(markers: MarkerConfig, heatmap: HeatmapConfig) -> Self {
        Self {
            markers,
            heatmap,
            markers_enabled: false,
            heatmap_enabled: false,
            features: None,
            handlers_bound: false,
            handlers: Vec::new(),
            interaction_suspended: false,
        }
    }

    pub fn is_enabled(&self, kind: Visualization) -> bool {
        match kind {
            Visualization::Markers => self.markers_enabled,
            Visualization::Heatmap => self.heatmap_enabled,
        }
    }

    pub fn has_data(&self) -> bool {
        self.features
            .as_ref()
            .map(|fc| !fc.features.is_empty())
            .unwrap_or(false)
    }

    pub fn features(&self) -> Option<&FeatureCollection> {
        self.features.as_ref()
    }

    pub fn is_materialized<S: RenderSurface + ?Sized>(&self, surface: &S, kind: Visualization) -> bool {
        surface.has_source(kind.source_id())
    }

    /// Enabled but still waiting for data before its source can exist.
    pub fn is_pending<S: RenderSurface + ?Sized>(&self, surface: &S, kind: Visualization) -> bool {
        self.is_enabled(kind) && !self.is_materialized(surface, kind)
    }

    pub fn handlers_bound(&self) -> bool {
        self.handlers_bound
    }

    /// Marker clicks and hover cursors are ignored while this is set.
    pub fn set_interaction_suspended(&mut self, suspended: bool) {
        self.interaction_suspended = suspended;
    }

    pub fn set_visualization_enabled<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        kind: Visualization,
        enabled: bool,
    ) {
        self.record_enabled(kind, enabled);
        self.apply(surface, kind);
    }

    /// Records the flag without touching a surface, for use before the style loads.
    pub fn record_enabled(&mut self, kind: Visualization, enabled: bool) {
        match kind {
            Visualization::Markers => self.markers_enabled = enabled,
            Visualization::Heatmap => self.heatmap_enabled = enabled,
        }
    }

    /// Keeps `features` as the current data without touching a surface.
    pub fn stage_data(&mut self, features: FeatureCollection) {
        self.features = Some(features);
    }

    /// Replaces the payload of every existing source, then materializes any
    /// visualization that was waiting for data.
    pub fn refresh_data<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        features: FeatureCollection,
    ) {
        let count = features.features.len();
        self.features = Some(features);

        for kind in Visualization::ALL {
            if surface.has_source(kind.source_id()) {
                if let Some(data) = self.features.clone() {
                    if let Err(e) = surface.set_source_data(kind.source_id(), data) {
                        warn!("Could not refresh source {}: {}", kind.source_id(), e);
                    }
                }
            }
        }

        debug!("Refreshed map sources with {} features", count);

        self.reconcile(surface);
    }

    /// Brings every visualization in line with its flag and the current data.
    pub fn reconcile<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        for kind in Visualization::ALL {
            self.apply(surface, kind);
        }
    }

    /// Removes everything this manager created and unbinds its handlers.
    ///
    /// Flags and data survive, so a later [`LayerManager::reconcile`] on a
    /// fresh surface rebuilds the same picture.
    pub fn teardown<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        for (id, _) in self.handlers.drain(..) {
            surface.unsubscribe(id);
        }
        self.handlers_bound = false;

        for kind in Visualization::ALL {
            remove_layers_and_sources(surface, kind.layer_ids(), &[kind.source_id()]);
        }

        debug!("Tore down marker and heatmap layers");
    }

    fn apply<S: RenderSurface + ?Sized>(&mut self, surface: &mut S, kind: Visualization) {
        let enabled = self.is_enabled(kind);

        if enabled && self.has_data() {
            if let Err(e) = self.materialize(surface, kind) {
                warn!("Could not create {:?} layers: {}", kind, e);
            }
        }

        for layer in kind.layer_ids() {
            if surface.has_layer(layer) {
                let _ = surface.set_layer_visibility(layer, enabled);
            }
        }
    }

    fn materialize<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        kind: Visualization,
    ) -> Result<(), SurfaceError> {
        let source_id = kind.source_id();

        if !surface.has_source(source_id) {
            let data = match &self.features {
                Some(features) => features.clone(),
                None => return Ok(()),
            };

            let cluster = match kind {
                Visualization::Markers if self.markers.enable_clustering => Some(ClusterOptions {
                    radius: self.markers.cluster_radius,
                    max_zoom: self.markers.cluster_max_zoom,
                }),
                _ => None,
            };

            info!(
                "Creating {} source with {} features",
                source_id,
                data.features.len()
            );
            surface.add_source(source_id, SourceSpec { data, cluster })?;
        }

        match kind {
            Visualization::Markers => {
                if self.markers.enable_clustering {
                    if !surface.has_layer(CLUSTERS_LAYER) {
                        surface.add_layer(clusters_layer(), None)?;
                    }
                    if !surface.has_layer(CLUSTER_COUNT_LAYER) {
                        surface.add_layer(cluster_count_layer(), None)?;
                    }
                }
                if !surface.has_layer(UNCLUSTERED_LAYER) {
                    surface.add_layer(unclustered_layer(&self.markers), None)?;
                }
                self.bind_handlers(surface);
            }
            Visualization::Heatmap => {
                if !surface.has_layer(HEATMAP_LAYER) {
                    let before = self
                        .heatmap
                        .before_layer
                        .as_deref()
                        .filter(|anchor| surface.has_layer(anchor));
                    surface.add_layer(heatmap_layer(&self.heatmap), before)?;
                }
            }
        }

        Ok(())
    }

    fn bind_handlers<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        if self.handlers_bound {
            return;
        }

        let mut targets = vec![UNCLUSTERED_LAYER];
        if self.markers.enable_clustering {
            targets.push(CLUSTERS_LAYER);
        }

        for layer in targets {
            let target = EventTarget::Layer(layer.to_string());
            let click = if layer == CLUSTERS_LAYER {
                MarkerHandler::ClusterClick
            } else {
                MarkerHandler::PointClick
            };

            for (kind, handler) in [
                (PointerEventKind::Click, click),
                (PointerEventKind::MouseEnter, MarkerHandler::HoverEnter),
                (PointerEventKind::MouseLeave, MarkerHandler::HoverLeave),
            ] {
                let id = surface.subscribe(kind, target.clone());
                self.handlers.push((id, handler));
            }
        }

        self.handlers_bound = true;
    }

    pub fn owns(&self, subscription: SubscriptionId) -> bool {
        self.handlers.iter().any(|(id, _)| *id == subscription)
    }

    /// Runs the handler bound to `subscription`. Returns false for foreign ids.
    pub fn handle_pointer<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        subscription: SubscriptionId,
        event: &PointerEvent,
    ) -> bool {
        let handler = match self.handlers.iter().find(|(id, _)| *id == subscription) {
            Some((_, handler)) => *handler,
            None => return false,
        };

        if self.interaction_suspended {
            return true;
        }

        match handler {
            MarkerHandler::ClusterClick => self.expand_cluster(surface, event),
            MarkerHandler::PointClick => self.open_popup(surface, event),
            MarkerHandler::HoverEnter => surface.set_cursor(Cursor::Pointer),
            MarkerHandler::HoverLeave => surface.set_cursor(Cursor::Default),
        }

        true
    }

    fn expand_cluster<S: RenderSurface + ?Sized>(&self, surface: &mut S, event: &PointerEvent) {
        let hits;
        let features: &[Feature] = if event.features.is_empty() {
            hits = surface.query_rendered_features(event.point, &[CLUSTERS_LAYER]);
            &hits
        } else {
            &event.features
        };

        let Some(cluster) = features.first() else {
            return;
        };

        let cluster_id = cluster
            .properties
            .as_ref()
            .and_then(|props| props.get("cluster_id"))
            .and_then(JsonValue::as_u64);

        let (Some(cluster_id), Some(center)) = (cluster_id, feature_position(cluster)) else {
            return;
        };

        match surface.cluster_expansion_zoom(AGENTS_SOURCE, cluster_id) {
            Ok(zoom) => surface.ease_to(center, Some(zoom)),
            Err(e) => debug!("Dropping cluster click: {}", e),
        }
    }

    fn open_popup<S: RenderSurface + ?Sized>(&self, surface: &mut S, event: &PointerEvent) {
        let Some(feature) = event.features.first() else {
            return;
        };
        let Some(position) = feature_position(feature) else {
            return;
        };

        surface.show_popup(Popup {
            lng_lat: wrap_near(position, event.lng_lat.x),
            content: popup_content(feature),
        });
    }
}

/// Shifts `position` by whole turns so it is within 180° of `reference_lng`.
///
/// When the map is zoomed out far enough that several copies of a feature
/// are visible, the popup must land on the copy that was clicked.
pub fn wrap_near(position: Coord<f64>, reference_lng: f64) -> Coord<f64> {
    if !position.x.is_finite() || !reference_lng.is_finite() {
        return position;
    }

    let turns = ((reference_lng - position.x) / 360.0).round();

    Coord {
        x: position.x + turns * 360.0,
        y: position.y,
    }
}

fn property_text(feature: &Feature, key: &str) -> String {
    match feature.properties.as_ref().and_then(|props| props.get(key)) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

pub fn popup_content(feature: &Feature) -> PopupContent {
    PopupContent {
        name: property_str(feature, "empName").unwrap_or_default().to_string(),
        role: property_text(feature, "role"),
        division: property_text(feature, "division"),
        address: property_text(feature, "personalAddress"),
        id: property_text(feature, "tsaId"),
    }
}
