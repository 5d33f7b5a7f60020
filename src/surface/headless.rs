use super::{
    Cursor, EventTarget, LayerSpec, PointerEvent, PointerEventKind, Popup, RenderSurface,
    ScreenPoint, SourceSpec, SubscriptionId, SurfaceError,
};
use ahash::AHashMap;
use geo_types::Coord;
use geojson::{Feature, FeatureCollection};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessLayer {
    pub spec: LayerSpec,
    pub visible: bool,
}

/// A map engine stand-in that renders nothing and records everything.
///
/// Used by the command-line driver and by tests. Hit-testing is scripted:
/// callers place features "under the pointer" per layer with
/// [`HeadlessSurface::place_rendered_features`].
#[derive(Debug)]
pub struct HeadlessSurface {
    sources: BTreeMap<String, SourceSpec>,
    layers: Vec<HeadlessLayer>,
    subscriptions: BTreeMap<SubscriptionId, (PointerEventKind, EventTarget)>,
    next_subscription: u64,
    rendered: AHashMap<String, Vec<Feature>>,
    cluster_zooms: AHashMap<(String, u64), f64>,
    pub cursor: Cursor,
    pub double_click_zoom: bool,
    pub camera: Option<(Coord<f64>, Option<f64>)>,
    pub popups: Vec<Popup>,
    /// Number of `add_source` calls per source id over the surface's lifetime.
    pub source_creations: AHashMap<String, usize>,
    /// Number of `set_source_data` calls per source id.
    pub source_updates: AHashMap<String, usize>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            layers: Vec::new(),
            subscriptions: BTreeMap::new(),
            next_subscription: 1,
            rendered: AHashMap::new(),
            cluster_zooms: AHashMap::new(),
            cursor: Cursor::Default,
            double_click_zoom: true,
            camera: None,
            popups: Vec::new(),
            source_creations: AHashMap::new(),
            source_updates: AHashMap::new(),
        }
    }
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn layer(&self, id: &str) -> Option<&HeadlessLayer> {
        self.layers.iter().find(|layer| layer.spec.id == id)
    }

    /// Layer ids bottom to top.
    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.spec.id.as_str()).collect()
    }

    pub fn is_layer_visible(&self, id: &str) -> bool {
        self.layer(id).map(|layer| layer.visible).unwrap_or(false)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn subscriptions_for(&self, kind: PointerEventKind, target: &EventTarget) -> usize {
        self.subscriptions
            .values()
            .filter(|(k, t)| *k == kind && t == target)
            .count()
    }

    pub fn place_rendered_features(&mut self, layer: &str, features: Vec<Feature>) {
        self.rendered.insert(layer.to_string(), features);
    }

    pub fn register_cluster(&mut self, source: &str, cluster_id: u64, expansion_zoom: f64) {
        self.cluster_zooms
            .insert((source.to_string(), cluster_id), expansion_zoom);
    }

    /// Simulates the engine firing `kind` at a position.
    ///
    /// Surface-wide subscriptions of that kind always fire. Layer-scoped ones
    /// fire when `hit_layer` names their layer and that layer is visible. The
    /// returned deliveries are in subscription order.
    pub fn pointer(
        &self,
        kind: PointerEventKind,
        lng_lat: Coord<f64>,
        point: ScreenPoint,
        hit_layer: Option<&str>,
    ) -> Vec<(SubscriptionId, PointerEvent)> {
        self.subscriptions
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .filter_map(|(id, (_, target))| match target {
                EventTarget::Surface => Some((
                    *id,
                    PointerEvent {
                        kind,
                        lng_lat,
                        point,
                        features: vec![],
                    },
                )),
                EventTarget::Layer(layer) => {
                    if hit_layer == Some(layer.as_str()) && self.is_layer_visible(layer) {
                        Some((
                            *id,
                            PointerEvent {
                                kind,
                                lng_lat,
                                point,
                                features: self.query_rendered_features(point, &[layer.as_str()]),
                            },
                        ))
                    } else {
                        None
                    }
                }
            })
            .collect()
    }
}

impl RenderSurface for HeadlessSurface {
    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), SurfaceError> {
        if self.sources.contains_key(id) {
            return Err(SurfaceError::DuplicateSource(id.to_string()));
        }

        self.sources.insert(id.to_string(), spec);
        *self.source_creations.entry(id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: FeatureCollection) -> Result<(), SurfaceError> {
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| SurfaceError::UnknownSource(id.to_string()))?;

        source.data = data;
        *self.source_updates.entry(id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError> {
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SurfaceError::UnknownSource(id.to_string()))
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) -> Result<(), SurfaceError> {
        if self.has_layer(&spec.id) {
            return Err(SurfaceError::DuplicateLayer(spec.id));
        }

        if !self.sources.contains_key(&spec.source) {
            return Err(SurfaceError::MissingLayerSource {
                layer: spec.id,
                source_id: spec.source,
            });
        }

        let position = before
            .and_then(|anchor| self.layers.iter().position(|l| l.spec.id == anchor))
            .unwrap_or(self.layers.len());

        self.layers.insert(
            position,
            HeadlessLayer {
                spec,
                visible: true,
            },
        );
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError> {
        let position = self
            .layers
            .iter()
            .position(|layer| layer.spec.id == id)
            .ok_or_else(|| SurfaceError::UnknownLayer(id.to_string()))?;

        self.layers.remove(position);
        self.rendered.remove(id);
        Ok(())
    }

    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), SurfaceError> {
        let layer = self
            .layers
            .iter_mut()
            .find(|layer| layer.spec.id == id)
            .ok_or_else(|| SurfaceError::UnknownLayer(id.to_string()))?;

        layer.visible = visible;
        Ok(())
    }

    fn query_rendered_features(&self, _point: ScreenPoint, layers: &[&str]) -> Vec<Feature> {
        layers
            .iter()
            .filter(|layer| self.is_layer_visible(layer))
            .filter_map(|layer| self.rendered.get(*layer))
            .flatten()
            .cloned()
            .collect()
    }

    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, SurfaceError> {
        if !self.sources.contains_key(source) {
            return Err(SurfaceError::UnknownSource(source.to_string()));
        }

        self.cluster_zooms
            .get(&(source.to_string(), cluster_id))
            .copied()
            .ok_or_else(|| SurfaceError::UnknownCluster {
                source_id: source.to_string(),
                cluster_id,
            })
    }

    fn ease_to(&mut self, center: Coord<f64>, zoom: Option<f64>) {
        self.camera = Some((center, zoom));
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    fn set_double_click_zoom(&mut self, enabled: bool) {
        self.double_click_zoom = enabled;
    }

    fn show_popup(&mut self, popup: Popup) {
        self.popups.push(popup);
    }

    fn subscribe(&mut self, kind: PointerEventKind, target: EventTarget) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.insert(id, (kind, target));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::empty_collection;
    use crate::surface::LayerType;
    use geojson::JsonObject;

    fn layer(id: &str, source: &str) -> LayerSpec {
        LayerSpec {
            id: id.to_string(),
            layer_type: LayerType::Circle,
            source: source.to_string(),
            filter: None,
            layout: JsonObject::new(),
            paint: JsonObject::new(),
            max_zoom: None,
        }
    }

    fn source() -> SourceSpec {
        SourceSpec {
            data: empty_collection(),
            cluster: None,
        }
    }

    #[test]
    fn duplicate_sources_and_layers_are_rejected() {
        let mut surface = HeadlessSurface::new();
        surface.add_source("s", source()).unwrap();
        assert_eq!(
            surface.add_source("s", source()),
            Err(SurfaceError::DuplicateSource("s".to_string()))
        );

        surface.add_layer(layer("a", "s"), None).unwrap();
        assert!(surface.add_layer(layer("a", "s"), None).is_err());
        assert!(matches!(
            surface.add_layer(layer("b", "missing"), None),
            Err(SurfaceError::MissingLayerSource { .. })
        ));
    }

    #[test]
    fn before_anchor_controls_stacking() {
        let mut surface = HeadlessSurface::new();
        surface.add_source("s", source()).unwrap();
        surface.add_layer(layer("labels", "s"), None).unwrap();
        surface.add_layer(layer("heat", "s"), Some("labels")).unwrap();
        surface.add_layer(layer("top", "s"), Some("not-there")).unwrap();

        assert_eq!(surface.layer_ids(), vec!["heat", "labels", "top"]);
    }

    #[test]
    fn layer_events_need_a_visible_hit() {
        let mut surface = HeadlessSurface::new();
        surface.add_source("s", source()).unwrap();
        surface.add_layer(layer("pts", "s"), None).unwrap();

        let on_layer = surface.subscribe(
            PointerEventKind::Click,
            EventTarget::Layer("pts".to_string()),
        );
        let anywhere = surface.subscribe(PointerEventKind::Click, EventTarget::Surface);

        let here = Coord { x: 1.0, y: 2.0 };
        let hits = surface.pointer(PointerEventKind::Click, here, ScreenPoint::default(), None);
        assert_eq!(hits.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![anywhere]);

        let hits = surface.pointer(
            PointerEventKind::Click,
            here,
            ScreenPoint::default(),
            Some("pts"),
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, on_layer);

        surface.set_layer_visibility("pts", false).unwrap();
        let hits = surface.pointer(
            PointerEventKind::Click,
            here,
            ScreenPoint::default(),
            Some("pts"),
        );
        assert_eq!(hits.len(), 1);

        assert!(surface.unsubscribe(anywhere));
        assert!(!surface.unsubscribe(anywhere));
    }

    #[test]
    fn unknown_cluster_is_an_error() {
        let mut surface = HeadlessSurface::new();
        surface.add_source("s", source()).unwrap();
        surface.register_cluster("s", 7, 11.0);

        assert_eq!(surface.cluster_expansion_zoom("s", 7), Ok(11.0));
        assert!(matches!(
            surface.cluster_expansion_zoom("s", 8),
            Err(SurfaceError::UnknownCluster { cluster_id: 8, .. })
        ));
    }
}
