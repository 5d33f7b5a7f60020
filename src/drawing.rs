//! Interactive polygon drawing for area selection.
//!
//! ```text
//! Idle --activate--> Drawing --click--> Drawing
//! Drawing --double click, >= 3 vertices--> Completed --finish_selection--> Idle
//! Drawing | Completed --deactivate--> Idle
//! ```
//!
//! Click and double-click subscriptions exist only while `Drawing`; every
//! exit from `Drawing` drops them, so a late event from the engine can never
//! reach a finished or abandoned gesture.

use crate::spatial::MIN_POLYGON_VERTICES;
use crate::styles::{
    DRAWING_LINE_LAYER, DRAWING_LINE_SOURCE, DRAWING_POINTS_LAYER, DRAWING_POINTS_SOURCE,
    SELECTION_FILL_LAYER, SELECTION_OUTLINE_LAYER, SELECTION_SOURCE, drawing_line_layer,
    drawing_points_layer, selection_fill_layer, selection_outline_layer,
};
use crate::surface::{
    Cursor, EventTarget, LayerSpec, PointerEvent, PointerEventKind, RenderSurface, SourceSpec,
    SubscriptionId, SurfaceError, remove_layers_and_sources, upsert_source,
};
use geo_types::Coord;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
pub enum DrawingState {
    Idle,
    Drawing { vertices: Vec<Coord<f64>> },
    /// Closed ring, first vertex repeated at the end.
    Completed { ring: Vec<Coord<f64>> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawingOutcome {
    /// Not one of ours, or arrived in a state that does not accept it.
    Ignored,
    VertexAdded { count: usize },
    /// Double click with too few vertices; the gesture continues.
    NotEnoughVertices { count: usize },
    Completed { ring: Vec<Coord<f64>> },
}

struct DrawingSubscriptions {
    click: SubscriptionId,
    double_click: SubscriptionId,
}

pub struct AreaSelector {
    state: DrawingState,
    subscriptions: Option<DrawingSubscriptions>,
    grace: Duration,
    cleanup_due: Option<Instant>,
}

impl AreaSelector {
    pub fn new(grace: Duration) -> Self {
        Self {
            state: DrawingState::Idle,
            subscriptions: None,
            grace,
            cleanup_due: None,
        }
    }

    pub fn state(&self) -> &DrawingState {
        &self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, DrawingState::Drawing { .. })
    }

    pub fn vertices(&self) -> &[Coord<f64>] {
        match &self.state {
            DrawingState::Drawing { vertices } => vertices,
            DrawingState::Completed { ring } => ring,
            DrawingState::Idle => &[],
        }
    }

    pub fn is_listening(&self) -> bool {
        self.subscriptions.is_some()
    }

    pub fn owns(&self, subscription: SubscriptionId) -> bool {
        self.subscriptions
            .as_ref()
            .map(|s| s.click == subscription || s.double_click == subscription)
            .unwrap_or(false)
    }

    /// Idle -> Drawing with an empty vertex buffer. No-op while already drawing.
    pub fn activate<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        match self.state {
            DrawingState::Drawing { .. } => return,
            DrawingState::Completed { .. } => self.deactivate(surface),
            DrawingState::Idle => {}
        }

        self.cleanup_due = None;
        clear_all_drawing_layers(surface);

        surface.set_cursor(Cursor::Crosshair);
        surface.set_double_click_zoom(false);
        self.subscriptions = Some(DrawingSubscriptions {
            click: surface.subscribe(PointerEventKind::Click, EventTarget::Surface),
            double_click: surface.subscribe(PointerEventKind::DoubleClick, EventTarget::Surface),
        });

        self.state = DrawingState::Drawing { vertices: vec![] };
        debug!("Area selection started");
    }

    /// Any state -> Idle, discarding vertices and every drawing layer.
    pub fn deactivate<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        self.detach(surface);
        self.cleanup_due = None;
        clear_all_drawing_layers(surface);
        surface.set_cursor(Cursor::Default);

        if self.state != DrawingState::Idle {
            debug!("Area selection cancelled");
        }
        self.state = DrawingState::Idle;
    }

    /// Completed -> Idle once the selection has been handed over.
    ///
    /// The closed polygon stays on the surface until the pending cleanup runs.
    pub fn finish_selection(&mut self) -> bool {
        if !matches!(self.state, DrawingState::Completed { .. }) {
            return false;
        }

        self.state = DrawingState::Idle;
        true
    }

    pub fn cleanup_due(&self) -> Option<Instant> {
        self.cleanup_due
    }

    /// Removes the vertex, guide-line and polygon layers once the grace period has passed.
    pub fn poll_cleanup<S: RenderSurface + ?Sized>(&mut self, surface: &mut S, now: Instant) {
        match self.cleanup_due {
            Some(due) if now >= due => {
                self.cleanup_due = None;
                clear_all_drawing_layers(surface);
            }
            _ => {}
        }
    }

    pub fn handle_pointer<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        subscription: SubscriptionId,
        event: &PointerEvent,
        now: Instant,
    ) -> DrawingOutcome {
        let Some(subs) = self.subscriptions.as_ref() else {
            return DrawingOutcome::Ignored;
        };

        let is_click = subs.click == subscription && event.kind == PointerEventKind::Click;
        let is_double =
            subs.double_click == subscription && event.kind == PointerEventKind::DoubleClick;

        let DrawingState::Drawing { vertices } = &mut self.state else {
            return DrawingOutcome::Ignored;
        };

        if is_click {
            vertices.push(event.lng_lat);
            let count = vertices.len();
            let snapshot = vertices.clone();
            if let Err(e) = render_gesture(surface, &snapshot) {
                warn!("Could not draw selection vertices: {}", e);
            }
            return DrawingOutcome::VertexAdded { count };
        }

        if !is_double {
            return DrawingOutcome::Ignored;
        }

        if vertices.len() < MIN_POLYGON_VERTICES {
            return DrawingOutcome::NotEnoughVertices {
                count: vertices.len(),
            };
        }

        let mut ring = std::mem::take(vertices);
        ring.push(ring[0]);

        if let Err(e) = render_polygon(surface, &ring) {
            warn!("Could not draw selection polygon: {}", e);
        }

        self.detach(surface);
        surface.set_cursor(Cursor::Default);
        self.cleanup_due = Some(now + self.grace);
        self.state = DrawingState::Completed { ring: ring.clone() };

        debug!("Area selection closed with {} vertices", ring.len() - 1);
        DrawingOutcome::Completed { ring }
    }

    fn detach<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) {
        if let Some(subs) = self.subscriptions.take() {
            surface.unsubscribe(subs.click);
            surface.unsubscribe(subs.double_click);
            surface.set_double_click_zoom(true);
        }
    }
}

fn position(coord: &Coord<f64>) -> Vec<f64> {
    vec![coord.x, coord.y]
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn feature(geometry: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn ensure_layer<S: RenderSurface + ?Sized>(
    surface: &mut S,
    spec: LayerSpec,
) -> Result<(), SurfaceError> {
    if surface.has_layer(&spec.id) {
        Ok(())
    } else {
        surface.add_layer(spec, None)
    }
}

fn render_gesture<S: RenderSurface + ?Sized>(
    surface: &mut S,
    vertices: &[Coord<f64>],
) -> Result<(), SurfaceError> {
    let points = vertices
        .iter()
        .enumerate()
        .map(|(index, coord)| {
            let mut props = JsonObject::new();
            props.insert("index".to_string(), JsonValue::from(index));
            feature(Value::Point(position(coord)), props)
        })
        .collect();

    upsert_source(
        surface,
        DRAWING_POINTS_SOURCE,
        SourceSpec {
            data: collection(points),
            cluster: None,
        },
    )?;
    ensure_layer(surface, drawing_points_layer())?;

    if vertices.len() > 1 {
        let line = feature(
            Value::LineString(vertices.iter().map(position).collect()),
            JsonObject::new(),
        );
        upsert_source(
            surface,
            DRAWING_LINE_SOURCE,
            SourceSpec {
                data: collection(vec![line]),
                cluster: None,
            },
        )?;
        ensure_layer(surface, drawing_line_layer())?;
    }

    Ok(())
}

fn render_polygon<S: RenderSurface + ?Sized>(
    surface: &mut S,
    ring: &[Coord<f64>],
) -> Result<(), SurfaceError> {
    remove_layers_and_sources(
        surface,
        &[SELECTION_FILL_LAYER, SELECTION_OUTLINE_LAYER],
        &[SELECTION_SOURCE],
    );

    let polygon = feature(
        Value::Polygon(vec![ring.iter().map(position).collect()]),
        JsonObject::new(),
    );
    surface.add_source(
        SELECTION_SOURCE,
        SourceSpec {
            data: collection(vec![polygon]),
            cluster: None,
        },
    )?;
    surface.add_layer(selection_fill_layer(), None)?;
    surface.add_layer(selection_outline_layer(), None)?;
    Ok(())
}

fn clear_gesture_layers<S: RenderSurface + ?Sized>(surface: &mut S) {
    remove_layers_and_sources(
        surface,
        &[DRAWING_POINTS_LAYER, DRAWING_LINE_LAYER],
        &[DRAWING_POINTS_SOURCE, DRAWING_LINE_SOURCE],
    );
}

fn clear_all_drawing_layers<S: RenderSurface + ?Sized>(surface: &mut S) {
    clear_gesture_layers(surface);
    remove_layers_and_sources(
        surface,
        &[SELECTION_FILL_LAYER, SELECTION_OUTLINE_LAYER],
        &[SELECTION_SOURCE],
    );
}
