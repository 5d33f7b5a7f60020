// End-to-end flows through MapController on the headless surface.

use crate::config::MapConfig;
use crate::controller::MapController;
use crate::drawing::DrawingState;
use crate::export::MemoryExporter;
use crate::filter::{FilterAttribute, FilterCriteria};
use crate::layers::Visualization;
use crate::records::{AgentRecord, test_record};
use crate::source::SourceError;
use crate::spatial::select_within;
use crate::styles::{
    AGENTS_SOURCE, DRAWING_LINE_LAYER, DRAWING_POINTS_LAYER, HEATMAP_SOURCE, SELECTION_FILL_LAYER,
    SELECTION_SOURCE, UNCLUSTERED_LAYER,
};
use crate::surface::headless::HeadlessSurface;
use crate::surface::{Cursor, PointerEventKind, RenderSurface, ScreenPoint};
use geo_types::Coord;
use geojson::feature::Id;
use std::time::{Duration, Instant};

type Controller = MapController<HeadlessSurface, MemoryExporter>;

const SQUARE: [(f64, f64); 4] = [(150.0, -32.0), (152.0, -32.0), (152.0, -34.0), (150.0, -34.0)];

fn agents() -> Vec<AgentRecord> {
    vec![
        test_record("1", "Ada", "NSW", "Sales", "Retail", "Grace", 151.0, -33.0),
        test_record("2", "Bob", "NSW", "Ops", "Logistics", "Linus", 151.5, -33.5),
        test_record("3", "Cy", "VIC", "Sales", "Retail", "Grace", 145.0, -37.8),
        test_record("4", "Di", "NSW", "Sales", "Retail", "Barbara", 151.2, -33.2),
    ]
}

fn controller() -> Controller {
    MapController::new(
        MapConfig::default(),
        HeadlessSurface::new(),
        MemoryExporter::default(),
    )
}

fn loaded_controller() -> Controller {
    let mut controller = controller();
    controller.on_style_loaded();
    controller.on_records_loaded(Ok(agents()));
    controller.set_visualization_enabled(Visualization::Markers, true);
    controller.set_visualization_enabled(Visualization::Heatmap, true);
    controller
}

/// Fires one pointer event and runs every delivery through the controller.
fn fire(
    controller: &mut Controller,
    kind: PointerEventKind,
    lng: f64,
    lat: f64,
    hit_layer: Option<&str>,
    now: Instant,
) -> Vec<Vec<AgentRecord>> {
    let deliveries = controller.surface().pointer(
        kind,
        Coord { x: lng, y: lat },
        ScreenPoint::default(),
        hit_layer,
    );

    deliveries
        .into_iter()
        .filter_map(|(id, event)| controller.handle_pointer(id, &event, now))
        .collect()
}

fn click(controller: &mut Controller, (lng, lat): (f64, f64), now: Instant) {
    let completed = fire(controller, PointerEventKind::Click, lng, lat, None, now);
    assert!(completed.is_empty());
}

fn double_click(controller: &mut Controller, now: Instant) -> Vec<Vec<AgentRecord>> {
    fire(controller, PointerEventKind::DoubleClick, 151.0, -33.0, None, now)
}

fn ids(records: &[AgentRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.tsa_id.clone())
        .collect()
}

fn division(value: &str) -> FilterCriteria {
    let mut criteria = FilterCriteria::new();
    criteria.set(FilterAttribute::Division, [value]);
    criteria
}

#[test]
fn two_vertices_then_double_click_keeps_drawing() {
    let mut controller = loaded_controller();
    let now = Instant::now();
    controller.set_area_select(true);

    click(&mut controller, SQUARE[0], now);
    click(&mut controller, SQUARE[1], now);
    assert!(double_click(&mut controller, now).is_empty());

    assert!(matches!(
        controller.drawing_state(),
        DrawingState::Drawing { vertices } if vertices.len() == 2
    ));
    assert!(controller.exporter().selections.is_empty());
    assert_eq!(controller.surface().cursor, Cursor::Crosshair);
}

#[test]
fn closed_polygon_delivers_filtered_contained_records_once() {
    let mut controller = loaded_controller();
    let now = Instant::now();
    controller.set_filters(division("Sales"));
    controller.set_area_select(true);

    for corner in SQUARE {
        click(&mut controller, corner, now);
    }
    let completed = double_click(&mut controller, now);

    assert_eq!(completed.len(), 1);
    assert_eq!(ids(&completed[0]), vec!["1", "4"]);
    assert_eq!(controller.exporter().selections, completed);

    let ring: Vec<Coord<f64>> = SQUARE.iter().map(|&(x, y)| Coord { x, y }).collect();
    let expected: Vec<String> = select_within(&ring, &controller.filtered_features().features)
        .into_iter()
        .filter_map(|feature| match &feature.id {
            Some(Id::String(id)) => Some(id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ids(&completed[0]), expected);

    // single shot: back to idle, markers interactive again
    assert_eq!(controller.drawing_state(), &DrawingState::Idle);
    assert!(!controller.is_area_select_active());
    assert_eq!(controller.surface().cursor, Cursor::Default);
    assert!(controller.surface().double_click_zoom);

    // listeners are gone, so further clicks do nothing
    assert!(double_click(&mut controller, now).is_empty());
    assert_eq!(controller.exporter().selections.len(), 1);

    controller.set_area_select(true);
    assert_eq!(
        controller.drawing_state(),
        &DrawingState::Drawing { vertices: vec![] }
    );
}

#[test]
fn gesture_layers_linger_for_the_grace_period() {
    let mut controller = loaded_controller();
    let now = Instant::now();
    controller.set_area_select(true);

    for corner in SQUARE {
        click(&mut controller, corner, now);
    }
    assert!(controller.surface().has_layer(DRAWING_LINE_LAYER));
    assert_eq!(double_click(&mut controller, now).len(), 1);

    // the closed polygon is drawn alongside the vertex feedback
    assert!(controller.surface().has_source(SELECTION_SOURCE));
    assert!(controller.surface().has_layer(SELECTION_FILL_LAYER));
    assert!(controller.surface().has_layer(DRAWING_POINTS_LAYER));

    controller.tick(now + Duration::from_millis(50));
    assert!(controller.surface().has_layer(DRAWING_POINTS_LAYER));
    assert!(controller.surface().has_source(SELECTION_SOURCE));

    controller.tick(now + controller.config().drawing_grace());
    assert!(!controller.surface().has_layer(DRAWING_POINTS_LAYER));
    assert!(!controller.surface().has_layer(DRAWING_LINE_LAYER));
    assert!(!controller.surface().has_layer(SELECTION_FILL_LAYER));
    assert!(!controller.surface().has_source(SELECTION_SOURCE));
}

#[test]
fn cancelling_mid_gesture_discards_vertices_and_stale_events() {
    let mut controller = loaded_controller();
    let now = Instant::now();
    controller.set_area_select(true);

    for corner in SQUARE {
        click(&mut controller, corner, now);
    }

    let late = controller.surface().pointer(
        PointerEventKind::DoubleClick,
        Coord { x: 151.0, y: -33.0 },
        ScreenPoint::default(),
        None,
    );
    assert_eq!(late.len(), 1);

    controller.set_area_select(false);
    assert_eq!(controller.drawing_state(), &DrawingState::Idle);
    assert!(!controller.surface().has_layer(DRAWING_POINTS_LAYER));

    for (id, event) in late {
        assert!(controller.handle_pointer(id, &event, now).is_none());
    }
    assert!(controller.exporter().selections.is_empty());

    controller.set_area_select(true);
    assert!(matches!(
        controller.drawing_state(),
        DrawingState::Drawing { vertices } if vertices.is_empty()
    ));
}

#[test]
fn re_enabling_markers_gives_exactly_one_popup_per_click() {
    let mut controller = loaded_controller();
    let now = Instant::now();

    controller.set_visualization_enabled(Visualization::Markers, false);
    controller.set_visualization_enabled(Visualization::Markers, true);
    controller.set_visualization_enabled(Visualization::Markers, true);

    assert_eq!(
        controller.surface().source_creations.get(AGENTS_SOURCE).copied(),
        Some(1)
    );

    let feature = controller.filtered_features().features[0].clone();
    controller
        .surface_mut()
        .place_rendered_features(UNCLUSTERED_LAYER, vec![feature]);

    fire(
        &mut controller,
        PointerEventKind::Click,
        151.0,
        -33.0,
        Some(UNCLUSTERED_LAYER),
        now,
    );

    assert_eq!(controller.surface().popups.len(), 1);
    assert_eq!(controller.surface().popups[0].content.name, "Ada");
}

#[test]
fn marker_clicks_are_ignored_while_selecting_an_area() {
    let mut controller = loaded_controller();
    let now = Instant::now();

    let feature = controller.filtered_features().features[0].clone();
    controller
        .surface_mut()
        .place_rendered_features(UNCLUSTERED_LAYER, vec![feature]);
    controller.set_area_select(true);

    fire(
        &mut controller,
        PointerEventKind::Click,
        151.0,
        -33.0,
        Some(UNCLUSTERED_LAYER),
        now,
    );

    assert!(controller.surface().popups.is_empty());
    // the same click still became a vertex
    assert_eq!(
        controller.drawing_state(),
        &DrawingState::Drawing {
            vertices: vec![Coord { x: 151.0, y: -33.0 }]
        }
    );
}

#[test]
fn filter_change_updates_both_sources_identically() {
    let mut controller = loaded_controller();
    controller.set_filters(division("Ops"));

    let markers = &controller.surface().source(AGENTS_SOURCE).unwrap().data;
    let heatmap = &controller.surface().source(HEATMAP_SOURCE).unwrap().data;

    assert_eq!(markers, heatmap);
    assert_eq!(markers, controller.filtered_features());
    assert_eq!(markers.features.len(), 1);

    controller.set_filters(FilterCriteria::new());
    let markers = &controller.surface().source(AGENTS_SOURCE).unwrap().data;
    assert_eq!(markers.features.len(), 4);
}

#[test]
fn toggles_and_filters_before_style_load_are_applied_on_load() {
    let mut controller = controller();
    controller.set_visualization_enabled(Visualization::Heatmap, true);
    controller.set_filters(division("Sales"));
    controller.on_records_loaded(Ok(agents()));
    controller.set_area_select(true);

    assert!(controller.surface().source_ids().is_empty());
    assert_eq!(controller.surface().subscription_count(), 0);

    controller.on_style_loaded();

    let heatmap = &controller.surface().source(HEATMAP_SOURCE).unwrap().data;
    assert_eq!(heatmap.features.len(), 3);
    assert!(!controller.surface().has_source(AGENTS_SOURCE));
    assert!(matches!(
        controller.drawing_state(),
        DrawingState::Drawing { .. }
    ));
    assert_eq!(controller.surface().cursor, Cursor::Crosshair);
}

#[test]
fn fetch_failure_renders_nothing_and_leaves_toggles_pending() {
    let mut controller = controller();
    controller.on_style_loaded();
    controller.set_visualization_enabled(Visualization::Markers, true);
    controller.on_records_loaded(Err(SourceError::Unavailable(
        "Active sheet not found".to_string(),
    )));

    assert!(controller.store().is_loaded());
    assert!(controller.filtered_features().features.is_empty());
    assert!(controller.surface().source_ids().is_empty());
    assert!(
        controller
            .layers()
            .is_pending(controller.surface(), Visualization::Markers)
    );
    assert!(controller.filter_options().for_attribute(FilterAttribute::Location).is_empty());
}

#[test]
fn recreated_surface_is_rebuilt_from_carried_state() {
    let mut controller = loaded_controller();
    controller.set_filters(division("Sales"));

    let old = controller.recreate_surface(HeadlessSurface::new());
    assert!(old.source_ids().is_empty());
    assert!(old.layer_ids().is_empty());
    assert_eq!(old.subscription_count(), 0);
    assert!(!controller.is_style_loaded());

    controller.on_style_loaded();
    let markers = &controller.surface().source(AGENTS_SOURCE).unwrap().data;
    assert_eq!(markers.features.len(), 3);
    assert!(controller.layers().handlers_bound());
    assert!(controller.surface().is_layer_visible(UNCLUSTERED_LAYER));
}
