//! Event entry points tying records, filters, layers and area selection to one surface.
//!
//! Every input (style load, record fetch completion, filter change, toggle,
//! pointer event, timer tick) is a method call on [`MapController`]; they are
//! expected to arrive serially from a single event loop.

use crate::config::{MapConfig, ViewState};
use crate::drawing::{AreaSelector, DrawingOutcome, DrawingState};
use crate::export::SelectionExporter;
use crate::filter::{FilterCriteria, FilterOptions};
use crate::layers::{LayerManager, Visualization};
use crate::projection::{empty_collection, project};
use crate::records::{AgentRecord, RecordStore};
use crate::source::SourceError;
use crate::spatial::select_records_within;
use crate::surface::{PointerEvent, RenderSurface, SubscriptionId};
use geo_types::Coord;
use geojson::FeatureCollection;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct MapController<S: RenderSurface, E: SelectionExporter> {
    config: MapConfig,
    surface: S,
    style_loaded: bool,
    store: RecordStore,
    criteria: FilterCriteria,
    // latest filtered projection; handlers and selection read from here
    filtered: FeatureCollection,
    layers: LayerManager,
    selector: AreaSelector,
    area_select_requested: bool,
    exporter: E,
}

impl<S: RenderSurface, E: SelectionExporter> MapController<S, E> {
    pub fn new(config: MapConfig, mut surface: S, exporter: E) -> Self {
        apply_view(&mut surface, config.initial_view);

        let layers = LayerManager::new(config.markers.clone(), config.heatmap.clone());
        let selector = AreaSelector::new(config.drawing_grace());

        Self {
            config,
            surface,
            style_loaded: false,
            store: RecordStore::new(),
            criteria: FilterCriteria::new(),
            filtered: empty_collection(),
            layers,
            selector,
            area_select_requested: false,
            exporter,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn filtered_features(&self) -> &FeatureCollection {
        &self.filtered
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions::from_records(self.store.all())
    }

    pub fn layers(&self) -> &LayerManager {
        &self.layers
    }

    pub fn drawing_state(&self) -> &DrawingState {
        self.selector.state()
    }

    pub fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    pub fn is_area_select_active(&self) -> bool {
        self.area_select_requested
    }

    /// The surface can now take sources and layers; applies everything recorded so far.
    pub fn on_style_loaded(&mut self) {
        if self.style_loaded {
            return;
        }
        self.style_loaded = true;

        self.layers.reconcile(&mut self.surface);

        if self.area_select_requested {
            self.selector.activate(&mut self.surface);
        }

        debug!("Map style loaded");
    }

    /// Completion of the record fetch. A failure leaves the map with zero features.
    pub fn on_records_loaded(&mut self, result: Result<Vec<AgentRecord>, SourceError>) {
        match result {
            Ok(records) => {
                self.store.load(records);
                info!("Record store holds {} mappable agents", self.store.len());
            }
            Err(e) => {
                warn!("Could not load agent records, showing none: {}", e);
                self.store.load_empty();
            }
        }

        self.recompute();
    }

    /// Replaces the whole criteria value and pushes the new filtered set to every layer.
    pub fn set_filters(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.recompute();
    }

    pub fn set_visualization_enabled(&mut self, kind: Visualization, enabled: bool) {
        if self.style_loaded {
            self.layers
                .set_visualization_enabled(&mut self.surface, kind, enabled);
        } else {
            self.layers.record_enabled(kind, enabled);
        }
    }

    pub fn set_area_select(&mut self, active: bool) {
        self.area_select_requested = active;
        self.layers.set_interaction_suspended(active);

        if !self.style_loaded {
            return;
        }

        if active {
            self.selector.activate(&mut self.surface);
        } else {
            self.selector.deactivate(&mut self.surface);
        }
    }

    /// Routes one delivered pointer event to whichever component owns the subscription.
    ///
    /// Returns the exported records when the event closed a selection polygon.
    pub fn handle_pointer(
        &mut self,
        subscription: SubscriptionId,
        event: &PointerEvent,
        now: Instant,
    ) -> Option<Vec<AgentRecord>> {
        if self.layers.owns(subscription) {
            self.layers
                .handle_pointer(&mut self.surface, subscription, event);
            return None;
        }

        if !self.selector.owns(subscription) {
            debug!("Ignoring event for stale subscription {:?}", subscription);
            return None;
        }

        match self
            .selector
            .handle_pointer(&mut self.surface, subscription, event, now)
        {
            DrawingOutcome::Completed { ring } => Some(self.complete_selection(&ring)),
            DrawingOutcome::NotEnoughVertices { count } => {
                debug!("Need at least 3 vertices to close the area, have {}", count);
                None
            }
            DrawingOutcome::VertexAdded { .. } | DrawingOutcome::Ignored => None,
        }
    }

    /// Timer entry point; runs any drawing cleanup that has come due.
    pub fn tick(&mut self, now: Instant) {
        self.selector.poll_cleanup(&mut self.surface, now);
    }

    /// Swaps in a new surface, clearing everything from the old one.
    ///
    /// Flags, criteria and data carry over and are applied once the new
    /// surface reports its style loaded. Returns the old surface.
    pub fn recreate_surface(&mut self, mut surface: S) -> S {
        self.layers.teardown(&mut self.surface);
        self.selector.deactivate(&mut self.surface);

        apply_view(&mut surface, self.config.initial_view);
        self.style_loaded = false;
        std::mem::replace(&mut self.surface, surface)
    }

    fn recompute(&mut self) {
        self.filtered = project(self.store.filtered(&self.criteria));

        debug!(
            "{} of {} agents match {} active filters",
            self.filtered.features.len(),
            self.store.len(),
            self.criteria.active_count()
        );

        if self.style_loaded {
            self.layers
                .refresh_data(&mut self.surface, self.filtered.clone());
        } else {
            self.layers.stage_data(self.filtered.clone());
        }
    }

    fn complete_selection(&mut self, ring: &[Coord<f64>]) -> Vec<AgentRecord> {
        let selection: Vec<AgentRecord> =
            select_records_within(ring, self.store.filtered(&self.criteria))
                .into_iter()
                .cloned()
                .collect();

        info!("Area selection contains {} agents", selection.len());

        if let Err(e) = self.exporter.deliver(&selection) {
            warn!("Could not export selection: {}", e);
        }

        self.selector.finish_selection();
        self.area_select_requested = false;
        self.layers.set_interaction_suspended(false);

        selection
    }
}

fn apply_view<S: RenderSurface + ?Sized>(surface: &mut S, view: ViewState) {
    surface.ease_to(
        Coord {
            x: view.longitude,
            y: view.latitude,
        },
        Some(view.zoom),
    );
}
