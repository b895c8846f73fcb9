//! The eframe application: a loading/ready/error state machine around the
//! view model that owns the graph store, merge engine, simulation and all
//! interaction state.

mod interaction;
mod panels;
mod render_utils;
mod view;

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eframe::egui::{self, Context, Vec2};
use log::info;
use serde_json::Value;

use crate::model::{EdgeKey, Snapshot};
use crate::remote::live::{ConnectionStatus, LiveChannel};
use crate::remote::mock::{demo_feed, MockGraphService};
use crate::remote::{FetchError, GraphService, HttpGraphService};
use crate::sim::{LayoutFilter, LayoutIndex, SimConfig, Simulation};
use crate::store::merge::MergeEngine;
use crate::store::GraphStore;

/// Startup options, straight from the CLI.
#[derive(Clone, Debug)]
pub struct AtlasConfig {
    pub service_url: Option<String>,
    pub focus: Option<String>,
    pub depth: u32,
    pub limit: usize,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            focus: None,
            depth: 2,
            limit: 150,
        }
    }
}

pub struct AtlasApp {
    config: AtlasConfig,
    service: Option<Arc<dyn GraphService>>,
    state: AppState,
}

enum AppState {
    Loading {
        rx: Receiver<Result<Snapshot, FetchError>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

impl AtlasApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: AtlasConfig) -> Self {
        match Self::build_service(&config) {
            Ok(service) => {
                let state = Self::start_initial_fetch(&service, &config);
                Self {
                    config,
                    service: Some(service),
                    state,
                }
            }
            Err(error) => Self {
                config,
                service: None,
                state: AppState::Error(format!("failed to build http client: {error}")),
            },
        }
    }

    fn build_service(config: &AtlasConfig) -> Result<Arc<dyn GraphService>, FetchError> {
        match &config.service_url {
            Some(url) => Ok(Arc::new(HttpGraphService::new(url.clone())?)),
            None => {
                info!("no service url given; exploring the built-in sample graph");
                Ok(Arc::new(MockGraphService::sample()))
            }
        }
    }

    fn start_initial_fetch(service: &Arc<dyn GraphService>, config: &AtlasConfig) -> AppState {
        let service = Arc::clone(service);
        let focus = config.focus.clone();
        let depth = config.depth;
        let limit = config.limit;
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = match &focus {
                Some(focus) => service.fetch_neighborhood(focus, depth, Some(limit)),
                None => service.fetch_overview(Some(limit)),
            };
            let _ = tx.send(result);
        });

        AppState::Loading { rx }
    }
}

impl eframe::App for AtlasApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(Ok(snapshot)) => {
                        transition = self.service.as_ref().map(|service| {
                            AppState::Ready(Box::new(ViewModel::new(
                                Arc::clone(service),
                                &self.config,
                                snapshot,
                            )))
                        });
                    }
                    Ok(Err(error)) => transition = Some(AppState::Error(error.to_string())),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        transition =
                            Some(AppState::Error("fetch worker disconnected".to_owned()));
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading knowledge graph...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
                ctx.request_repaint_after(Duration::from_millis(100));
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load the knowledge graph");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(match Self::build_service(&self.config) {
                            Ok(service) => {
                                let next = Self::start_initial_fetch(&service, &self.config);
                                self.service = Some(service);
                                next
                            }
                            Err(error) => {
                                AppState::Error(format!("failed to build http client: {error}"))
                            }
                        });
                    }
                });
            }
            AppState::Ready(model) => {
                model.show(ctx);
            }
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}

/// What a pending snapshot fetch was asked for; kept for status display and
/// for re-applying focus once the result lands.
#[derive(Clone, Debug)]
pub(crate) enum FetchScope {
    Overview,
    Neighborhood { focus: String, depth: u32 },
}

struct PendingFetch {
    token: u64,
    scope: FetchScope,
    rx: Receiver<Result<Snapshot, FetchError>>,
}

struct PendingDetails {
    id: String,
    rx: Receiver<Result<BTreeMap<String, Value>, FetchError>>,
}

/// User input gathered immediate-mode by the canvas and applied in one
/// place; see [`ViewModel::apply_events`].
#[derive(Clone, Debug)]
pub(crate) enum GraphEvent {
    NodeClicked(String),
    EdgeClicked(EdgeKey),
    BackgroundClicked,
    HoverChanged(Option<String>),
    DragStarted(String),
    DragMoved { id: String, world: Vec2 },
    DragReleased(String),
    ViewChanged { pan: Vec2, zoom: f32 },
}

pub(crate) struct ViewModel {
    service: Arc<dyn GraphService>,
    store: GraphStore,
    merge: MergeEngine,
    sim: Simulation,
    sim_config: SimConfig,
    layout: Option<LayoutIndex>,
    filter: LayoutFilter,
    applied_filter: LayoutFilter,

    live: LiveChannel,
    live_status: ConnectionStatus,

    fetch: Option<PendingFetch>,
    fetch_token: u64,
    fetch_error: Option<String>,
    depth: u32,
    limit: usize,

    details: Option<PendingDetails>,
    details_result: Option<(String, BTreeMap<String, Value>)>,
    details_error: Option<String>,

    pan: Vec2,
    zoom: f32,
    hovered: Option<String>,
    selected_edge: Option<EdgeKey>,
    dragging: Option<String>,
    search: String,
    show_labels: bool,
}

impl ViewModel {
    fn new(service: Arc<dyn GraphService>, config: &AtlasConfig, snapshot: Snapshot) -> Self {
        let mut store = GraphStore::new();
        let mut merge = MergeEngine::new();
        merge.apply_snapshot(&mut store, snapshot);
        store.set_focus(config.focus.as_deref());

        let live = match &config.service_url {
            Some(url) => {
                LiveChannel::connect_http(format!("{}/api/updates/stream", url.trim_end_matches('/')))
            }
            None => demo_feed(),
        };

        Self {
            service,
            store,
            merge,
            sim: Simulation::new(),
            sim_config: SimConfig::default(),
            layout: None,
            filter: LayoutFilter::default(),
            applied_filter: LayoutFilter::default(),
            live,
            live_status: ConnectionStatus::Disconnected,
            fetch: None,
            fetch_token: 0,
            fetch_error: None,
            depth: config.depth,
            limit: config.limit,
            details: None,
            details_result: None,
            details_error: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            hovered: None,
            selected_edge: None,
            dragging: None,
            search: String::new(),
            show_labels: true,
        }
    }

    fn show(&mut self, ctx: &Context) {
        self.poll_live();
        self.poll_fetch(ctx);
        self.poll_details();
        self.ensure_layout();

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| self.draw_top_bar(ui));

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| self.draw_graph(ui));
    }

    /// Rebuild the layout index when membership or the view filter changed.
    fn ensure_layout(&mut self) {
        let stale = match &self.layout {
            Some(layout) => layout.is_stale(&self.store) || self.filter != self.applied_filter,
            None => true,
        };
        if stale {
            self.layout = Some(LayoutIndex::build(&self.store, &self.filter));
            self.applied_filter = self.filter.clone();
        }
    }

    fn poll_live(&mut self) {
        use crate::remote::live::ChannelMessage;

        let mut membership_changed = false;
        let mut invalidated = false;

        for message in self.live.poll() {
            match message {
                ChannelMessage::Status(status) => {
                    if status != self.live_status {
                        info!("live channel status: {status:?}");
                    }
                    self.live_status = status;
                }
                ChannelMessage::Event(event) => {
                    let outcome = self.merge.apply_event(&mut self.store, event);
                    membership_changed |= outcome.membership_changed();
                    invalidated |= outcome.snapshot_invalidated;
                }
            }
        }

        if membership_changed {
            self.sim.reheat(0.6);
        }
        if invalidated {
            self.refetch_current_scope();
        }
    }

    fn poll_fetch(&mut self, ctx: &Context) {
        let Some(pending) = &self.fetch else {
            return;
        };

        match pending.rx.try_recv() {
            Ok(result) => {
                let token = pending.token;
                let scope = pending.scope.clone();
                self.fetch = None;

                // A newer request supersedes this one; drop the result.
                if token != self.fetch_token {
                    info!("discarding superseded fetch result (token {token})");
                    return;
                }

                match result {
                    Ok(snapshot) => {
                        self.merge.apply_snapshot(&mut self.store, snapshot);
                        if let FetchScope::Neighborhood { focus, .. } = &scope {
                            self.store.set_focus(Some(focus.as_str()));
                        }
                        self.fetch_error = None;
                        self.sim.reheat(1.0);
                    }
                    Err(error) => {
                        // Previous graph stays visible and interactive.
                        self.fetch_error = Some(error.to_string());
                    }
                }
            }
            Err(TryRecvError::Empty) => {
                ctx.request_repaint_after(Duration::from_millis(100));
            }
            Err(TryRecvError::Disconnected) => {
                self.fetch = None;
                self.fetch_error = Some("fetch worker disconnected".to_owned());
            }
        }
    }

    fn poll_details(&mut self) {
        let Some(pending) = &self.details else {
            return;
        };

        match pending.rx.try_recv() {
            Ok(Ok(details)) => {
                self.details_result = Some((pending.id.clone(), details));
                self.details_error = None;
                self.details = None;
            }
            Ok(Err(error)) => {
                self.details_error = Some(error.to_string());
                self.details = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.details = None;
            }
        }
    }

    pub(crate) fn request_fetch(&mut self, scope: FetchScope) {
        self.fetch_token += 1;
        let token = self.fetch_token;
        let service = Arc::clone(&self.service);
        let limit = self.limit;
        let worker_scope = scope.clone();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = match &worker_scope {
                FetchScope::Overview => service.fetch_overview(Some(limit)),
                FetchScope::Neighborhood { focus, depth } => {
                    service.fetch_neighborhood(focus, *depth, Some(limit))
                }
            };
            let _ = tx.send(result);
        });

        self.fetch = Some(PendingFetch { token, scope, rx });
    }

    pub(crate) fn refetch_current_scope(&mut self) {
        let scope = match self.store.focus() {
            Some(focus) => FetchScope::Neighborhood {
                focus: focus.to_owned(),
                depth: self.depth,
            },
            None => FetchScope::Overview,
        };
        self.request_fetch(scope);
    }

    pub(crate) fn request_details(&mut self, id: String) {
        let service = Arc::clone(&self.service);
        let worker_id = id.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(service.entity_details(&worker_id));
        });
        self.details = Some(PendingDetails { id, rx });
    }

    /// The single consumer of interaction events; every store mutation
    /// driven by input happens here, in arrival order.
    pub(crate) fn apply_events(&mut self, events: Vec<GraphEvent>) {
        for event in events {
            match event {
                GraphEvent::NodeClicked(id) => {
                    self.selected_edge = None;
                    self.store.set_focus(Some(id.as_str()));
                    self.request_details(id.clone());
                    self.request_fetch(FetchScope::Neighborhood {
                        focus: id,
                        depth: self.depth,
                    });
                }
                GraphEvent::EdgeClicked(key) => {
                    self.selected_edge = Some(key);
                }
                GraphEvent::BackgroundClicked => {
                    self.selected_edge = None;
                }
                GraphEvent::HoverChanged(hovered) => {
                    self.hovered = hovered;
                }
                GraphEvent::DragStarted(id) => {
                    // Dragging pins the node for the duration; the release
                    // policy below keeps the pin until explicitly cleared.
                    self.store.set_pinned(&id, true);
                    self.dragging = Some(id);
                    self.sim.reheat(0.3);
                }
                GraphEvent::DragMoved { id, world } => {
                    self.store.set_position(&id, world);
                    self.sim.reheat(0.3);
                }
                GraphEvent::DragReleased(_id) => {
                    // Remains pinned until an explicit unpin action.
                    self.dragging = None;
                }
                GraphEvent::ViewChanged { pan, zoom } => {
                    self.pan = pan;
                    self.zoom = zoom;
                }
            }
        }
    }

    /// Forget all layout state so the next frames rebuild positions from
    /// the deterministic spawn points.
    pub(crate) fn reset_layout(&mut self) {
        let ids: Vec<String> = self.store.nodes().map(|(id, _)| id.clone()).collect();
        for id in &ids {
            if let Some(state) = self.store.node_mut(id) {
                state.pos = None;
                state.vel = Vec2::ZERO;
                state.pinned = false;
            }
        }
        self.pan = Vec2::ZERO;
        self.zoom = 1.0;
        self.sim.reheat(1.0);
    }

    pub(crate) fn set_depth(&mut self, depth: u32) {
        if depth == self.depth {
            return;
        }
        self.depth = depth;
        if self.store.focus().is_some() {
            self.refetch_current_scope();
        }
    }
}
