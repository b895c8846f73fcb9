use eframe::egui::{self, Align, Color32, Layout, RichText, Ui};

use crate::model::NodeKind;
use crate::remote::live::ConnectionStatus;

use super::{FetchScope, GraphEvent, ViewModel};

impl ViewModel {
    pub(in crate::app) fn draw_top_bar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.heading("Knowledge Atlas");
            ui.separator();
            ui.label(format!("nodes: {}", self.store.node_count()));
            ui.label(format!("edges: {}", self.store.edge_count()));
            if let Some(focus) = self.store.focus() {
                ui.label(format!("focus: {focus}"));
            }

            if self.fetch.is_some() {
                ui.spinner();
                ui.label("fetching...");
            } else if let Some(error) = &self.fetch_error {
                ui.colored_label(
                    Color32::from_rgb(235, 110, 100),
                    format!("fetch failed: {error}"),
                );
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                match self.live_status {
                    ConnectionStatus::Connected => {
                        ui.colored_label(Color32::from_rgb(120, 210, 130), "live");
                    }
                    ConnectionStatus::Disconnected => {
                        ui.colored_label(Color32::from_gray(140), "offline");
                    }
                }
                ui.label(format!("energy {:.2}", self.sim.energy()));
            });
        });
    }

    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        let mut pending_events: Vec<GraphEvent> = Vec::new();

        ui.heading("Exploration");
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.label("Search:");
            ui.text_edit_singleline(&mut self.search);
            if !self.search.is_empty() && ui.small_button("x").clicked() {
                self.search.clear();
            }
        });

        let mut depth = self.depth;
        ui.add(egui::Slider::new(&mut depth, 1..=5).text("neighborhood depth"));
        self.set_depth(depth);

        ui.add(egui::Slider::new(&mut self.limit, 25..=500).text("node limit"));

        ui.horizontal(|ui| {
            if ui.button("Fetch overview").clicked() {
                self.store.set_focus(None);
                self.request_fetch(FetchScope::Overview);
            }
            if ui.button("Refetch").clicked() {
                self.refetch_current_scope();
            }
            if self.store.focus().is_some() && ui.button("Clear focus").clicked() {
                self.store.set_focus(None);
            }
        });

        ui.separator();
        ui.label(RichText::new("Filters").strong());
        ui.add(
            egui::Slider::new(&mut self.filter.min_edge_weight, 0.0..=1.0)
                .text("min edge weight"),
        );
        for kind in NodeKind::KNOWN {
            let mut shown = !self.filter.hidden_kinds.contains(&kind);
            if ui.checkbox(&mut shown, kind.label()).changed() {
                if shown {
                    self.filter.hidden_kinds.remove(&kind);
                } else {
                    self.filter.hidden_kinds.insert(kind.clone());
                }
            }
        }
        ui.checkbox(&mut self.show_labels, "show labels");

        ui.separator();
        ui.label(RichText::new("Layout").strong());
        ui.add(
            egui::Slider::new(&mut self.sim_config.repulsion, 200.0..=8000.0).text("repulsion"),
        );
        ui.add(egui::Slider::new(&mut self.sim_config.spring, 0.01..=0.6).text("spring"));
        ui.add(
            egui::Slider::new(&mut self.sim_config.center_pull, 0.0..=0.2).text("center pull"),
        );
        ui.add(egui::Slider::new(&mut self.sim_config.collision, 0.0..=2.0).text("collision"));
        ui.add(
            egui::Slider::new(&mut self.sim_config.velocity_damping, 0.5..=0.98)
                .text("damping"),
        );
        ui.horizontal(|ui| {
            if ui.button("Reheat layout").clicked() {
                self.sim.reheat(1.0);
            }
            if ui.button("Reset layout").clicked() {
                self.reset_layout();
            }
        });

        let pinned = self.store.pinned_ids();
        if !pinned.is_empty() {
            ui.horizontal(|ui| {
                ui.label(format!("{} pinned", pinned.len()));
                if ui.small_button("release all").clicked() {
                    self.store.release_all_pins();
                    self.sim.reheat(0.6);
                }
            });
            for id in &pinned {
                let label = self
                    .store
                    .node(id)
                    .map(|state| state.node.label.clone())
                    .unwrap_or_else(|| id.clone());
                ui.horizontal(|ui| {
                    ui.label(label);
                    if ui.small_button("unpin").clicked() {
                        self.store.set_pinned(id, false);
                        self.sim.reheat(0.4);
                    }
                });
            }
        }

        ui.separator();
        ui.label(RichText::new("Nodes").strong());
        let query = self.search.trim().to_ascii_lowercase();
        let mut rows: Vec<(String, String)> = self
            .store
            .nodes()
            .filter(|(_, state)| {
                query.is_empty() || state.node.label.to_ascii_lowercase().contains(&query)
            })
            .map(|(id, state)| (id.clone(), state.node.label.clone()))
            .collect();
        rows.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let focus = self.store.focus().map(str::to_owned);
        egui::ScrollArea::vertical()
            .id_salt("node_list_scroll")
            .auto_shrink([false, false])
            .show_rows(ui, 20.0, rows.len(), |ui, row_range| {
                for index in row_range {
                    let Some((id, label)) = rows.get(index) else {
                        continue;
                    };
                    let is_focus = focus.as_deref() == Some(id.as_str());
                    if ui
                        .selectable_label(is_focus, label)
                        .on_hover_text(id.as_str())
                        .clicked()
                    {
                        pending_events.push(GraphEvent::NodeClicked(id.clone()));
                    }
                }
            });

        self.apply_events(pending_events);
    }

    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Details");
        ui.add_space(6.0);

        let mut pending_events: Vec<GraphEvent> = Vec::new();

        if let Some(key) = self.selected_edge.clone() {
            if let Some(edge_state) = self.store.edge(&key) {
                ui.label(RichText::new(&key.label).strong());
                ui.add_space(4.0);
                ui.label(format!("from: {}", key.source));
                ui.label(format!("to: {}", key.target));
                ui.label(format!("weight: {:.2}", edge_state.edge.weight));
                if !edge_state.edge.properties.is_empty() {
                    ui.separator();
                    for (name, value) in &edge_state.edge.properties {
                        ui.label(format!("{name}: {value}"));
                    }
                }
            } else {
                ui.label("The selected relation is no longer in the graph.");
            }
            return;
        }

        let Some(focus) = self.store.focus().map(str::to_owned) else {
            ui.label("Click a node to focus it, or a relation to inspect it.");
            return;
        };

        let Some(state) = self.store.node(&focus) else {
            ui.label("The focused entity is no longer in the graph.");
            return;
        };

        ui.label(RichText::new(&state.node.label).strong());
        ui.small(focus.as_str());
        ui.add_space(6.0);
        ui.label(format!("type: {}", state.node.kind.label()));
        ui.label(format!("weight: {:.1}", state.node.weight));
        if state.pinned {
            ui.label("pinned in place");
        }

        if !state.node.properties.is_empty() {
            ui.separator();
            for (name, value) in &state.node.properties {
                ui.label(format!("{name}: {value}"));
            }
        }

        ui.separator();
        ui.label(RichText::new("Service details").strong());
        match &self.details_result {
            Some((id, details)) if *id == focus => {
                for (name, value) in details {
                    ui.label(format!("{name}: {value}"));
                }
            }
            _ => {
                if self.details.as_ref().is_some_and(|p| p.id == focus) {
                    ui.spinner();
                } else if let Some(error) = &self.details_error {
                    ui.colored_label(
                        Color32::from_rgb(235, 110, 100),
                        format!("lookup failed: {error}"),
                    );
                } else if ui.small_button("look up").clicked() {
                    self.request_details(focus.clone());
                }
            }
        }

        ui.separator();
        ui.label(RichText::new("Relations").strong());
        let mut incident: Vec<(String, String, f32, String)> = self
            .store
            .incident_edges(&focus)
            .map(|(key, edge_state)| {
                let other = if key.source == focus {
                    key.target.clone()
                } else {
                    key.source.clone()
                };
                (key.label.clone(), other, edge_state.edge.weight, key.source.clone())
            })
            .collect();
        incident.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.1.cmp(&b.1)));

        if incident.is_empty() {
            ui.label("No relations in the current view.");
        } else {
            egui::ScrollArea::vertical()
                .id_salt("relations_scroll")
                .max_height(320.0)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for (label, other, weight, source) in &incident {
                        let direction = if *source == focus { "->" } else { "<-" };
                        let other_label = self
                            .store
                            .node(other)
                            .map(|state| state.node.label.clone())
                            .unwrap_or_else(|| other.clone());
                        let text = format!("{label} {direction} {other_label}  ({weight:.2})");
                        if ui.link(text).on_hover_text(other.as_str()).clicked() {
                            pending_events.push(GraphEvent::NodeClicked(other.clone()));
                        }
                    }
                });
        }

        self.apply_events(pending_events);
    }
}
