use std::collections::HashSet;

use eframe::egui::{Align2, Color32, FontId, Pos2, Sense, Stroke, Ui, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::model::EdgeKey;
use crate::sim::{initial_position, node_radius};
use crate::util::truncate_label;

use super::render_utils::{
    blend_color, circle_visible, dim_color, draw_background, edge_visible, kind_color,
    world_to_screen,
};
use super::ViewModel;

const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);
const HOVER_COLOR: Color32 = Color32::from_rgb(255, 164, 101);
const SEARCH_COLOR: Color32 = Color32::from_rgb(103, 196, 255);

impl ViewModel {
    fn search_matches(&self, labels: &[&str]) -> Option<HashSet<usize>> {
        let query = self.search.trim();
        if query.is_empty() {
            return None;
        }

        let matcher = SkimMatcherV2::default();
        Some(
            labels
                .iter()
                .enumerate()
                .filter_map(|(index, label)| {
                    matcher
                        .fuzzy_match(label, query)
                        .or_else(|| {
                            matcher.fuzzy_match(
                                &label.to_ascii_lowercase(),
                                &query.to_ascii_lowercase(),
                            )
                        })
                        .map(|_| index)
                })
                .collect(),
        )
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        let mut view_events = Vec::new();
        self.gather_view_events(ui, rect, &response, &mut view_events);
        self.apply_events(view_events);

        let Some(layout) = self.layout.take() else {
            ui.label("No nodes match the current filters.");
            return;
        };

        if layout.ids.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No nodes match the current filters.",
                FontId::proportional(14.0),
                Color32::from_gray(170),
            );
            self.layout = Some(layout);
            return;
        }

        let frame_delta_seconds = ui
            .ctx()
            .input(|input| input.stable_dt)
            .clamp(1.0 / 240.0, 1.0 / 20.0);
        let moving = self
            .sim
            .tick(&mut self.store, &layout, &self.sim_config, frame_delta_seconds);
        if moving || response.dragged() {
            ui.ctx().request_repaint();
        }

        let pan = self.pan;
        let zoom = self.zoom;
        let zoom_sqrt = zoom.sqrt();
        let node_count = layout.ids.len();

        let mut screen_positions = Vec::with_capacity(node_count);
        let mut screen_radii = Vec::with_capacity(node_count);
        let mut labels = Vec::with_capacity(node_count);
        for id in &layout.ids {
            let Some(state) = self.store.node(id) else {
                screen_positions.push(rect.center());
                screen_radii.push(0.0);
                labels.push("");
                continue;
            };
            let world = state.pos.unwrap_or_else(|| initial_position(id, node_count));
            screen_positions.push(world_to_screen(rect, pan, zoom, world));
            screen_radii
                .push((node_radius(state.node.weight) * zoom.powf(0.40)).clamp(2.5, 46.0));
            labels.push(state.node.label.as_str());
        }

        let visible_indices: Vec<usize> = (0..node_count)
            .filter(|&index| circle_visible(rect, screen_positions[index], screen_radii[index]))
            .collect();

        let hovered = Self::hovered_index(ui, &visible_indices, &screen_positions, &screen_radii);
        let hovered_index = hovered.map(|(index, _)| index);

        let search_matches = self.search_matches(&labels);
        let search_active = search_matches
            .as_ref()
            .is_some_and(|matches| !matches.is_empty());
        let focus_id = self.store.focus().map(str::to_owned);
        let focus_index = focus_id
            .as_deref()
            .and_then(|id| layout.index_by_id.get(id).copied());

        // Edges first, so nodes paint over them.
        let mut edge_lines: Vec<(EdgeKey, Pos2, Pos2)> = Vec::new();
        for (key, edge_state) in self.store.edges() {
            if edge_state.edge.weight < self.filter.min_edge_weight {
                continue;
            }
            let (Some(&src), Some(&dst)) = (
                layout.index_by_id.get(&key.source),
                layout.index_by_id.get(&key.target),
            ) else {
                continue;
            };

            let start = screen_positions[src];
            let end = screen_positions[dst];
            if !edge_visible(rect, start, end, 2.5) {
                continue;
            }

            let is_selected = self.selected_edge.as_ref() == Some(key);
            let touches_focus = focus_index.is_some_and(|focus| src == focus || dst == focus);

            let (line_width, line_color) = if is_selected {
                ((3.0 * zoom_sqrt).clamp(1.6, 5.2), SELECTED_COLOR)
            } else if touches_focus {
                (
                    ((0.9 + edge_state.edge.weight * 2.4) * zoom_sqrt).clamp(0.9, 4.6),
                    Color32::from_rgb(241, 146, 94),
                )
            } else {
                let alpha = (70.0 + edge_state.edge.weight * 130.0) as u8;
                (
                    ((0.7 + edge_state.edge.weight * 2.0) * zoom_sqrt).clamp(0.5, 3.6),
                    Color32::from_rgba_unmultiplied(110, 110, 118, alpha),
                )
            };
            painter.line_segment([start, end], Stroke::new(line_width, line_color));

            if is_selected {
                let mid = start + (end - start) * 0.5;
                painter.text(
                    mid + vec2(0.0, -8.0),
                    Align2::CENTER_BOTTOM,
                    &edge_state.edge.label,
                    FontId::proportional(11.0),
                    Color32::from_gray(230),
                );
            }

            edge_lines.push((key.clone(), start, end));
        }

        // Heavier nodes last, so they win overlaps.
        let mut draw_order: Vec<usize> = visible_indices.clone();
        draw_order.sort_by(|a, b| screen_radii[*a].total_cmp(&screen_radii[*b]));

        for index in draw_order {
            let id = &layout.ids[index];
            let Some(state) = self.store.node(id) else {
                continue;
            };
            let position = screen_positions[index];
            let radius = screen_radii[index];

            let is_focus = focus_index == Some(index);
            let is_hovered = hovered_index == Some(index);
            let is_match = search_matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&index));

            let base_color = kind_color(&state.node.kind);
            let color = if is_hovered {
                blend_color(base_color, HOVER_COLOR, 0.55)
            } else if is_focus {
                blend_color(base_color, SELECTED_COLOR, 0.65)
            } else if is_match {
                blend_color(base_color, SEARCH_COLOR, 0.60)
            } else if search_active {
                dim_color(base_color, 0.40)
            } else {
                base_color
            };

            painter.circle_filled(position, radius, color);
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(
                    if is_focus { 2.0 } else { 1.0 },
                    Color32::from_rgba_unmultiplied(15, 15, 15, 190),
                ),
            );
            if is_focus {
                painter.circle_stroke(
                    position,
                    radius + 4.0,
                    Stroke::new(1.5, SELECTED_COLOR),
                );
            }
            if state.pinned {
                painter.circle_filled(
                    position,
                    (radius * 0.28).clamp(1.5, 5.0),
                    Color32::from_gray(240),
                );
            }

            let should_draw_label = self.show_labels
                && (is_focus || is_hovered || is_match || radius > 15.0 || zoom > 1.25);
            if should_draw_label {
                painter.text(
                    position + vec2(radius + 5.0, 0.0),
                    Align2::LEFT_CENTER,
                    truncate_label(&state.node.label, 28),
                    FontId::proportional(12.0),
                    Color32::from_gray(238),
                );
            }
        }

        if let Some(index) = hovered_index
            && let Some(state) = self.store.node(&layout.ids[index])
        {
            let degree = self.store.incident_edges(&layout.ids[index]).count();
            let overlay = format!(
                "{}  |  {}  |  weight {:.1}  |  {} edges",
                state.node.label,
                state.node.kind.label(),
                state.node.weight,
                degree
            );
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                overlay,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }

        let mut pointer_events = Vec::new();
        self.gather_pointer_events(
            ui,
            rect,
            &response,
            &layout.ids,
            hovered_index,
            &edge_lines,
            &mut pointer_events,
        );
        self.layout = Some(layout);
        self.apply_events(pointer_events);
    }
}
