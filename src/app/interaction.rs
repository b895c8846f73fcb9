use eframe::egui::{self, Pos2, Rect, Ui};

use crate::model::EdgeKey;

use super::render_utils::{distance_to_segment, screen_to_world};
use super::{GraphEvent, ViewModel};

const EDGE_HIT_DISTANCE: f32 = 5.0;

impl ViewModel {
    pub(in crate::app) fn gather_view_events(
        &self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
        events: &mut Vec<GraphEvent>,
    ) {
        let mut pan = self.pan;
        let mut zoom = self.zoom;
        let mut changed = false;

        if response.hovered() {
            let scroll = ui.input(|input| input.raw_scroll_delta.y);
            if scroll.abs() > f32::EPSILON {
                let pointer = ui
                    .input(|input| input.pointer.hover_pos())
                    .unwrap_or_else(|| rect.center());
                let world_before = screen_to_world(rect, pan, zoom, pointer);

                let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
                zoom = (zoom * zoom_factor).clamp(0.05, 6.0);
                pan = pointer - rect.center() - (world_before * zoom);
                changed = true;
            }
        }

        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            pan += response.drag_delta();
            changed = true;
        }

        if changed {
            events.push(GraphEvent::ViewChanged { pan, zoom });
        }
    }

    pub(in crate::app) fn hovered_index(
        ui: &Ui,
        visible_indices: &[usize],
        screen_positions: &[Pos2],
        screen_radii: &[f32],
    ) -> Option<(usize, f32)> {
        let pointer_pos = ui.input(|input| input.pointer.hover_pos());
        pointer_pos.and_then(|pointer| {
            visible_indices
                .iter()
                .filter_map(|index| {
                    let distance = screen_positions[*index].distance(pointer);
                    if distance <= screen_radii[*index] {
                        Some((*index, distance))
                    } else {
                        None
                    }
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
        })
    }

    fn edge_under_pointer(
        pointer: Pos2,
        edge_lines: &[(EdgeKey, Pos2, Pos2)],
    ) -> Option<&EdgeKey> {
        edge_lines
            .iter()
            .filter_map(|(key, start, end)| {
                let distance = distance_to_segment(pointer, *start, *end);
                if distance <= EDGE_HIT_DISTANCE {
                    Some((key, distance))
                } else {
                    None
                }
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(key, _)| key)
    }

    /// Translate pointer input over the canvas into events: hover changes,
    /// node drags with the primary button, and clicks on nodes, edges or
    /// the empty background.
    #[allow(clippy::too_many_arguments)]
    pub(in crate::app) fn gather_pointer_events(
        &self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
        ids: &[String],
        hovered: Option<usize>,
        edge_lines: &[(EdgeKey, Pos2, Pos2)],
        events: &mut Vec<GraphEvent>,
    ) {
        let hovered_id = hovered.and_then(|index| ids.get(index)).cloned();
        if hovered_id != self.hovered {
            events.push(GraphEvent::HoverChanged(hovered_id.clone()));
        }
        if hovered_id.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }

        if response.drag_started_by(egui::PointerButton::Primary)
            && let Some(id) = &hovered_id
        {
            events.push(GraphEvent::DragStarted(id.clone()));
        }

        let dragging = self
            .dragging
            .clone()
            .or_else(|| {
                if response.drag_started_by(egui::PointerButton::Primary) {
                    hovered_id.clone()
                } else {
                    None
                }
            });

        // A primary drag that did not start on a node pans the canvas.
        if dragging.is_none() && response.dragged_by(egui::PointerButton::Primary) {
            let delta = response.drag_delta();
            if delta != egui::Vec2::ZERO {
                events.push(GraphEvent::ViewChanged {
                    pan: self.pan + delta,
                    zoom: self.zoom,
                });
            }
        }

        if let Some(id) = &dragging {
            if response.dragged_by(egui::PointerButton::Primary)
                && let Some(pointer) = response.interact_pointer_pos()
            {
                events.push(GraphEvent::DragMoved {
                    id: id.clone(),
                    world: screen_to_world(rect, self.pan, self.zoom, pointer),
                });
            }
            if response.drag_stopped_by(egui::PointerButton::Primary) {
                events.push(GraphEvent::DragReleased(id.clone()));
            }
        }

        if response.clicked_by(egui::PointerButton::Primary) {
            if let Some(id) = hovered_id {
                events.push(GraphEvent::NodeClicked(id));
            } else if let Some(pointer) = response.interact_pointer_pos()
                && let Some(key) = Self::edge_under_pointer(pointer, edge_lines)
            {
                events.push(GraphEvent::EdgeClicked(key.clone()));
            } else {
                events.push(GraphEvent::BackgroundClicked);
            }
        }
    }
}
