use crate::state::{InputIntent, Modal};
use eframe::egui;
use serde::Deserialize;

use super::app::GuiApp;
use super::editor_id;

#[derive(Deserialize)]
struct DepInfo {
    name: String,
    version: String,
    source: Option<String>,
}

/// Handle keyboard input for the main window. Not called while a dialog is open.
pub(super) fn handle_input(app: &mut GuiApp, ctx: &egui::Context) {
    if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::O)) {
        app.pick_folder();
        return;
    }
    if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::S)) {
        app.dispatch(InputIntent::Save);
        return;
    }
    if ctx.input(|i| i.key_pressed(egui::Key::F5)) && app.state.folder.is_some() {
        app.dispatch(InputIntent::Reload);
        return;
    }

    let editor_focused = ctx.memory(|m| m.has_focus(editor_id()));
    let any_text_focused = ctx.memory(|m| m.focused().is_some());

    if editor_focused {
        // Consume before the TextEdit runs so no newline is inserted
        if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::Enter)) {
            app.dispatch(InputIntent::SaveAndNext);
        } else if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::ArrowUp)) {
            app.dispatch(InputIntent::PrevItem);
        } else if ctx.input_mut(|i| i.consume_key(egui::Modifiers::COMMAND, egui::Key::ArrowDown)) {
            app.dispatch(InputIntent::NextItem);
        }
    } else if !any_text_focused {
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowUp)) {
            app.dispatch(InputIntent::PrevItem);
        } else if ctx.input(|i| i.key_pressed(egui::Key::ArrowDown)) {
            app.dispatch(InputIntent::NextItem);
        }
    }
}

/// Shows whichever dialog is active. Returns true while one blocks the main window.
pub(super) fn handle_dialogs(app: &mut GuiApp, ctx: &egui::Context) -> bool {
    if let Some(err_text) = app.state.error_popup.clone() {
        let enter = ctx.input_mut(|i| {
            i.consume_key(egui::Modifiers::NONE, egui::Key::Enter) || i.consume_key(egui::Modifiers::NONE, egui::Key::Escape)
        });
        egui::Window::new("Error").collapsible(false).resizable(false).anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0]).show(ctx, |ui| {
            ui.label(err_text);
            if ui.button("OK").clicked() || enter {
                app.dispatch(InputIntent::Cancel);
            }
        });
        return true;
    }

    if let Some(notice) = app.state.notice_popup.clone() {
        let enter = ctx.input_mut(|i| {
            i.consume_key(egui::Modifiers::NONE, egui::Key::Enter) || i.consume_key(egui::Modifiers::NONE, egui::Key::Escape)
        });
        egui::Window::new("No Images").collapsible(false).resizable(false).anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0]).show(ctx, |ui| {
            ui.label(notice);
            if ui.button("OK").clicked() || enter {
                app.dispatch(InputIntent::Cancel);
            }
        });
        return true;
    }

    if let Some(modal) = app.state.modal.clone() {
        show_modal(app, ctx, &modal);
        return true;
    }

    if app.show_about {
        show_about(app, ctx);
    }
    false
}

fn show_modal(app: &mut GuiApp, ctx: &egui::Context, modal: &Modal) {
    // Handle Y/N keys for confirmation dialogs
    let mut answer = None;
    if ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Y)) {
        answer = Some(InputIntent::Yes);
    } else if ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::N)) {
        answer = Some(InputIntent::No);
    } else if ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape)) {
        answer = Some(if modal.has_cancel() { InputIntent::Cancel } else { InputIntent::No });
    }

    egui::Window::new(modal.title())
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label(modal.message());
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Yes (y)").clicked() {
                    answer = Some(InputIntent::Yes);
                }
                if ui.button("No (n)").clicked() {
                    answer = Some(InputIntent::No);
                }
                if modal.has_cancel() && ui.button("Cancel (Esc)").clicked() {
                    answer = Some(InputIntent::Cancel);
                }
            });
        });

    if let Some(a) = answer {
        app.dispatch(a);
    }
}

fn show_about(app: &mut GuiApp, ctx: &egui::Context) {
    let deps: Vec<DepInfo> = serde_json::from_str(include_str!(env!("DEPS_INFO_PATH"))).unwrap_or_default();

    let mut open = true;
    egui::Window::new("About")
        .open(&mut open)
        .collapsible(false)
        .resizable(true)
        .default_height(400.0)
        .show(ctx, |ui| {
            ui.heading(format!("{} v{}", super::APP_TITLE, env!("CARGO_PKG_VERSION")));
            ui.label(format!("Build: {}", env!("APP_GIT_HASH")));
            ui.label("Edit the .txt tag files that sit next to your images.");
            ui.separator();
            ui.label(egui::RichText::new(format!("Dependencies ({})", deps.len())).strong());
            egui::ScrollArea::vertical().max_height(300.0).show(ui, |ui| {
                egui::Grid::new("about_deps").striped(true).show(ui, |ui| {
                    for dep in &deps {
                        ui.monospace(&dep.name);
                        ui.monospace(&dep.version);
                        let source = dep.source.as_deref().unwrap_or("local");
                        ui.label(egui::RichText::new(source).weak().small());
                        ui.end_row();
                    }
                });
            });
        });
    if !open || ctx.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Escape)) {
        app.show_about = false;
    }
}
