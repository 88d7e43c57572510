mod app;
mod dialogs;
mod image;

pub use app::GuiApp;

pub const APP_TITLE: &str = "Image Tag Editor";

/// Fixed id so keyboard handling can tell whether the tag editor has focus.
pub(crate) fn editor_id() -> eframe::egui::Id {
    eframe::egui::Id::new("tag_editor")
}
