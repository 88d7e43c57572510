use eframe::egui;
use crate::config::AppContext;
use crate::state::{AppState, InputIntent};
use crate::tags::TagAction;
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::image::LoadResult;
use super::{APP_TITLE, editor_id};

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);
const MIN_WINDOW_SIZE: [f32; 2] = [800.0, 600.0];

pub struct GuiApp {
    pub(super) state: AppState,
    pub(super) ctx: AppContext,
    pub(super) initial_scale_applied: bool,

    pub(super) file_list_width: f32,
    pub(super) max_image_dimension: f32,
    pub(super) preload_count: usize,

    pub(super) status_seen_serial: u64,
    pub(super) status_set_time: Option<Instant>,
    pub(super) last_title: String,
    pub(super) last_window_size: Option<(u32, u32)>,
    pub(super) closing: bool,
    pub(super) show_about: bool,

    // --- Image loading ---
    pub(super) texture_cache: HashMap<PathBuf, egui::TextureHandle>,
    pub(super) loading: HashSet<PathBuf>,
    pub(super) failed: HashSet<PathBuf>,
    pub(super) image_preload_tx: Sender<PathBuf>,
    pub(super) image_preload_rx: Receiver<LoadResult>,
    // Workers skip paths that are no longer in this set
    pub(super) active_window: Arc<RwLock<HashSet<PathBuf>>>,
    pub(super) last_preload_pos: Option<usize>,
    pub(super) last_preload_len: usize,
}

impl GuiApp {
    pub fn new(ctx: AppContext, initial_folder: Option<PathBuf>, auto_create_missing: bool) -> Self {
        let mut state = AppState::new(ctx.scan_config.extensions.clone(), ctx.scan_config.sort_order());
        state.auto_create_missing = auto_create_missing;

        let active_window = Arc::new(RwLock::new(HashSet::new()));
        let (tx, rx) = super::image::spawn_image_loader_pool(active_window.clone());

        let gui = &ctx.gui_config;
        let file_list_width = gui.file_list_width.unwrap_or(200.0);
        let max_image_dimension = gui.max_image_dimension.unwrap_or(1024) as f32;
        let preload_count = gui.preload_count.unwrap_or(4);
        let last_window_size = Some((gui.width.unwrap_or(1024), gui.height.unwrap_or(720)));

        // Folder from the command line wins over the one remembered from last time
        let folder = initial_folder.or_else(|| gui.last_folder.clone().filter(|p| p.is_dir()));
        if let Some(folder) = folder {
            state.handle_input(InputIntent::OpenFolder(folder));
        }

        Self {
            state,
            ctx,
            initial_scale_applied: false,
            file_list_width,
            max_image_dimension,
            preload_count,
            status_seen_serial: 0,
            status_set_time: None,
            last_title: String::new(),
            last_window_size,
            closing: false,
            show_about: false,
            texture_cache: HashMap::new(),
            loading: HashSet::new(),
            failed: HashSet::new(),
            image_preload_tx: tx,
            image_preload_rx: rx,
            active_window,
            last_preload_pos: None,
            last_preload_len: 0,
        }
    }

    pub fn run(self) -> Result<(), eframe::Error> {
        let (width, height) = self.last_window_size.unwrap_or((1024, 720));
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title(APP_TITLE)
                .with_inner_size([width as f32, height as f32])
                .with_min_inner_size(MIN_WINDOW_SIZE),
            ..Default::default()
        };

        let gui_config = self.ctx.gui_config.clone();

        eframe::run_native("tagedit", options, Box::new(move |cc| {
            let mut fonts = egui::FontDefinitions::default();

            let mut configure_font = |name: &str, family: egui::FontFamily| {
                match fs::read(name) {
                    Ok(data) => {
                        fonts.font_data.insert(name.to_owned(), Arc::new(egui::FontData::from_owned(data)));
                        if let Some(vec) = fonts.families.get_mut(&family) {
                            vec.insert(0, name.to_owned());
                        } else {
                            fonts.families.insert(family, vec![name.to_owned()]);
                        }
                    }
                    Err(e) => log::warn!("Failed to load font {:?}: {}", name, e),
                }
            };

            if let Some(mono) = &gui_config.font_monospace { configure_font(mono, egui::FontFamily::Monospace); }
            if let Some(ui_font) = &gui_config.font_ui { configure_font(ui_font, egui::FontFamily::Proportional); }

            cc.egui_ctx.set_fonts(fonts);
            Ok(Box::new(self))
        }))
    }

    /// Native folder picker. Blocks the frame until the dialog closes.
    pub(super) fn pick_folder(&mut self) {
        let mut dialog = rfd::FileDialog::new().set_title("Select Folder");
        if let Some(dir) = self.state.folder.as_ref() {
            dialog = dialog.set_directory(dir);
        }
        if let Some(folder) = dialog.pick_folder() {
            self.dispatch(InputIntent::OpenFolder(folder));
        }
    }

    /// Feeds an intent to the state machine and resets image caches after a rescan.
    pub(super) fn dispatch(&mut self, intent: InputIntent) {
        let serial_before = self.state.folder_serial;
        self.state.handle_input(intent);
        if self.state.folder_serial != serial_before {
            self.forget_images();
        }
    }

    fn get_title_string(&self) -> String {
        let dirty = if self.state.is_dirty() { "* " } else { "" };
        match (&self.state.folder, self.state.current_entry()) {
            (Some(_), Some(entry)) => format!("{}{} | {} | Files: {}", dirty, APP_TITLE, entry.file_name(), self.state.entries.len()),
            (Some(folder), None) => format!("{} | {}", APP_TITLE, folder.display()),
            _ => APP_TITLE.to_string(),
        }
    }

    fn update_status_timer(&mut self) {
        if self.state.status_serial != self.status_seen_serial {
            self.status_seen_serial = self.state.status_serial;
            self.status_set_time = Some(Instant::now());
        }
        if let Some(set_time) = self.status_set_time
            && set_time.elapsed() > STATUS_TIMEOUT
        {
            self.state.status_message = None;
            self.status_set_time = None;
        }
    }

    /// Window close: prompt for unsaved edits first, then remember geometry and folder.
    fn handle_close(&mut self, ctx: &egui::Context) {
        if self.closing {
            return;
        }
        if ctx.input(|i| i.viewport().close_requested()) {
            if self.state.is_dirty() {
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
                self.dispatch(InputIntent::Quit);
            } else {
                self.closing = true;
                self.persist_config();
            }
        } else if self.state.exit_requested {
            self.closing = true;
            self.persist_config();
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn persist_config(&self) {
        let mut gui_config = self.ctx.gui_config.clone();
        if let Some((w, h)) = self.last_window_size {
            gui_config.width = Some(w);
            gui_config.height = Some(h);
        }
        if self.state.folder.is_some() {
            gui_config.last_folder = self.state.folder.clone();
        }
        match self.ctx.save_gui_config(&gui_config) {
            Ok(()) => log::debug!("[config] saved window {:?}", self.last_window_size),
            Err(e) => log::error!("Error saving config: {:#}", e),
        }
    }

    fn show_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open Folder...  (Ctrl+O)").clicked() {
                        self.pick_folder();
                    }
                    if ui.add_enabled(self.state.folder.is_some(), egui::Button::new("Reload  (F5)")).clicked() {
                        self.dispatch(InputIntent::Reload);
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        self.dispatch(InputIntent::Quit);
                    }
                });
                ui.menu_button("Help", |ui| {
                    if ui.button("About").clicked() {
                        self.show_about = true;
                    }
                });
            });
        });
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(msg) = &self.state.status_message {
                    ui.colored_label(egui::Color32::GREEN, msg);
                } else {
                    ui.label("Ready");
                }

                if let Some(idx) = self.state.current_idx {
                    ui.separator();
                    ui.label(format!("[{}/{}]", idx + 1, self.state.entries.len()));
                    if let Some(entry) = self.state.current_entry() {
                        ui.separator();
                        ui.label(egui::RichText::new(entry.file_name()).family(egui::FontFamily::Monospace).strong());
                    }
                    if self.state.is_dirty() {
                        ui.separator();
                        ui.colored_label(egui::Color32::YELLOW, "unsaved");
                    }
                }
            });
        });
    }

    fn show_file_list(&mut self, ctx: &egui::Context, enabled: bool) {
        egui::SidePanel::left("file_list")
            .resizable(false)
            .exact_width(self.file_list_width)
            .show(ctx, |ui| {
                ui.label(egui::RichText::new("List -  Ctrl + \u{2b06}/\u{2b07}").strong());
                ui.separator();

                let mut clicked = None;
                ui.add_enabled_ui(enabled && self.state.has_images(), |ui| {
                    egui::ScrollArea::vertical()
                        .id_salt("file_list_scroll")
                        .auto_shrink([false, false])
                        .show(ui, |ui| {
                            for (idx, entry) in self.state.entries.iter().enumerate() {
                                let is_selected = self.state.current_idx == Some(idx);
                                let resp = ui.add(
                                    egui::Label::new(
                                        egui::RichText::new(entry.file_name()).family(egui::FontFamily::Monospace),
                                    )
                                    .truncate()
                                    .sense(egui::Sense::click()),
                                );
                                if is_selected {
                                    ui.painter().rect_filled(resp.rect.expand(1.0), 2.0, ui.visuals().selection.bg_fill.linear_multiply(0.5));
                                }
                                if resp.clicked() {
                                    clicked = Some(idx);
                                }
                                // Only scroll when the selection moved
                                if is_selected && self.state.selection_changed {
                                    resp.scroll_to_me(Some(egui::Align::Center));
                                }
                            }
                        });
                });
                self.state.selection_changed = false;

                if let Some(idx) = clicked {
                    self.dispatch(InputIntent::Select(idx));
                }
            });
    }

    fn show_editor_panel(&mut self, ctx: &egui::Context, enabled: bool) {
        let has_file = self.state.current_idx.is_some() && !self.state.current_unreadable;
        let has_images = self.state.has_images();

        egui::TopBottomPanel::bottom("editor_panel").resizable(false).show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| {
                let mut intent = None;

                ui.group(|ui| {
                    ui.label(egui::RichText::new("Tags - Ctrl + Enter to Save").strong());
                    let response = ui.add_enabled(
                        has_file,
                        egui::TextEdit::multiline(&mut self.state.buffer)
                            .id(editor_id())
                            .desired_rows(4)
                            .desired_width(f32::INFINITY),
                    );
                    if self.state.focus_editor && has_file {
                        self.state.focus_editor = false;
                        response.request_focus();
                        if let Some(mut edit_state) = egui::TextEdit::load_state(ui.ctx(), response.id) {
                            let end = egui::text::CCursor::new(self.state.buffer.chars().count());
                            edit_state.cursor.set_char_range(Some(egui::text::CCursorRange::one(end)));
                            edit_state.store(ui.ctx(), response.id);
                        }
                    }

                    ui.horizontal(|ui| {
                        if ui.add_enabled(has_file, egui::Button::new("Save")).clicked() {
                            intent = Some(InputIntent::Save);
                        }
                        if ui.add_enabled(has_images, egui::Button::new("Apply to All")).clicked() {
                            intent = Some(InputIntent::ApplyToAll);
                        }
                    });
                });

                ui.group(|ui| {
                    ui.label(egui::RichText::new("Quick Tag").strong());
                    ui.add_enabled(
                        has_images,
                        egui::TextEdit::singleline(&mut self.state.quick_tag)
                            .hint_text("Enter tag to append/prepend...")
                            .desired_width(f32::INFINITY),
                    );
                    ui.horizontal(|ui| {
                        if ui.add_enabled(has_file, egui::Button::new("Append")).clicked() {
                            intent = Some(InputIntent::QuickTag(TagAction::Append));
                        }
                        if ui.add_enabled(has_file, egui::Button::new("Prepend")).clicked() {
                            intent = Some(InputIntent::QuickTag(TagAction::Prepend));
                        }
                        if ui.add_enabled(has_images, egui::Button::new("Append to All")).clicked() {
                            intent = Some(InputIntent::QuickTagAll(TagAction::Append));
                        }
                        if ui.add_enabled(has_images, egui::Button::new("Prepend to All")).clicked() {
                            intent = Some(InputIntent::QuickTagAll(TagAction::Prepend));
                        }
                    });
                });

                if let Some(i) = intent {
                    self.dispatch(i);
                }
            });
        });
    }

    fn show_image_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(egui::RichText::new("Current Image").strong());
            ui.separator();
            if self.state.folder.is_none() {
                ui.centered_and_justified(|ui| {
                    ui.label("File \u{2192} Open Folder (Ctrl+O) to start.");
                });
                return;
            }
            self.render_current_image(ui);
        });
    }
}

impl eframe::App for GuiApp {
    // Required by eframe 0.34; all drawing happens in `update`, which eframe still calls first.
    fn ui(&mut self, _ui: &mut egui::Ui, _frame: &mut eframe::Frame) {}

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.initial_scale_applied {
            let user_scale = self.ctx.gui_config.font_scale.unwrap_or(1.0);
            ctx.set_pixels_per_point(ctx.pixels_per_point() * user_scale);
            self.initial_scale_applied = true;
        }

        // Stored in unscaled points so font_scale doesn't shrink the window on every restart
        if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
            let zoom = self.ctx.gui_config.font_scale.unwrap_or(1.0);
            self.last_window_size = Some(((rect.width() * zoom).round() as u32, (rect.height() * zoom).round() as u32));
        }

        let title = self.get_title_string();
        if title != self.last_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }

        self.update_status_timer();
        if self.status_set_time.is_some() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        self.receive_images(ctx);
        self.perform_preload();

        // Keys and dialogs run before the panels so they can consume shortcuts
        // the text fields would otherwise see.
        let blocked = super::dialogs::handle_dialogs(self, ctx);
        if !blocked {
            super::dialogs::handle_input(self, ctx);
        }

        self.show_menu_bar(ctx);
        self.show_status_bar(ctx);
        self.show_file_list(ctx, !blocked);
        self.show_editor_panel(ctx, !blocked);
        self.show_image_panel(ctx);

        self.handle_close(ctx);
    }
}
