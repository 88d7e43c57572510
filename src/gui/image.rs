use eframe::egui;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;
use crossbeam_channel::{unbounded, Receiver, Sender};
use fast_image_resize::images::Image as FastImage;
use fast_image_resize::{PixelType, ResizeOptions, Resizer};

use super::app::GuiApp;

/// Decoded images larger than this are downscaled before upload.
pub const MAX_TEXTURE_SIDE: usize = 2048;

pub(super) enum LoadOutcome {
    Loaded(egui::ColorImage),
    /// Left the preload window before a worker got to it.
    Skipped,
    Failed,
}

pub(super) type LoadResult = (PathBuf, LoadOutcome);

pub(super) fn spawn_image_loader_pool(active_window: Arc<RwLock<HashSet<PathBuf>>>) -> (Sender<PathBuf>, Receiver<LoadResult>) {
    let (tx, rx) = unbounded::<PathBuf>();
    let (result_tx, result_rx) = unbounded();

    let num_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2).min(4);

    for _ in 0..num_threads {
        let rx_clone = rx.clone();
        let tx_clone = result_tx.clone();
        let window_clone = active_window.clone();

        thread::spawn(move || {
            while let Ok(path) = rx_clone.recv() {
                // Skip if the user already moved away
                if let Ok(window) = window_clone.read()
                    && !window.contains(&path)
                {
                    let _ = tx_clone.send((path, LoadOutcome::Skipped));
                    continue;
                }

                let outcome = match load_and_process_image(&path) {
                    Some((color_image, _)) => LoadOutcome::Loaded(color_image),
                    None => LoadOutcome::Failed,
                };
                if tx_clone.send((path, outcome)).is_err() {
                    break;
                }
            }
        });
    }

    (tx, result_rx)
}

fn load_and_process_image(path: &Path) -> Option<(egui::ColorImage, (u32, u32))> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("[loader] read {:?}: {}", path, e);
            return None;
        }
    };

    let mut reader = image::ImageReader::new(std::io::Cursor::new(&bytes))
        .with_guessed_format()
        .unwrap_or_else(|_| image::ImageReader::new(std::io::Cursor::new(&bytes)));
    // Fall back to the extension if the magic bytes didn't work
    if reader.format().is_none()
        && let Ok(fmt) = image::ImageFormat::from_path(path)
    {
        reader.set_format(fmt);
    }

    let dyn_img = match reader.decode() {
        Ok(img) => img,
        Err(e) => {
            log::warn!("[loader] decode {:?}: {}", path, e);
            return None;
        }
    };
    let dims = (dyn_img.width(), dyn_img.height());
    let rgba = dyn_img.to_rgba8();
    let mut color_image = egui::ColorImage::from_rgba_unmultiplied(
        [dims.0 as usize, dims.1 as usize],
        rgba.as_flat_samples().as_slice(),
    );

    let (w, h) = (dims.0 as usize, dims.1 as usize);
    if w > MAX_TEXTURE_SIDE || h > MAX_TEXTURE_SIDE {
        let scale = (MAX_TEXTURE_SIDE as f32) / (w.max(h) as f32);
        let new_w = ((w as f32 * scale).round() as u32).max(1);
        let new_h = ((h as f32 * scale).round() as u32).max(1);

        if let Ok(src_image) = FastImage::from_vec_u8(dims.0, dims.1, rgba.into_raw(), PixelType::U8x4) {
            let mut dst_image = FastImage::new(new_w, new_h, PixelType::U8x4);
            let mut resizer = Resizer::new();
            if resizer.resize(&src_image, &mut dst_image, &ResizeOptions::default()).is_ok() {
                log::debug!("[loader] resized {:?} from {}x{} to {}x{}", path.file_name().unwrap_or_default(), w, h, new_w, new_h);
                color_image = egui::ColorImage::from_rgba_unmultiplied(
                    [new_w as usize, new_h as usize],
                    dst_image.buffer(),
                );
            }
        }
    }

    Some((color_image, dims))
}

/// Largest size with the image's aspect ratio that fits inside `bounds`. Small images are enlarged.
pub fn fit_size(image: egui::Vec2, bounds: egui::Vec2) -> egui::Vec2 {
    if image.x <= 0.0 || image.y <= 0.0 || bounds.x <= 0.0 || bounds.y <= 0.0 {
        return egui::Vec2::ZERO;
    }
    let scale = (bounds.x / image.x).min(bounds.y / image.y);
    image * scale
}

/// Viewport bounds clamped to the configured maximum on each axis.
pub fn view_bounds(available: egui::Vec2, max_dimension: f32) -> egui::Vec2 {
    egui::vec2(available.x.min(max_dimension), available.y.min(max_dimension))
}

impl GuiApp {
    /// Keeps the current image and its neighbours decoded; drops textures outside that window.
    pub(super) fn perform_preload(&mut self) {
        let Some(current) = self.state.current_idx else { return };
        if self.last_preload_pos == Some(current) && self.last_preload_len == self.state.entries.len() {
            return;
        }
        self.last_preload_pos = Some(current);
        self.last_preload_len = self.state.entries.len();

        let len = self.state.entries.len();
        let radius = self.preload_count / 2;
        let start = current.saturating_sub(radius);
        let end = (current + radius + 1).min(len);

        // Current first, then outward
        let mut order = vec![current];
        for d in 1..=radius {
            if current + d < end { order.push(current + d); }
            if current >= start + d { order.push(current - d); }
        }
        let paths: Vec<PathBuf> = order.iter().map(|&i| self.state.entries[i].image.clone()).collect();

        let active: HashSet<PathBuf> = paths.iter().cloned().collect();
        if let Ok(mut w) = self.active_window.write() {
            *w = active.clone();
        }

        for path in &paths {
            if !self.texture_cache.contains_key(path) && !self.loading.contains(path) && !self.failed.contains(path) {
                self.loading.insert(path.clone());
                let _ = self.image_preload_tx.send(path.clone());
            }
        }

        self.texture_cache.retain(|k, _| active.contains(k));
        self.loading.retain(|k| active.contains(k));
    }

    pub(super) fn receive_images(&mut self, ctx: &egui::Context) {
        while let Ok((path, outcome)) = self.image_preload_rx.try_recv() {
            match outcome {
                LoadOutcome::Loaded(color_image) => {
                    self.loading.remove(&path);
                    let name = format!("img_{}", path.display());
                    let texture = ctx.load_texture(name, color_image, Default::default());
                    self.texture_cache.insert(path, texture);
                }
                LoadOutcome::Failed => {
                    self.loading.remove(&path);
                    self.failed.insert(path);
                }
                // A newer request for the same path may still be in flight
                LoadOutcome::Skipped => {}
            }
            ctx.request_repaint();
        }
        if !self.loading.is_empty() {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }
    }

    pub(super) fn forget_images(&mut self) {
        self.texture_cache.clear();
        self.loading.clear();
        self.failed.clear();
        self.last_preload_pos = None;
        if let Ok(mut w) = self.active_window.write() { w.clear(); }
    }

    pub(super) fn render_current_image(&self, ui: &mut egui::Ui) {
        let available = ui.available_size();
        let (rect, _) = ui.allocate_exact_size(available, egui::Sense::hover());

        let Some(path) = self.state.current_image_path() else { return };

        if let Some(texture) = self.texture_cache.get(path) {
            let bounds = view_bounds(rect.size(), self.max_image_dimension);
            let size = fit_size(texture.size_vec2(), bounds);
            let img_rect = egui::Rect::from_center_size(rect.center(), size);
            ui.painter().image(
                texture.id(),
                img_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        } else {
            let text = if self.failed.contains(path) { "Failed to load image" } else { "Loading..." };
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                text,
                egui::FontId::proportional(16.0),
                ui.visuals().weak_text_color(),
            );
        }
    }
}
