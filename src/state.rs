use std::path::{Path, PathBuf};

use crate::scanner::{self, ImageEntry, SortOrder};
use crate::tags::{self, TagAction};

#[derive(Debug, Clone, PartialEq)]
pub enum InputIntent {
    OpenFolder(PathBuf),
    Select(usize),
    NextItem,
    PrevItem,
    Save,
    SaveAndNext,
    ApplyToAll,
    QuickTag(TagAction),
    QuickTagAll(TagAction),
    Reload,
    Quit,
    // Modal answers
    Yes,
    No,
    Cancel,
}

/// An action parked behind the unsaved-changes prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    OpenFolder(PathBuf),
    Select(usize),
    QuickTagAll(TagAction, String),
    Reload,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    CreateMissing(Vec<PathBuf>),
    Unsaved(PendingAction),
    ConfirmApplyAll,
    ConfirmModifyAll(TagAction, String),
}

impl Modal {
    pub fn title(&self) -> String {
        match self {
            Modal::CreateMissing(_) => "Missing Text Files".to_string(),
            Modal::Unsaved(_) => "Unsaved Changes".to_string(),
            Modal::ConfirmApplyAll => "Confirm Apply to All".to_string(),
            Modal::ConfirmModifyAll(action, _) => {
                let verb = action.verb();
                format!("Confirm {}{} to All", verb[..1].to_uppercase(), &verb[1..])
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Modal::CreateMissing(paths) => format!("Found {} missing text files. Create them?", paths.len()),
            Modal::Unsaved(_) => "Save changes before continuing?".to_string(),
            Modal::ConfirmApplyAll => {
                "This will overwrite all txt files with the current content. Continue?".to_string()
            }
            Modal::ConfirmModifyAll(action, _) => {
                format!("This will {} the tag to all txt files. Continue?", action.verb())
            }
        }
    }

    /// Only the unsaved-changes prompt offers a third answer.
    pub fn has_cancel(&self) -> bool {
        matches!(self, Modal::Unsaved(_))
    }
}

fn unreadable_message(entry: &ImageEntry) -> String {
    let name = entry.sidecar.file_name().unwrap_or_default().to_string_lossy();
    format!("Not saving {}: its tags could not be loaded.", name)
}

pub const NO_IMAGES_MESSAGE: &str = "No supported image files found in the selected folder.";

pub struct AppState {
    pub folder: Option<PathBuf>,
    pub entries: Vec<ImageEntry>,
    pub current_idx: Option<usize>,
    /// Editor contents for the current image.
    pub buffer: String,
    /// Sidecar contents as last loaded or saved.
    pub baseline: String,
    /// The current sidecar exists but could not be read; saving over it is refused.
    pub current_unreadable: bool,
    pub quick_tag: String,
    pub modal: Option<Modal>,
    pub status_message: Option<String>,
    pub status_serial: u64,
    pub error_popup: Option<String>,
    pub notice_popup: Option<String>,
    pub selection_changed: bool,
    pub focus_editor: bool,
    pub exit_requested: bool,
    /// Bumped on every successful folder scan.
    pub folder_serial: u64,

    pub extensions: Vec<String>,
    pub sort: SortOrder,
    pub auto_create_missing: bool,
}

impl AppState {
    pub fn new(extensions: Vec<String>, sort: SortOrder) -> Self {
        Self {
            folder: None,
            entries: Vec::new(),
            current_idx: None,
            buffer: String::new(),
            baseline: String::new(),
            current_unreadable: false,
            quick_tag: String::new(),
            modal: None,
            status_message: None,
            status_serial: 0,
            error_popup: None,
            notice_popup: None,
            selection_changed: false,
            focus_editor: false,
            exit_requested: false,
            folder_serial: 0,
            extensions,
            sort,
            auto_create_missing: false,
        }
    }

    pub fn handle_input(&mut self, intent: InputIntent) {
        self.selection_changed = false;

        if self.error_popup.is_some() || self.notice_popup.is_some() {
            self.error_popup = None;
            self.notice_popup = None;
            return;
        }

        if let Some(modal) = self.modal.take() {
            self.answer_modal(modal, intent);
            return;
        }

        match intent {
            InputIntent::OpenFolder(path) => self.guarded(PendingAction::OpenFolder(path)),
            InputIntent::Select(idx) => {
                if idx < self.entries.len() && Some(idx) != self.current_idx {
                    self.guarded(PendingAction::Select(idx));
                }
            }
            InputIntent::NextItem => {
                if let Some(idx) = self.current_idx
                    && idx + 1 < self.entries.len()
                {
                    self.guarded(PendingAction::Select(idx + 1));
                }
            }
            InputIntent::PrevItem => {
                if let Some(idx) = self.current_idx
                    && idx > 0
                {
                    self.guarded(PendingAction::Select(idx - 1));
                }
            }
            InputIntent::Save => {
                self.save_current();
            }
            InputIntent::SaveAndNext => {
                if self.save_current() {
                    if let Some(idx) = self.current_idx
                        && idx + 1 < self.entries.len()
                    {
                        self.select(idx + 1);
                    }
                    self.focus_editor = true;
                }
            }
            InputIntent::ApplyToAll => {
                if !self.entries.is_empty() {
                    self.modal = Some(Modal::ConfirmApplyAll);
                }
            }
            InputIntent::QuickTag(action) => self.quick_tag_current(action),
            InputIntent::QuickTagAll(action) => {
                let tag = self.quick_tag.trim().to_string();
                if !tag.is_empty() && !self.entries.is_empty() {
                    self.guarded(PendingAction::QuickTagAll(action, tag));
                }
            }
            InputIntent::Reload => {
                if self.folder.is_some() {
                    self.guarded(PendingAction::Reload);
                }
            }
            InputIntent::Quit => self.guarded(PendingAction::Quit),
            InputIntent::Cancel => self.status_message = None,
            InputIntent::Yes | InputIntent::No => {}
        }
    }

    fn answer_modal(&mut self, modal: Modal, answer: InputIntent) {
        match (modal, answer) {
            (Modal::CreateMissing(paths), InputIntent::Yes) => {
                let failures = scanner::create_sidecars(&paths);
                if !failures.is_empty() {
                    let mut msg = format!("Failed to create {} text files:\n\n", failures.len());
                    let lines: Vec<String> = failures
                        .iter()
                        .take(5)
                        .map(|(p, e)| format!("• {}: {}", p.file_name().unwrap_or_default().to_string_lossy(), e))
                        .collect();
                    msg.push_str(&lines.join("\n"));
                    if failures.len() > 5 {
                        msg.push_str("\n...and others.");
                    }
                    self.error_popup = Some(msg);
                } else {
                    self.set_status(format!("Created {} text files", paths.len()));
                }
                self.finish_open(None);
            }
            (Modal::CreateMissing(_), InputIntent::No | InputIntent::Cancel) => self.finish_open(None),

            (Modal::Unsaved(pending), InputIntent::Yes) => {
                if self.save_current() {
                    self.run_pending(pending);
                }
            }
            (Modal::Unsaved(pending), InputIntent::No) => {
                self.buffer = self.baseline.clone();
                self.run_pending(pending);
            }
            (Modal::Unsaved(_), InputIntent::Cancel) => {}

            (Modal::ConfirmApplyAll, InputIntent::Yes) => self.perform_apply_all(),
            (Modal::ConfirmModifyAll(action, tag), InputIntent::Yes) => self.perform_modify_all(action, &tag),
            (Modal::ConfirmApplyAll | Modal::ConfirmModifyAll(..), InputIntent::No | InputIntent::Cancel) => {}

            // Anything else leaves the prompt open
            (modal, _) => self.modal = Some(modal),
        }
    }

    fn guarded(&mut self, action: PendingAction) {
        if self.is_dirty() {
            self.modal = Some(Modal::Unsaved(action));
        } else {
            self.run_pending(action);
        }
    }

    fn run_pending(&mut self, action: PendingAction) {
        match action {
            PendingAction::OpenFolder(path) => self.load_folder(path, None),
            PendingAction::Select(idx) => self.select(idx),
            PendingAction::QuickTagAll(action, tag) => self.modal = Some(Modal::ConfirmModifyAll(action, tag)),
            PendingAction::Reload => {
                if let Some(folder) = self.folder.clone() {
                    let keep = self.current_entry().map(|e| e.image.clone());
                    self.load_folder(folder, keep);
                }
            }
            PendingAction::Quit => self.exit_requested = true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.current_idx.is_some() && self.buffer != self.baseline
    }

    pub fn has_images(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn current_entry(&self) -> Option<&ImageEntry> {
        self.current_idx.and_then(|i| self.entries.get(i))
    }

    pub fn current_image_path(&self) -> Option<&Path> {
        self.current_entry().map(|e| e.image.as_path())
    }

    pub fn sidecars(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.sidecar.clone()).collect()
    }

    fn set_status(&mut self, msg: String) {
        self.status_message = Some(msg);
        self.status_serial += 1;
    }

    fn load_folder(&mut self, folder: PathBuf, keep: Option<PathBuf>) {
        let entries = match scanner::scan_folder(&folder, &self.extensions, self.sort) {
            Ok(e) => e,
            Err(e) => {
                self.error_popup = Some(format!("{:#}", e));
                return;
            }
        };
        log::info!("Opened {:?} ({} images)", folder, entries.len());

        self.folder = Some(folder);
        self.entries = entries;
        self.current_idx = None;
        self.buffer.clear();
        self.baseline.clear();
        self.current_unreadable = false;
        self.selection_changed = true;
        self.folder_serial += 1;

        let missing = scanner::missing_sidecars(&self.entries);
        if missing.is_empty() {
            self.finish_open(keep);
        } else if self.auto_create_missing {
            self.modal = Some(Modal::CreateMissing(missing));
            self.answer_modal_yes();
        } else {
            self.modal = Some(Modal::CreateMissing(missing));
        }
    }

    fn answer_modal_yes(&mut self) {
        if let Some(modal) = self.modal.take() {
            self.answer_modal(modal, InputIntent::Yes);
        }
    }

    fn finish_open(&mut self, keep: Option<PathBuf>) {
        if self.entries.is_empty() {
            self.notice_popup = Some(NO_IMAGES_MESSAGE.to_string());
            return;
        }
        let idx = keep
            .and_then(|k| self.entries.iter().position(|e| e.image == k))
            .unwrap_or(0);
        self.select(idx);
    }

    fn select(&mut self, idx: usize) {
        if idx >= self.entries.len() {
            return;
        }
        self.current_idx = Some(idx);
        self.load_current_tags();
        self.selection_changed = true;
        self.focus_editor = true;
    }

    fn load_current_tags(&mut self) {
        let Some(entry) = self.current_entry() else { return };
        match tags::read_tags(&entry.sidecar) {
            Ok(text) => {
                self.baseline = text.clone();
                self.buffer = text;
                self.current_unreadable = false;
            }
            Err(e) => {
                log::warn!("{}", e);
                self.buffer.clear();
                self.baseline.clear();
                self.current_unreadable = true;
                self.error_popup = Some(format!("{}\n\nThe file is left unchanged and cannot be saved from here.", e));
            }
        }
    }

    /// Writes the editor buffer to the current sidecar. Returns false if nothing was saved.
    fn save_current(&mut self) -> bool {
        let Some(entry) = self.current_entry() else { return false };
        if self.current_unreadable {
            self.error_popup = Some(unreadable_message(entry));
            return false;
        }
        match tags::write_tags(&entry.sidecar, &self.buffer) {
            Ok(()) => {
                self.baseline = self.buffer.clone();
                self.set_status("Tags saved".to_string());
                true
            }
            Err(e) => {
                log::warn!("{}", e);
                self.error_popup = Some(e.to_string());
                false
            }
        }
    }

    fn quick_tag_current(&mut self, action: TagAction) {
        if self.current_idx.is_none() {
            return;
        }
        let tag = self.quick_tag.trim().to_string();
        if tag.is_empty() {
            return;
        }
        // Leave the buffer alone so the unreadable file is not mistaken for an empty one
        if self.current_unreadable {
            if let Some(entry) = self.current_entry() {
                self.error_popup = Some(unreadable_message(entry));
            }
            return;
        }
        self.buffer = tags::combine(&self.buffer, &tag, action);
        if self.save_current() {
            self.set_status(format!("Tag {}", action.past()));
        }
    }

    fn perform_apply_all(&mut self) {
        let sidecars = self.sidecars();
        let report = tags::apply_to_all(&sidecars, &self.buffer);

        let current_failed = self
            .current_entry()
            .map(|e| report.failures.iter().any(|(p, _)| p == &e.sidecar))
            .unwrap_or(true);
        if !current_failed {
            self.baseline = self.buffer.clone();
            self.current_unreadable = false;
        }

        if report.is_ok() {
            self.set_status("Applied tags to all files".to_string());
        } else {
            self.error_popup = Some(report.failure_summary("update"));
        }
    }

    fn perform_modify_all(&mut self, action: TagAction, tag: &str) {
        let sidecars = self.sidecars();
        let report = tags::modify_all(&sidecars, tag, action);

        // Pick up the new content for the file on screen
        self.load_current_tags();

        if report.is_ok() {
            self.set_status(format!("Tags {} to all files", action.past()));
        } else {
            self.error_popup = Some(report.failure_summary("update"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::default_extensions;
    use std::fs;

    fn folder_with(images: &[(&str, Option<&str>)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, tags) in images {
            fs::write(dir.path().join(name), b"not really an image").unwrap();
            if let Some(t) = tags {
                let stem = Path::new(name).file_stem().unwrap().to_string_lossy().to_string();
                fs::write(dir.path().join(format!("{}.txt", stem)), t).unwrap();
            }
        }
        dir
    }

    fn opened(dir: &tempfile::TempDir) -> AppState {
        let mut state = AppState::new(default_extensions(), SortOrder::Name);
        state.handle_input(InputIntent::OpenFolder(dir.path().to_path_buf()));
        state
    }

    fn read(dir: &tempfile::TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_open_selects_first_and_loads_tags() {
        let dir = folder_with(&[("b.png", Some("two")), ("a.jpg", Some("one"))]);
        let state = opened(&dir);

        assert!(state.modal.is_none());
        assert_eq!(state.current_idx, Some(0));
        assert_eq!(state.current_entry().unwrap().file_name(), "a.jpg");
        assert_eq!(state.buffer, "one");
        assert!(!state.is_dirty());
        assert!(state.focus_editor);
    }

    #[test]
    fn test_missing_sidecars_prompt_yes_creates() {
        let dir = folder_with(&[("a.png", Some("one")), ("b.png", None), ("c.png", None)]);
        let mut state = opened(&dir);

        assert_eq!(state.modal.as_ref().unwrap().message(), "Found 2 missing text files. Create them?");
        assert_eq!(state.current_idx, None);

        // Other intents are ignored while prompting
        state.handle_input(InputIntent::NextItem);
        assert!(matches!(state.modal, Some(Modal::CreateMissing(_))));

        state.handle_input(InputIntent::Yes);
        assert!(state.modal.is_none());
        assert_eq!(read(&dir, "b.txt"), "");
        assert_eq!(read(&dir, "c.txt"), "");
        assert_eq!(state.current_idx, Some(0));
    }

    #[test]
    fn test_missing_sidecars_prompt_no_leaves_them() {
        let dir = folder_with(&[("a.png", None)]);
        let mut state = opened(&dir);
        state.handle_input(InputIntent::No);

        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(state.current_idx, Some(0));
        assert_eq!(state.buffer, "");

        // Saving creates it
        state.buffer = "new".to_string();
        state.handle_input(InputIntent::Save);
        assert_eq!(read(&dir, "a.txt"), "new");
    }

    #[test]
    fn test_auto_create_missing_skips_prompt() {
        let dir = folder_with(&[("a.png", None)]);
        let mut state = AppState::new(default_extensions(), SortOrder::Name);
        state.auto_create_missing = true;
        state.handle_input(InputIntent::OpenFolder(dir.path().to_path_buf()));

        assert!(state.modal.is_none());
        assert!(dir.path().join("a.txt").exists());
        assert_eq!(state.current_idx, Some(0));
    }

    #[test]
    fn test_empty_folder_shows_notice() {
        let dir = folder_with(&[]);
        let mut state = opened(&dir);
        assert_eq!(state.notice_popup.as_deref(), Some(NO_IMAGES_MESSAGE));
        assert!(!state.has_images());

        // Any input dismisses it
        state.handle_input(InputIntent::NextItem);
        assert!(state.notice_popup.is_none());
    }

    #[test]
    fn test_navigation_bounds() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);

        state.handle_input(InputIntent::PrevItem);
        assert_eq!(state.current_idx, Some(0));
        assert!(!state.selection_changed);

        state.handle_input(InputIntent::NextItem);
        assert_eq!(state.current_idx, Some(1));
        assert_eq!(state.buffer, "2");
        assert!(state.selection_changed);

        state.handle_input(InputIntent::NextItem);
        assert_eq!(state.current_idx, Some(1));

        state.handle_input(InputIntent::Select(0));
        assert_eq!(state.buffer, "1");
        state.handle_input(InputIntent::Select(7));
        assert_eq!(state.current_idx, Some(0));
    }

    #[test]
    fn test_unsaved_changes_yes_saves_then_moves() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);

        state.buffer.push_str(", edited");
        assert!(state.is_dirty());
        state.handle_input(InputIntent::NextItem);
        assert_eq!(state.modal, Some(Modal::Unsaved(PendingAction::Select(1))));
        assert_eq!(state.current_idx, Some(0));

        state.handle_input(InputIntent::Yes);
        assert_eq!(read(&dir, "a.txt"), "1, edited");
        assert_eq!(state.current_idx, Some(1));
        assert_eq!(state.buffer, "2");
    }

    #[test]
    fn test_unsaved_changes_no_discards() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);

        state.buffer = "scratch".to_string();
        state.handle_input(InputIntent::Select(1));
        state.handle_input(InputIntent::No);
        assert_eq!(read(&dir, "a.txt"), "1");
        assert_eq!(state.current_idx, Some(1));
    }

    #[test]
    fn test_unsaved_changes_cancel_stays() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);

        state.buffer = "scratch".to_string();
        state.handle_input(InputIntent::Quit);
        state.handle_input(InputIntent::Cancel);
        assert!(!state.exit_requested);
        assert_eq!(state.buffer, "scratch");
        assert_eq!(state.current_idx, Some(0));
        assert!(state.modal.is_none());
    }

    #[test]
    fn test_reverting_edit_is_clean() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);
        state.buffer = "x".to_string();
        state.buffer = "1".to_string();
        state.handle_input(InputIntent::NextItem);
        assert!(state.modal.is_none());
        assert_eq!(state.current_idx, Some(1));
    }

    #[test]
    fn test_save_and_next() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);

        state.buffer = "cat".to_string();
        state.handle_input(InputIntent::SaveAndNext);
        assert_eq!(read(&dir, "a.txt"), "cat");
        assert_eq!(state.current_idx, Some(1));

        // On the last row it saves and stays
        state.buffer = "dog".to_string();
        state.handle_input(InputIntent::SaveAndNext);
        assert_eq!(read(&dir, "b.txt"), "dog");
        assert_eq!(state.current_idx, Some(1));
        assert_eq!(state.status_message, Some("Tags saved".to_string()));
    }

    #[test]
    fn test_apply_to_all_requires_confirmation() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2")), ("c.png", Some("3"))]);
        let mut state = opened(&dir);
        state.buffer = "shared".to_string();

        state.handle_input(InputIntent::ApplyToAll);
        assert_eq!(state.modal, Some(Modal::ConfirmApplyAll));
        state.handle_input(InputIntent::No);
        assert_eq!(read(&dir, "b.txt"), "2");

        state.handle_input(InputIntent::ApplyToAll);
        state.handle_input(InputIntent::Yes);
        for name in ["a.txt", "b.txt", "c.txt"] {
            assert_eq!(read(&dir, name), "shared");
        }
        assert!(!state.is_dirty());
        assert_eq!(state.status_message, Some("Applied tags to all files".to_string()));
    }

    #[test]
    fn test_quick_tag_current_saves_immediately() {
        let dir = folder_with(&[("a.png", Some(" cat \n"))]);
        let mut state = opened(&dir);

        state.quick_tag = "   ".to_string();
        state.handle_input(InputIntent::QuickTag(TagAction::Append));
        assert_eq!(read(&dir, "a.txt"), " cat \n");

        state.quick_tag = " dog ".to_string();
        state.handle_input(InputIntent::QuickTag(TagAction::Append));
        assert_eq!(read(&dir, "a.txt"), "cat, dog");
        assert_eq!(state.buffer, "cat, dog");

        state.quick_tag = "bird".to_string();
        state.handle_input(InputIntent::QuickTag(TagAction::Prepend));
        assert_eq!(read(&dir, "a.txt"), "bird, cat, dog");
        assert_eq!(state.status_message, Some("Tag prepended".to_string()));
    }

    #[test]
    fn test_quick_tag_all_confirms_and_reloads() {
        let dir = folder_with(&[("a.png", Some("cat")), ("b.png", Some(""))]);
        let mut state = opened(&dir);
        state.quick_tag = "pet".to_string();

        state.handle_input(InputIntent::QuickTagAll(TagAction::Append));
        assert_eq!(
            state.modal.as_ref().unwrap().message(),
            "This will append the tag to all txt files. Continue?"
        );
        assert_eq!(state.modal.as_ref().unwrap().title(), "Confirm Append to All");
        state.handle_input(InputIntent::Yes);

        assert_eq!(read(&dir, "a.txt"), "cat, pet");
        assert_eq!(read(&dir, "b.txt"), "pet");
        assert_eq!(state.buffer, "cat, pet");
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_quick_tag_all_with_unsaved_edits_asks_first() {
        let dir = folder_with(&[("a.png", Some("cat")), ("b.png", Some("dog"))]);
        let mut state = opened(&dir);
        state.buffer = "cat, edited".to_string();
        state.quick_tag = "pet".to_string();

        state.handle_input(InputIntent::QuickTagAll(TagAction::Prepend));
        assert!(matches!(state.modal, Some(Modal::Unsaved(PendingAction::QuickTagAll(..)))));
        state.handle_input(InputIntent::Yes);
        assert!(matches!(state.modal, Some(Modal::ConfirmModifyAll(TagAction::Prepend, _))));
        state.handle_input(InputIntent::Yes);

        assert_eq!(read(&dir, "a.txt"), "pet, cat, edited");
        assert_eq!(read(&dir, "b.txt"), "pet, dog");
    }

    #[test]
    fn test_reload_keeps_selection_and_sees_new_files() {
        let dir = folder_with(&[("b.png", Some("b")), ("c.png", Some("c"))]);
        let mut state = opened(&dir);
        state.handle_input(InputIntent::NextItem);
        assert_eq!(state.current_entry().unwrap().file_name(), "c.png");

        fs::write(dir.path().join("a.png"), b"x").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        state.handle_input(InputIntent::Reload);

        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.current_entry().unwrap().file_name(), "c.png");
        assert_eq!(state.current_idx, Some(2));
    }

    #[test]
    fn test_save_failure_shows_popup_and_blocks_pending() {
        let dir = folder_with(&[("a.png", Some("1")), ("b.png", Some("2"))]);
        let mut state = opened(&dir);

        // Replace the sidecar with a directory so the rename fails
        fs::remove_file(dir.path().join("a.txt")).unwrap();
        fs::create_dir(dir.path().join("a.txt")).unwrap();
        fs::write(dir.path().join("a.txt").join("keep"), "x").unwrap();

        state.buffer = "edited".to_string();
        state.handle_input(InputIntent::NextItem);
        state.handle_input(InputIntent::Yes);
        assert!(state.error_popup.is_some());
        assert_eq!(state.current_idx, Some(0));
        assert!(state.is_dirty());
    }

    #[test]
    fn test_quit_clean_exits() {
        let mut state = AppState::new(default_extensions(), SortOrder::Name);
        state.handle_input(InputIntent::Quit);
        assert!(state.exit_requested);
    }

    #[test]
    fn test_unreadable_sidecar_is_never_overwritten() {
        let dir = folder_with(&[("a.png", None), ("b.png", Some("2"))]);
        fs::write(dir.path().join("a.txt"), b"caf\xe9, b\xfcro").unwrap();
        let mut state = opened(&dir);

        assert!(state.current_unreadable);
        assert!(state.error_popup.as_deref().unwrap().starts_with("Failed to load tags from a.txt"));
        state.handle_input(InputIntent::Cancel);

        state.handle_input(InputIntent::Save);
        assert_eq!(state.error_popup.as_deref(), Some("Not saving a.txt: its tags could not be loaded."));
        state.handle_input(InputIntent::Cancel);

        state.buffer = "typed".to_string();
        state.handle_input(InputIntent::SaveAndNext);
        assert!(state.error_popup.is_some());
        assert_eq!(state.current_idx, Some(0));
        state.handle_input(InputIntent::Cancel);

        state.quick_tag = "tag".to_string();
        state.handle_input(InputIntent::QuickTag(TagAction::Append));
        assert!(state.error_popup.is_some());
        assert_eq!(state.buffer, "typed");
        state.handle_input(InputIntent::Cancel);

        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"caf\xe9, b\xfcro");

        // Discarding moves on and the next file is editable again
        state.handle_input(InputIntent::NextItem);
        state.handle_input(InputIntent::No);
        assert_eq!(state.current_idx, Some(1));
        assert!(!state.current_unreadable);
        assert_eq!(state.buffer, "2");
    }

    #[test]
    fn test_unsaved_changes_guard_open_folder() {
        let dir = folder_with(&[("a.png", Some("1"))]);
        let other = folder_with(&[("z.png", Some("z"))]);
        let mut state = opened(&dir);

        state.buffer = "edited".to_string();
        state.handle_input(InputIntent::OpenFolder(other.path().to_path_buf()));
        assert_eq!(state.modal, Some(Modal::Unsaved(PendingAction::OpenFolder(other.path().to_path_buf()))));
        assert_eq!(state.folder.as_deref(), Some(dir.path()));

        state.handle_input(InputIntent::Cancel);
        assert_eq!(state.folder.as_deref(), Some(dir.path()));
        assert_eq!(state.buffer, "edited");

        state.handle_input(InputIntent::OpenFolder(other.path().to_path_buf()));
        state.handle_input(InputIntent::Yes);
        assert_eq!(read(&dir, "a.txt"), "edited");
        assert_eq!(state.folder.as_deref(), Some(other.path()));
        assert_eq!(state.buffer, "z");
    }

    #[test]
    fn test_unsaved_changes_guard_reload() {
        let dir = folder_with(&[("a.png", Some("1"))]);
        let mut state = opened(&dir);
        let serial = state.folder_serial;

        state.buffer = "edited".to_string();
        state.handle_input(InputIntent::Reload);
        assert_eq!(state.modal, Some(Modal::Unsaved(PendingAction::Reload)));
        assert_eq!(state.folder_serial, serial);

        state.handle_input(InputIntent::No);
        assert_eq!(state.folder_serial, serial + 1);
        assert_eq!(state.buffer, "1");
        assert_eq!(read(&dir, "a.txt"), "1");
    }

    #[test]
    fn test_create_missing_failures_are_summarized() {
        let dir = folder_with(&[]);
        let gone = dir.path().join("gone");
        let paths: Vec<PathBuf> = (0..7).map(|i| gone.join(format!("f{}.txt", i))).collect();

        let mut state = AppState::new(default_extensions(), SortOrder::Name);
        state.modal = Some(Modal::CreateMissing(paths));
        state.handle_input(InputIntent::Yes);

        let popup = state.error_popup.clone().unwrap();
        assert!(popup.starts_with("Failed to create 7 text files:"));
        assert_eq!(popup.matches('•').count(), 5);
        assert!(popup.ends_with("...and others."));
        assert!(state.status_message.is_none());
    }

    #[test]
    fn test_quick_tag_all_same_stem_images() {
        let dir = folder_with(&[("a.png", Some("cat"))]);
        for ext in ["jpg", "jpeg", "gif", "bmp", "webp"] {
            fs::write(dir.path().join(format!("a.{}", ext)), b"x").unwrap();
        }
        let mut state = opened(&dir);
        assert_eq!(state.entries.len(), 6);

        state.quick_tag = "x".to_string();
        state.handle_input(InputIntent::QuickTagAll(TagAction::Append));
        state.handle_input(InputIntent::Yes);

        assert_eq!(read(&dir, "a.txt"), "cat, x, x, x, x, x, x");
        assert!(state.error_popup.is_none());
        assert_eq!(state.buffer, "cat, x, x, x, x, x, x");
        assert!(!state.is_dirty());
    }
}
