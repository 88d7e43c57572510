use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::fileops::write_atomic;

pub const TAG_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Append,
    Prepend,
}

impl TagAction {
    pub fn verb(self) -> &'static str {
        match self {
            TagAction::Append => "append",
            TagAction::Prepend => "prepend",
        }
    }

    pub fn past(self) -> &'static str {
        match self {
            TagAction::Append => "appended",
            TagAction::Prepend => "prepended",
        }
    }
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Failed to load tags from {}: {source}", display_name(.path))]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to save tags to {}: {source}", display_name(.path))]
    Write { path: PathBuf, source: io::Error },
}

fn display_name(path: &Path) -> String {
    path.file_name().unwrap_or(path.as_os_str()).to_string_lossy().to_string()
}

/// Joins `tag` onto `current`. Both sides are trimmed; an empty `current` yields just the tag.
pub fn combine(current: &str, tag: &str, action: TagAction) -> String {
    let current = current.trim();
    let tag = tag.trim();
    if current.is_empty() {
        return tag.to_string();
    }
    match action {
        TagAction::Append => format!("{current}{TAG_SEPARATOR}{tag}"),
        TagAction::Prepend => format!("{tag}{TAG_SEPARATOR}{current}"),
    }
}

/// A sidecar that does not exist yet reads as empty.
pub fn read_tags(sidecar: &Path) -> Result<String, TagError> {
    match fs::read_to_string(sidecar) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(TagError::Read { path: sidecar.to_path_buf(), source }),
    }
}

pub fn write_tags(sidecar: &Path, text: &str) -> Result<(), TagError> {
    write_atomic(sidecar, text.as_bytes())
        .map_err(|source| TagError::Write { path: sidecar.to_path_buf(), source })
}

pub fn modify_file(sidecar: &Path, tag: &str, action: TagAction) -> Result<String, TagError> {
    let current = read_tags(sidecar)?;
    let updated = combine(&current, tag, action);
    write_tags(sidecar, &updated)?;
    Ok(updated)
}

#[derive(Debug, Default)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl BulkReport {
    fn collect(results: Vec<Result<(), TagError>>) -> Self {
        let mut report = BulkReport::default();
        for res in results {
            match res {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    let path = match &e {
                        TagError::Read { path, .. } | TagError::Write { path, .. } => path.clone(),
                    };
                    report.failures.push((path, e.to_string()));
                }
            }
        }
        report
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Popup text listing the first few failures.
    pub fn failure_summary(&self, what: &str) -> String {
        let mut msg = format!("Failed to {} {} files:\n\n", what, self.failures.len());
        let lines: Vec<String> = self.failures.iter().take(5).map(|(_, e)| format!("• {}", e)).collect();
        msg.push_str(&lines.join("\n"));
        if self.failures.len() > 5 {
            msg.push_str("\n...and others.");
        }
        if self.succeeded > 0 {
            msg.push_str(&format!("\n\n({} files updated successfully)", self.succeeded));
        }
        msg
    }
}

/// Groups repeated paths, keeping first-seen order. Images that share a stem share one sidecar,
/// so each group must be handled by a single worker.
fn group_by_path(sidecars: &[PathBuf]) -> Vec<(&PathBuf, usize)> {
    let mut index: HashMap<&PathBuf, usize> = HashMap::new();
    let mut groups: Vec<(&PathBuf, usize)> = Vec::new();
    for path in sidecars {
        match index.get(path) {
            Some(&i) => groups[i].1 += 1,
            None => {
                index.insert(path, groups.len());
                groups.push((path, 1));
            }
        }
    }
    groups
}

/// Overwrites every sidecar with `text`. One result is counted per listed entry.
pub fn apply_to_all(sidecars: &[PathBuf], text: &str) -> BulkReport {
    let results: Vec<_> = group_by_path(sidecars)
        .par_iter()
        .flat_map_iter(|&(p, count)| (0..count).map(move |_| write_tags(p, text)))
        .collect();
    let report = BulkReport::collect(results);
    log::info!("Applied tags to {} files ({} failed)", report.succeeded, report.failures.len());
    report
}

/// Adds `tag` once per listed entry; a sidecar listed N times gets N updates, applied in order.
pub fn modify_all(sidecars: &[PathBuf], tag: &str, action: TagAction) -> BulkReport {
    let results: Vec<_> = group_by_path(sidecars)
        .par_iter()
        .flat_map_iter(|&(p, count)| (0..count).map(move |_| modify_file(p, tag, action).map(|_| ())))
        .collect();
    let report = BulkReport::collect(results);
    log::info!("Tag {:?} {} to {} files ({} failed)", tag, action.past(), report.succeeded, report.failures.len());
    report
}
