use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

pub const SUPPORTED_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];
pub const SIDECAR_EXT: &str = "txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Plain file name order, same as sorting the paths.
    #[default]
    Name,
    /// Case-insensitive natural order (`img2` before `img10`).
    Natural,
}

impl SortOrder {
    pub const VALID: &'static [&'static str] = &["name", "natural"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "name" => Some(SortOrder::Name),
            "natural" => Some(SortOrder::Natural),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub image: PathBuf,
    pub sidecar: PathBuf,
}

impl ImageEntry {
    pub fn new(image: PathBuf) -> Self {
        let sidecar = sidecar_path(&image);
        Self { image, sidecar }
    }

    pub fn file_name(&self) -> String {
        self.image.file_name().unwrap_or_default().to_string_lossy().to_string()
    }
}

pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_extension(SIDECAR_EXT)
}

pub fn is_image_ext(path: &Path, exts: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            exts.iter().any(|x| x.eq_ignore_ascii_case(&e))
        })
        .unwrap_or(false)
}

pub fn default_extensions() -> Vec<String> {
    SUPPORTED_EXTS.iter().map(|s| s.to_string()).collect()
}

pub fn sort_entries(entries: &mut [ImageEntry], sort: SortOrder) {
    match sort {
        SortOrder::Name => entries.sort_by(|a, b| a.image.file_name().cmp(&b.image.file_name())),
        SortOrder::Natural => entries.sort_by(|a, b| {
            let name_a = a.image.file_name().map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_default();
            let name_b = b.image.file_name().map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_default();
            natord::compare(&name_a, &name_b)
        }),
    }
}

/// Lists the images directly inside `dir` (no recursion), each paired with its sidecar path.
pub fn scan_folder(dir: &Path, exts: &[String], sort: SortOrder) -> anyhow::Result<Vec<ImageEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    let read_dir = fs::read_dir(dir).with_context(|| format!("Failed to read folder {:?}", dir))?;
    for entry in read_dir.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || !is_image_ext(&path, exts) {
            continue;
        }
        if seen.insert(path.clone()) {
            entries.push(ImageEntry::new(path));
        }
    }

    sort_entries(&mut entries, sort);
    log::debug!("[scan] {:?}: {} images", dir, entries.len());
    Ok(entries)
}

pub fn missing_sidecars(entries: &[ImageEntry]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| !e.sidecar.exists())
        .filter(|e| seen.insert(e.sidecar.clone()))
        .map(|e| e.sidecar.clone())
        .collect()
}

/// Creates each sidecar as an empty file. Keeps going after a failure.
pub fn create_sidecars(paths: &[PathBuf]) -> Vec<(PathBuf, io::Error)> {
    let mut failures = Vec::new();
    for path in paths {
        let res = fs::OpenOptions::new().write(true).create_new(true).open(path);
        match res {
            Ok(_) => log::debug!("[scan] created {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                log::warn!("[scan] failed to create {:?}: {}", path, e);
                failures.push((path.clone(), e));
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"x").unwrap();
        p
    }

    #[test]
    fn test_sidecar_path_replaces_extension() {
        assert_eq!(sidecar_path(Path::new("/a/photo.jpeg")), PathBuf::from("/a/photo.txt"));
        assert_eq!(sidecar_path(Path::new("/a/my.photo.PNG")), PathBuf::from("/a/my.photo.txt"));
    }

    #[test]
    fn test_scan_filters_extensions_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.PNG");
        touch(dir.path(), "a.jpg");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "c.tiff");
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let entries = scan_folder(dir.path(), &default_extensions(), SortOrder::Name).unwrap();
        let names: Vec<String> = entries.iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);
        assert_eq!(entries[1].sidecar, dir.path().join("b.txt"));
    }

    #[test]
    fn test_natural_sort() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["img10.png", "img2.png", "Img1.png"] {
            touch(dir.path(), name);
        }

        let by_name = scan_folder(dir.path(), &default_extensions(), SortOrder::Name).unwrap();
        let names: Vec<String> = by_name.iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["Img1.png", "img10.png", "img2.png"]);

        let natural = scan_folder(dir.path(), &default_extensions(), SortOrder::Natural).unwrap();
        let names: Vec<String> = natural.iter().map(|e| e.file_name()).collect();
        assert_eq!(names, vec!["Img1.png", "img2.png", "img10.png"]);
    }

    #[test]
    fn test_missing_and_create_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "b.png");
        fs::write(dir.path().join("a.txt"), "cat").unwrap();

        let entries = scan_folder(dir.path(), &default_extensions(), SortOrder::Name).unwrap();
        let missing = missing_sidecars(&entries);
        assert_eq!(missing, vec![dir.path().join("b.txt")]);

        let failures = create_sidecars(&missing);
        assert!(failures.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "");
        // Existing content is untouched
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "cat");
        assert!(missing_sidecars(&entries).is_empty());
    }

    #[test]
    fn test_same_stem_images_listed_separately() {
        let dir = tempfile::tempdir().unwrap();
        for ext in SUPPORTED_EXTS {
            touch(dir.path(), &format!("a.{}", ext));
        }

        let entries = scan_folder(dir.path(), &default_extensions(), SortOrder::Name).unwrap();
        assert_eq!(entries.len(), SUPPORTED_EXTS.len());
        assert!(entries.iter().all(|e| e.sidecar == dir.path().join("a.txt")));
        // One shared sidecar to create, not six
        assert_eq!(missing_sidecars(&entries), vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn test_scan_missing_folder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = scan_folder(&dir.path().join("nope"), &default_extensions(), SortOrder::Name);
        assert!(res.is_err());
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("NAME"), Some(SortOrder::Name));
        assert_eq!(SortOrder::parse("natural"), Some(SortOrder::Natural));
        assert_eq!(SortOrder::parse("size"), None);
    }
}
