use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temp file next to the target so the final rename stays on one filesystem.
/// Unique per call, so concurrent writers never share one.
fn temp_path_for(target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(".{}.tagedit-{}-{}.tmp", name, std::process::id(), seq);
    match target.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Replace `target` with `contents` atomically: write + fsync a temp file, then rename over.
/// Readers see either the old or the new content, never a truncated file.
pub fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path_for(target);
    let res = (|| {
        let mut file = fs::OpenOptions::new().write(true).create(true).truncate(true).open(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        // Keep the permissions of the file being replaced (best effort)
        if let Ok(meta) = fs::metadata(target)
            && let Err(e) = fs::set_permissions(&tmp, meta.permissions())
        {
            log::warn!("Failed to copy permissions to {:?}: {}", tmp, e);
        }

        fs::rename(&tmp, target)
    })();

    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}
