//! Confinement of caller-supplied relative paths to a staging root
//!
//! Every archive member name and uploaded filename goes through [`confine`]
//! before anything is written. Absolute names, drive prefixes and `..`
//! segments are rejected outright; the surviving path is then resolved against
//! the canonical root so that symlinked directories cannot lead outside it.

use std::path::{Component, Path, PathBuf};

use crate::error::{DicomeshError, Result};

/// Resolve `entry` beneath `root`, or fail with `PathEscape`.
///
/// `root` must exist. The returned path is absolute and is the root itself or
/// a descendant of it; it does not need to exist yet.
pub fn confine(root: &Path, entry: &str) -> Result<PathBuf> {
    let escape = || DicomeshError::PathEscape {
        entry: entry.to_string(),
    };

    if is_absolute_like(entry) {
        return Err(escape());
    }

    let mut segments = Vec::new();
    for segment in entry.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(escape()),
            other => segments.push(other),
        }
    }

    let canonical_root = root.canonicalize()?;
    let candidate = segments
        .iter()
        .fold(canonical_root.clone(), |path, segment| path.join(segment));

    let resolved = resolve_existing_prefix(&candidate)?;
    if resolved == canonical_root || resolved.starts_with(&canonical_root) {
        Ok(resolved)
    } else {
        Err(escape())
    }
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the rest
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut pending = Vec::new();

    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                pending.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in pending.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn is_absolute_like(entry: &str) -> bool {
    if entry.starts_with('/') || entry.starts_with('\\') {
        return true;
    }

    // Windows drive prefixes such as `C:` or `c:\`
    let bytes = entry.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }

    Path::new(entry)
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
}

/// Reduce an uploaded filename to ASCII-safe characters.
///
/// Keeps alphanumerics, `.`, `-` and `_`, trims leading and trailing dots and
/// underscores, and falls back to `slice-NNNN.dcm` when nothing survives.
pub fn sanitize_filename(name: &str, index: usize) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        format!("slice-{:04}.dcm", index)
    } else {
        trimmed.to_string()
    }
}

/// `path` anchored at the current directory when relative.
///
/// The external tool runs inside the job directory, so every path handed to
/// it must not depend on the caller's working directory.
pub fn absolutize(path: PathBuf) -> PathBuf {
    match std::path::absolute(&path) {
        Ok(absolute) => absolute,
        Err(e) => {
            tracing::warn!("Could not make {} absolute: {}", path.display(), e);
            path
        }
    }
}

/// Directory of `job_id` under `root`; the id must be a single plain component
pub fn job_dir(root: &Path, job_id: &str) -> Result<PathBuf> {
    let id = job_id.trim();
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || is_absolute_like(id);

    if invalid {
        return Err(DicomeshError::InvalidJobId {
            job_id: job_id.to_string(),
        });
    }

    Ok(root.join(id))
}
