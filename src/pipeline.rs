use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::header::{FileHeader, HeaderValue, coerce_value};
use crate::jp2::{HELIOVIEWER_KEY, Jp2Box, Jp2Codec, Jp2Io};
use crate::xml::is_valid_name;

/// Extensions of JP2-family containers (box-structured, can carry an XML box).
const IMAGE_EXTENSIONS: &[&str] = &["jp2", "jpx", "jpf"];

/// The result of inspecting or editing a single file.
///
/// Serializes to JSON for `--json` output.
#[derive(Debug, Default, Serialize)]
pub struct ProcessResult {
    pub path: PathBuf,
    pub header: Option<FileHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<BoxSummary>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// One box of a container, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub box_type: String,
    pub length: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BoxSummary>,
}

/// Summarize a box list, descending into superboxes.
pub fn describe_boxes(boxes: &[Jp2Box]) -> Vec<BoxSummary> {
    boxes
        .iter()
        .map(|b| {
            let children = if b.box_type.is_superbox() {
                match b.children() {
                    Ok(children) => describe_boxes(&children),
                    Err(e) => {
                        log::warn!("Could not parse '{}' superbox: {e}", b.box_type);
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };
            BoxSummary {
                box_type: b.box_type.to_string(),
                length: b.encoded_len(),
                children,
            }
        })
        .collect()
}

/// Header changes requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct HeaderEdit {
    pub set: Vec<(String, HeaderValue)>,
    pub remove: Vec<String>,
}

impl HeaderEdit {
    /// Build an edit from `KEY=VALUE` assignments and keys to remove.
    ///
    /// Values are typed the same way as values read from a file.
    pub fn parse(assignments: &[String], remove: &[String]) -> Result<Self> {
        let set = assignments
            .iter()
            .map(|a| parse_assignment(a))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            set,
            remove: remove.to_vec(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    /// Apply to `header`, returning the keys that actually changed.
    pub fn apply(&self, header: &mut FileHeader) -> Vec<String> {
        let mut changed = Vec::new();
        for key in &self.remove {
            if header.remove(key).is_some() {
                changed.push(key.clone());
            }
        }
        for (key, value) in &self.set {
            if header.insert(key.clone(), value.clone()).as_ref() != Some(value) {
                changed.push(key.clone());
            }
        }
        changed
    }
}

/// Parse a `KEY=VALUE` assignment.
fn parse_assignment(assignment: &str) -> Result<(String, HeaderValue)> {
    let (key, value) = assignment
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got {assignment:?}"))?;
    let key = key.trim();
    if !is_valid_name(key) {
        anyhow::bail!("{key:?} cannot be used as a header key");
    }
    if key == HELIOVIEWER_KEY {
        anyhow::bail!("{HELIOVIEWER_KEY:?} is derived from the file and cannot be set");
    }
    Ok((key.to_string(), coerce_value(value)))
}

/// Collect JP2 files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only files with JP2-family extensions
/// are included.
///
/// # Example
///
/// ```rust,no_run
/// use jp2_fits::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("aia_171.jp2"),     // single file
///     PathBuf::from("./helioviewer/"),  // entire directory
/// ]);
/// println!("Found {} files", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a JP2-family extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Create a backup of the original file.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Read the header (and optionally the box layout) of a file.
pub fn inspect_image<C: Jp2Codec>(path: &Path, io: &Jp2Io<C>, with_boxes: bool) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        ..Default::default()
    };

    if with_boxes {
        match io.codec().boxes(path) {
            Ok(boxes) => result.boxes = Some(describe_boxes(&boxes)),
            Err(e) => {
                result.error = Some(format!("Failed to read boxes: {e}"));
                return result;
            }
        }
    }

    match io.get_header(path) {
        Ok(mut headers) => result.header = headers.pop(),
        Err(e) => result.error = Some(format!("Failed to read header: {e}")),
    }

    result
}

/// Apply a header edit to a file in place.
///
/// Honors `config.output.dry_run` (nothing is written) and
/// `config.output.backup_originals`.
pub fn edit_image<C: Jp2Codec>(
    path: &Path,
    io: &Jp2Io<C>,
    edit: &HeaderEdit,
    config: &Config,
) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        ..Default::default()
    };

    let mut header = match io.get_header(path) {
        Ok(mut headers) => headers.pop().unwrap_or_default(),
        Err(e) => {
            result.error = Some(format!("Failed to read header: {e}"));
            return result;
        }
    };

    result.changed_keys = edit.apply(&mut header);
    result.header = Some(header);

    if result.changed_keys.is_empty() || config.output.dry_run {
        return result;
    }

    if config.output.backup_originals {
        match backup_file(path) {
            Ok(p) => result.backup_path = Some(p),
            Err(e) => log::warn!("Failed to backup {}: {e}", path.display()),
        }
    }

    // Only the edited keys are written; every other field keeps its stored text
    let changed = &result.changed_keys;
    let updates: FileHeader = edit
        .set
        .iter()
        .filter(|(key, _)| changed.contains(key))
        .cloned()
        .collect();
    let removed: Vec<String> = edit
        .remove
        .iter()
        .filter(|key| changed.contains(key))
        .cloned()
        .collect();

    if let Err(e) = io.update_header(path, &updates, &removed) {
        result.error = Some(format!("Failed to write header: {e}"));
    }

    result
}
