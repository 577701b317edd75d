use std::collections::BTreeMap;
use std::path::Path;

use image::DynamicImage;

use super::boxes::{BoxType, Jp2Box};
use super::{Jp2Codec, Jp2Io};
use crate::error::{Jp2Error, Result};
use crate::header::{FileHeader, HeaderValue, coerce_value};
use crate::xml::{XmlElement, xml_to_dict};

/// Element holding the header fields inside the metadata box.
pub(crate) const FITS_ELEMENT: &str = "fits";
/// Root element of the metadata box.
pub(crate) const META_ELEMENT: &str = "meta";
/// Presence-only marker written by the Helioviewer pipeline.
pub(crate) const HELIOVIEWER_ELEMENT: &str = "helioviewer";
/// Synthetic header key reporting the marker.
pub const HELIOVIEWER_KEY: &str = "helioviewer";

const COMMENT_KEY: &str = "comment";

/// Reader options. JP2 reading has none of its own; options are accepted so
/// callers can pass the same settings they use for other formats.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    options: BTreeMap<String, String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Decoded pixels and the header read alongside them.
#[derive(Debug, Clone)]
pub struct HeaderDataPair {
    pub data: DynamicImage,
    pub header: FileHeader,
}

impl<C: Jp2Codec> Jp2Io<C> {
    /// Read the header of a JP2 file.
    ///
    /// Always returns exactly one header.
    pub fn get_header(&self, path: &Path) -> Result<Vec<FileHeader>> {
        Ok(vec![self.header(path)?])
    }

    /// Read pixels and header of a JP2 file.
    ///
    /// Rows come back in reverse order: the first row of the result is the
    /// last row stored in the codestream. Always returns exactly one pair.
    pub fn read(&self, path: &Path, options: &ReadOptions) -> Result<Vec<HeaderDataPair>> {
        if !options.is_empty() {
            log::debug!(
                "Ignoring read options {:?} for {}",
                options.options.keys().collect::<Vec<_>>(),
                path.display()
            );
        }

        let header = self.header(path)?;
        let data = self.codec.decode(path)?.flipv();
        Ok(vec![HeaderDataPair { data, header }])
    }

    fn header(&self, path: &Path) -> Result<FileHeader> {
        let boxes = self.codec.boxes(path)?;
        let (_, meta) = find_metadata(path, &boxes)?;
        header_from_meta(path, &meta)
    }
}

/// Locate the first XML box and parse it. Returns the box index and the
/// root element of its document.
pub(crate) fn find_metadata(path: &Path, boxes: &[Jp2Box]) -> Result<(usize, XmlElement)> {
    let (index, xml_box) = boxes
        .iter()
        .enumerate()
        .find(|(_, b)| b.box_type == BoxType::XML)
        .ok_or_else(|| Jp2Error::MissingMetadata {
            path: path.to_path_buf(),
            detail: "no XML box",
        })?;

    let text = std::str::from_utf8(&xml_box.payload)
        .map_err(|e| Jp2Error::Xml(format!("XML box is not UTF-8: {e}")))?;
    // Some writers pad the box with NULs
    let text = text.trim_end_matches('\0').trim();

    log::debug!("XML box #{index} in {}: {} bytes", path.display(), text.len());
    Ok((index, XmlElement::parse(text)?))
}

/// Turn the parsed `meta` document into a typed header.
pub(crate) fn header_from_meta(path: &Path, meta: &XmlElement) -> Result<FileHeader> {
    let fits = meta.find(FITS_ELEMENT).ok_or_else(|| Jp2Error::MissingMetadata {
        path: path.to_path_buf(),
        detail: "XML box has no <fits> element",
    })?;

    let mut header: FileHeader = xml_to_dict(fits)
        .into_iter()
        .map(|(key, raw)| (key, coerce_value(&raw)))
        .collect();

    if let Some(HeaderValue::Str(comment)) = header.get_mut(COMMENT_KEY) {
        comment.retain(|c| c != '\n');
    }

    let helioviewer = meta.find(HELIOVIEWER_ELEMENT).is_some();
    header.insert(HELIOVIEWER_KEY, helioviewer);

    Ok(header)
}
