//! JPEG 2000 files with a FITS-style header in an XML box.
//!
//! [`Jp2Io`] composes the header ⇄ XML translation with an external
//! [`Jp2Codec`]:
//!
//! - [`Jp2Io::get_header`] — header from the `xml ` box
//! - [`Jp2Io::read`] — pixels (rows reversed) plus header
//! - [`Jp2Io::write`] — two-pass write with the XML box spliced in before the codestream
//! - [`Jp2Io::update_header`] — rewrite only the header of an existing file
//!
//! The metadata box holds `<meta><fits><KEY>value</KEY>…</fits></meta>`,
//! optionally with a sibling `<helioviewer/>` marker.

mod boxes;
mod codec;
mod reader;
mod writer;

pub use boxes::{BoxType, Jp2Box, parse_boxes, read_boxes, serialize_boxes, write_boxes};
pub use codec::{Jp2Codec, OpenJpegCli};
pub use reader::{HELIOVIEWER_KEY, HeaderDataPair, ReadOptions};
pub use writer::{
    DEFAULT_TMP_SUFFIX, WrappingU8, generate_jp2_xmlbox, header_to_xml, tmp_jp2_path,
    to_u8_wrapping,
};

use crate::config::Config;

/// JP2 reader/writer bound to a codec.
///
/// # Example
///
/// ```rust,no_run
/// use jp2_fits::jp2::{Jp2Io, ReadOptions};
/// use std::path::Path;
///
/// let io: Jp2Io = Jp2Io::default();
/// let pair = io.read(Path::new("aia_171.jp2"), &ReadOptions::new())?.remove(0);
/// println!("{:?}", pair.header.get("WAVELNTH"));
/// # Ok::<(), jp2_fits::Jp2Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Jp2Io<C = OpenJpegCli> {
    codec: C,
    tmp_suffix: String,
}

impl<C: Jp2Codec> Jp2Io<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            tmp_suffix: DEFAULT_TMP_SUFFIX.to_string(),
        }
    }

    /// Use a different suffix for the first-pass container of [`write`](Self::write).
    pub fn with_tmp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.tmp_suffix = suffix.into();
        self
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }
}

impl Jp2Io<OpenJpegCli> {
    /// OpenJPEG-backed reader/writer configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(OpenJpegCli::from_config(&config.codec))
            .with_tmp_suffix(config.write.tmp_suffix.clone())
    }
}

impl Default for Jp2Io<OpenJpegCli> {
    fn default() -> Self {
        Self::new(OpenJpegCli::default())
    }
}
