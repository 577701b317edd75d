//! # jp2-fits
//!
//! Read and write JPEG 2000 (JP2) images whose FITS-style header travels in
//! an XML box, `<meta><fits><KEY>value</KEY>…</fits></meta>`.
//!
//! Wavelet coding is left to an external codec ([`jp2::Jp2Codec`], by default
//! the OpenJPEG command-line tools). This crate handles the box container, the
//! header ⇄ XML translation, value typing and the two-pass write that splices
//! the metadata in before the codestream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jp2_fits::{FileHeader, jp2::ReadOptions};
//! use image::GrayImage;
//! use std::path::Path;
//!
//! fn main() -> jp2_fits::Result<()> {
//!     let path = Path::new("aia_171.jp2");
//!
//!     // Header only (no pixel decoding)
//!     let header = jp2_fits::get_header(path)?.remove(0);
//!     println!("WAVELNTH = {:?}", header.get("WAVELNTH"));
//!
//!     // Pixels and header; rows come back bottom-up
//!     let pair = jp2_fits::read(path, &ReadOptions::new())?.remove(0);
//!     println!("{}x{}", pair.data.width(), pair.data.height());
//!
//!     // Write a new file
//!     let mut header = FileHeader::new();
//!     header.insert("TELESCOP", "SDO/AIA");
//!     header.insert("WAVELNTH", 171);
//!     jp2_fits::write(Path::new("out.jp2"), &GrayImage::new(64, 64), &header)?;
//!     Ok(())
//! }
//! ```
//!
//! For a custom codec or temp-file suffix, build a [`jp2::Jp2Io`] directly.
//!
//! ## Modules
//!
//! - [`header`] — typed header values and the ordered header map
//! - [`xml`] — minimal element tree over `quick-xml`
//! - [`jp2`] — box container, codec seam, reader and writer
//! - [`config`] — codec and write settings, loaded from JSON
//! - [`pipeline`] — file collection and header inspect/edit helpers
//! - [`error`] — library error type

pub mod config;
pub mod error;
pub mod header;
pub mod jp2;
pub mod pipeline;
pub mod xml;

pub use error::{Jp2Error, Result};
pub use header::{FileHeader, HeaderValue};

use image::{ImageBuffer, Luma, Primitive};
use std::path::Path;

use jp2::{HeaderDataPair, Jp2Io, OpenJpegCli, ReadOptions, WrappingU8};

/// Read pixels and header with the default OpenJPEG codec.
pub fn read(path: &Path, options: &ReadOptions) -> Result<Vec<HeaderDataPair>> {
    Jp2Io::<OpenJpegCli>::default().read(path, options)
}

/// Read the header with the default OpenJPEG codec.
pub fn get_header(path: &Path) -> Result<Vec<FileHeader>> {
    Jp2Io::<OpenJpegCli>::default().get_header(path)
}

/// Write pixels and header with the default OpenJPEG codec.
pub fn write<T>(
    path: &Path,
    data: &ImageBuffer<Luma<T>, Vec<T>>,
    header: &FileHeader,
) -> Result<()>
where
    T: Primitive + WrappingU8,
{
    Jp2Io::<OpenJpegCli>::default().write(path, data, header)
}
