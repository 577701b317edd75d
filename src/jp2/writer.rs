use std::ffi::OsString;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma, Primitive};

use super::boxes::Jp2Box;
use super::reader::{FITS_ELEMENT, HELIOVIEWER_KEY, META_ELEMENT, find_metadata};
use super::{Jp2Codec, Jp2Io};
use crate::error::{Jp2Error, Result, WriteStage};
use crate::header::FileHeader;
use crate::xml::{XmlElement, is_valid_name};

/// Suffix appended to the destination path for the first-pass container.
/// It must end in `.jp2` so the codec writes a JP2 container.
pub const DEFAULT_TMP_SUFFIX: &str = ".tmp.jp2";

/// Conversion of a sample to `u8` by truncation and wraparound.
///
/// Out-of-range values wrap (`300 → 44`, `-1 → 255`) rather than clamp;
/// floats are truncated toward zero first.
pub trait WrappingU8: Copy {
    fn wrapping_u8(self) -> u8;
}

macro_rules! impl_wrapping_int {
    ($($t:ty),*) => {
        $(impl WrappingU8 for $t {
            fn wrapping_u8(self) -> u8 {
                self as u8
            }
        })*
    };
}

impl_wrapping_int!(u8, u16, u32, u64, i8, i16, i32, i64);

impl WrappingU8 for f32 {
    fn wrapping_u8(self) -> u8 {
        (self as i64) as u8
    }
}

impl WrappingU8 for f64 {
    fn wrapping_u8(self) -> u8 {
        (self as i64) as u8
    }
}

/// Convert a single-channel buffer of any sample type to 8-bit samples.
pub fn to_u8_wrapping<T>(data: &ImageBuffer<Luma<T>, Vec<T>>) -> GrayImage
where
    T: Primitive + WrappingU8,
{
    GrayImage::from_fn(data.width(), data.height(), |x, y| {
        Luma([data.get_pixel(x, y).0[0].wrapping_u8()])
    })
}

/// Build the `<fits>` element for a header: one child per key, in header
/// order, with booleans written as `1`/`0`.
///
/// Keys are not sanitized; a key that is not a usable element name is an
/// error.
pub fn header_to_xml(header: &FileHeader) -> Result<XmlElement> {
    let mut fits = XmlElement::new(FITS_ELEMENT);
    for (key, value) in header.iter() {
        if !is_valid_name(key) {
            return Err(Jp2Error::InvalidFieldName(key.to_string()));
        }
        fits.push(XmlElement::with_text(key, value.to_string()));
    }
    Ok(fits)
}

/// Build the XML box (`<meta><fits>…</fits></meta>`) for a header.
pub fn generate_jp2_xmlbox(header: &FileHeader) -> Result<Jp2Box> {
    let mut meta = XmlElement::new(META_ELEMENT);
    meta.push(header_to_xml(header)?);
    Ok(Jp2Box::xml(&meta.to_document()?))
}

/// Path of the first-pass container for `path`.
pub fn tmp_jp2_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Insert `new_box` right before the last box, which has to stay last.
fn insert_before_last(boxes: &mut Vec<Jp2Box>, new_box: Jp2Box) -> Result<()> {
    if boxes.is_empty() {
        return Err(Jp2Error::InvalidBox("container has no boxes".into()));
    }
    let target = boxes.len() - 1;
    boxes.insert(target, new_box);
    Ok(())
}

/// Removes the first-pass container however `write` exits.
struct TempArtifact {
    path: PathBuf,
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

impl<C: Jp2Codec> Jp2Io<C> {
    /// Write pixels and header to a JP2 file.
    ///
    /// The codec cannot embed the metadata in a single pass, so the pixels
    /// are first encoded to `<path><tmp suffix>`, the XML box is spliced into
    /// that box list just before the codestream, and the result replaces
    /// `path` atomically. The first-pass file is removed on every exit path.
    ///
    /// Samples are converted with [`WrappingU8`]; clip beforehand if
    /// wraparound is not wanted.
    pub fn write<T>(
        &self,
        path: &Path,
        data: &ImageBuffer<Luma<T>, Vec<T>>,
        header: &FileHeader,
    ) -> Result<()>
    where
        T: Primitive + WrappingU8,
    {
        let xml_box = generate_jp2_xmlbox(header)?;
        let pixels = to_u8_wrapping(data);

        let tmp = tmp_jp2_path(path, &self.tmp_suffix);
        // A file already sitting at the temp path is only ours once encode has replaced it
        let mut guard = (!tmp.exists()).then(|| TempArtifact { path: tmp.clone() });

        self.codec.encode(&tmp, &pixels)?;
        guard.get_or_insert_with(|| TempArtifact { path: tmp.clone() });

        let mut boxes = self
            .codec
            .boxes(&tmp)
            .map_err(|e| Jp2Error::incomplete(WriteStage::ReadBack, e))?;
        insert_before_last(&mut boxes, xml_box)
            .map_err(|e| Jp2Error::incomplete(WriteStage::InsertMetadata, e))?;
        self.codec
            .rewrite(path, &boxes)
            .map_err(|e| Jp2Error::incomplete(WriteStage::Rewrite, e))?;

        log::info!("Wrote {} ({} header fields)", path.display(), header.len());
        Ok(())
    }

    /// Edit the header of an existing JP2 file without re-encoding it.
    ///
    /// Keys in `updates` get their new value (in place when already present,
    /// appended otherwise) and keys in `remove` are dropped. Every other
    /// `<fits>` child keeps its stored text byte for byte, and other children
    /// of the metadata document, such as the Helioviewer marker, are kept.
    /// Files without an XML box get one before their last box. The synthetic
    /// [`HELIOVIEWER_KEY`] entry is never written.
    pub fn update_header(
        &self,
        path: &Path,
        updates: &FileHeader,
        remove: &[String],
    ) -> Result<()> {
        let mut updates = updates.clone();
        updates.remove(HELIOVIEWER_KEY);
        let replacements = header_to_xml(&updates)?;

        let mut boxes = self.codec.boxes(path)?;
        let (index, mut meta) = match find_metadata(path, &boxes) {
            Ok((index, meta)) => (Some(index), meta),
            Err(Jp2Error::MissingMetadata { .. }) => {
                log::debug!("{} has no XML box, adding one", path.display());
                (None, XmlElement::new(META_ELEMENT))
            }
            Err(e) => return Err(e),
        };

        let fits_index = match meta.children.iter().position(|c| c.name == FITS_ELEMENT) {
            Some(i) => i,
            None => {
                meta.children.insert(0, XmlElement::new(FITS_ELEMENT));
                0
            }
        };
        merge_fields(&mut meta.children[fits_index], replacements.children, remove);

        let xml_box = Jp2Box::xml(&meta.to_document()?);
        match index {
            Some(i) => boxes[i] = xml_box,
            None => insert_before_last(&mut boxes, xml_box)?,
        }

        self.codec.rewrite(path, &boxes)?;
        log::info!(
            "Updated header of {} ({} set, {} removed)",
            path.display(),
            updates.len(),
            remove.len()
        );
        Ok(())
    }
}

/// Apply replacements and removals to the children of a `<fits>` element.
///
/// A replaced key takes the slot of its first occurrence; later repeats of
/// it are dropped. Untouched children are left exactly as parsed.
fn merge_fields(fits: &mut XmlElement, replacements: Vec<XmlElement>, remove: &[String]) {
    fits.children.retain(|c| !remove.contains(&c.name));
    for field in replacements {
        match fits.children.iter().position(|c| c.name == field.name) {
            Some(first) => {
                let mut seen = 0usize;
                fits.children.retain(|c| {
                    if c.name != field.name {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
                fits.children[first] = field;
            }
            None => fits.children.push(field),
        }
    }
}
