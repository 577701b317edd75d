use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::error::{Jp2Error, Result};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const SIGNATURE: BoxType = BoxType(*b"jP  ");
    pub const FILE_TYPE: BoxType = BoxType(*b"ftyp");
    pub const HEADER: BoxType = BoxType(*b"jp2h");
    pub const IMAGE_HEADER: BoxType = BoxType(*b"ihdr");
    pub const COLOUR: BoxType = BoxType(*b"colr");
    pub const RESOLUTION: BoxType = BoxType(*b"res ");
    pub const CODESTREAM: BoxType = BoxType(*b"jp2c");
    pub const XML: BoxType = BoxType(*b"xml ");
    pub const UUID: BoxType = BoxType(*b"uuid");

    /// Boxes whose payload is itself a box list.
    const SUPERBOXES: [BoxType; 4] = [
        Self::HEADER,
        Self::RESOLUTION,
        BoxType(*b"uinf"),
        BoxType(*b"asoc"),
    ];

    pub fn is_superbox(&self) -> bool {
        Self::SUPERBOXES.contains(self)
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// A top-level (or superbox child) box with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jp2Box {
    pub box_type: BoxType,
    pub payload: Vec<u8>,
}

// 4-byte length + 4-byte type
const HEADER_LEN: usize = 8;
// ... + 8-byte extended length
const LARGE_HEADER_LEN: usize = 16;

impl Jp2Box {
    pub fn new(box_type: BoxType, payload: Vec<u8>) -> Self {
        Self { box_type, payload }
    }

    /// An `xml ` box holding `document`.
    pub fn xml(document: &str) -> Self {
        Self::new(BoxType::XML, document.as_bytes().to_vec())
    }

    /// Parse the payload of a superbox as a box list.
    pub fn children(&self) -> Result<Vec<Jp2Box>> {
        if !self.box_type.is_superbox() {
            return Err(Jp2Error::InvalidBox(format!(
                "'{}' is not a superbox",
                self.box_type
            )));
        }
        parse_boxes(&self.payload)
    }

    /// Size of the box once serialized, header included.
    pub fn encoded_len(&self) -> u64 {
        let small = self.payload.len() as u64 + HEADER_LEN as u64;
        if small <= u32::MAX as u64 {
            small
        } else {
            self.payload.len() as u64 + LARGE_HEADER_LEN as u64
        }
    }

    fn write_into(&self, out: &mut Vec<u8>) {
        let len = self.encoded_len();
        if len <= u32::MAX as u64 {
            out.extend_from_slice(&(len as u32).to_be_bytes());
            out.extend_from_slice(&self.box_type.0);
        } else {
            out.extend_from_slice(&1u32.to_be_bytes());
            out.extend_from_slice(&self.box_type.0);
            out.extend_from_slice(&len.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
    }
}

/// Split a byte buffer into its sequence of boxes.
///
/// A length of 0 means the box runs to the end of the buffer; a length of 1
/// means a 64-bit extended length follows the type.
pub fn parse_boxes(data: &[u8]) -> Result<Vec<Jp2Box>> {
    let mut boxes = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let remaining = data.len() - pos;
        if remaining < HEADER_LEN {
            return Err(Jp2Error::InvalidBox(format!(
                "{remaining} trailing bytes at offset {pos} are too short for a box header"
            )));
        }
        let lbox = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        let box_type = BoxType([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);

        let (header_len, box_len) = match lbox {
            0 => (HEADER_LEN, remaining),
            1 => {
                if remaining < LARGE_HEADER_LEN {
                    return Err(Jp2Error::InvalidBox(format!(
                        "'{box_type}' at offset {pos} is missing its extended length"
                    )));
                }
                let mut xl = [0u8; 8];
                xl.copy_from_slice(&data[pos + 8..pos + 16]);
                let xlbox = u64::from_be_bytes(xl);
                let len = usize::try_from(xlbox).map_err(|_| {
                    Jp2Error::InvalidBox(format!(
                        "'{box_type}' length {xlbox} does not fit in memory"
                    ))
                })?;
                (LARGE_HEADER_LEN, len)
            }
            n => (HEADER_LEN, n as usize),
        };

        if box_len < header_len {
            return Err(Jp2Error::InvalidBox(format!(
                "'{box_type}' at offset {pos} declares length {box_len}, shorter than its header"
            )));
        }
        if box_len > remaining {
            return Err(Jp2Error::InvalidBox(format!(
                "'{box_type}' at offset {pos} declares length {box_len} but only {remaining} bytes remain"
            )));
        }

        log::debug!("Box '{box_type}' at offset {pos}, {box_len} bytes");
        boxes.push(Jp2Box::new(
            box_type,
            data[pos + header_len..pos + box_len].to_vec(),
        ));
        pos += box_len;
    }

    Ok(boxes)
}

/// Concatenate boxes into a container byte stream.
pub fn serialize_boxes(boxes: &[Jp2Box]) -> Vec<u8> {
    let total: u64 = boxes.iter().map(Jp2Box::encoded_len).sum();
    let mut out = Vec::with_capacity(total as usize);
    for b in boxes {
        b.write_into(&mut out);
    }
    out
}

/// Read the top-level box list of a file.
pub fn read_boxes(path: &Path) -> Result<Vec<Jp2Box>> {
    let data = std::fs::read(path)?;
    parse_boxes(&data)
}

/// Write a box list to `path`, replacing it atomically.
///
/// The bytes go to a temporary file in the same directory which is then
/// renamed over the destination, so readers never observe a partial file.
pub fn write_boxes(path: &Path, boxes: &[Jp2Box]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let bytes = serialize_boxes(boxes);

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Jp2Error::Io(e.error))?;

    log::debug!("Wrote {} boxes ({} bytes) to {}", boxes.len(), bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_boxes() -> Vec<Jp2Box> {
        let ihdr = Jp2Box::new(BoxType::IMAGE_HEADER, vec![0; 14]);
        vec![
            Jp2Box::new(BoxType::SIGNATURE, vec![0x0D, 0x0A, 0x87, 0x0A]),
            Jp2Box::new(BoxType::FILE_TYPE, b"jp2 \0\0\0\0jp2 ".to_vec()),
            Jp2Box::new(BoxType::HEADER, serialize_boxes(&[ihdr])),
            Jp2Box::new(BoxType::CODESTREAM, vec![0xFF, 0x4F, 0xFF, 0x51]),
        ]
    }

    #[test]
    fn parse_serialized_list() {
        let boxes = sample_boxes();
        let bytes = serialize_boxes(&boxes);
        assert_eq!(&bytes[0..8], &[0, 0, 0, 12, b'j', b'P', b' ', b' ']);
        assert_eq!(parse_boxes(&bytes).unwrap(), boxes);
    }

    #[test]
    fn superbox_children() {
        let boxes = sample_boxes();
        let children = boxes[2].children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].box_type, BoxType::IMAGE_HEADER);
        assert!(boxes[3].children().is_err());
    }

    #[test]
    fn zero_length_runs_to_end() {
        let mut bytes = serialize_boxes(&sample_boxes()[..1]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"jp2c");
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);

        let boxes = parse_boxes(&bytes).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].box_type, BoxType::CODESTREAM);
        assert_eq!(boxes[1].payload, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn extended_length_header() {
        let mut bytes = vec![0, 0, 0, 1];
        bytes.extend_from_slice(b"xml ");
        bytes.extend_from_slice(&19u64.to_be_bytes());
        bytes.extend_from_slice(b"<a/>");
        // 16-byte header + 4 payload bytes would be 20; declare 19 to cut one off
        bytes.truncate(19);

        let boxes = parse_boxes(&bytes).unwrap();
        assert_eq!(boxes[0].box_type, BoxType::XML);
        assert_eq!(boxes[0].payload, b"<a/".to_vec());
    }

    #[test]
    fn rejects_truncated_box() {
        let mut bytes = serialize_boxes(&sample_boxes());
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(parse_boxes(&bytes), Err(Jp2Error::InvalidBox(_))));
    }

    #[test]
    fn rejects_length_shorter_than_header() {
        let bytes = [0, 0, 0, 4, b'j', b'p', b'2', b'c'];
        assert!(matches!(parse_boxes(&bytes), Err(Jp2Error::InvalidBox(_))));
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut bytes = serialize_boxes(&sample_boxes());
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(parse_boxes(&bytes), Err(Jp2Error::InvalidBox(_))));
    }

    #[test]
    fn empty_buffer_has_no_boxes() {
        assert!(parse_boxes(&[]).unwrap().is_empty());
    }

    #[test]
    fn box_type_display() {
        assert_eq!(BoxType::XML.to_string(), "xml ");
        assert_eq!(BoxType([0, b'a', b'b', b'c']).to_string(), "?abc");
    }

    #[test]
    fn write_boxes_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jp2");
        std::fs::write(&path, b"old contents").unwrap();

        let boxes = sample_boxes();
        write_boxes(&path, &boxes).unwrap();
        assert_eq!(read_boxes(&path).unwrap(), boxes);

        // No stray temp files next to the destination
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
