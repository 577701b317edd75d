use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, GrayImage};

use super::boxes::{self, Jp2Box};
use crate::config::CodecConfig;
use crate::error::{Jp2Error, Result};

/// The external JPEG 2000 codec.
///
/// Implementors only have to provide pixel decoding and encoding; the box
/// list is read and rewritten natively by default.
///
/// # Example
///
/// ```rust,no_run
/// use jp2_fits::jp2::{Jp2Codec, OpenJpegCli};
/// use std::path::Path;
///
/// let codec = OpenJpegCli::default();
/// let pixels = codec.decode(Path::new("aia_171.jp2"))?;
/// println!("{}x{}", pixels.width(), pixels.height());
/// # Ok::<(), jp2_fits::Jp2Error>(())
/// ```
pub trait Jp2Codec {
    /// Decode the image pixels of a JP2 file.
    fn decode(&self, path: &Path) -> Result<DynamicImage>;

    /// Encode `data` as a fresh JP2 file with the codec's default box list.
    fn encode(&self, path: &Path, data: &GrayImage) -> Result<()>;

    /// Top-level box list of a JP2 file.
    fn boxes(&self, path: &Path) -> Result<Vec<Jp2Box>> {
        boxes::read_boxes(path)
    }

    /// Replace `path` with a container made of `boxes`.
    fn rewrite(&self, path: &Path, boxes: &[Jp2Box]) -> Result<()> {
        boxes::write_boxes(path, boxes)
    }
}

/// Codec backed by OpenJPEG's `opj_compress` / `opj_decompress` tools.
///
/// Pixels are exchanged with the tools as PNG files in a scratch directory
/// that is removed when the call returns.
#[derive(Debug, Clone)]
pub struct OpenJpegCli {
    compress_bin: PathBuf,
    decompress_bin: PathBuf,
    compress_args: Vec<String>,
}

impl Default for OpenJpegCli {
    fn default() -> Self {
        Self::from_config(&CodecConfig::default())
    }
}

impl OpenJpegCli {
    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            compress_bin: PathBuf::from(&config.compress_bin),
            decompress_bin: PathBuf::from(&config.decompress_bin),
            compress_args: config.compress_args.clone(),
        }
    }

    fn run(&self, operation: &'static str, program: &Path, args: Vec<OsString>) -> Result<()> {
        log::debug!("Running {} {:?}", program.display(), args);

        let output = Command::new(program)
            .args(&args)
            .output()
            .map_err(|e| Jp2Error::Codec {
                operation,
                message: format!("failed to run {}: {e}", program.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(Jp2Error::Codec {
                operation,
                message: format!(
                    "{} exited with {}: {}",
                    program.display(),
                    output.status,
                    detail.trim()
                ),
            });
        }
        Ok(())
    }
}

impl Jp2Codec for OpenJpegCli {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let scratch = tempfile::tempdir()?;
        let decoded = scratch.path().join("decoded.png");

        self.run(
            "decode",
            &self.decompress_bin,
            vec!["-i".into(), path.into(), "-o".into(), decoded.clone().into()],
        )?;

        Ok(image::open(&decoded)?)
    }

    fn encode(&self, path: &Path, data: &GrayImage) -> Result<()> {
        // opj_compress picks the container from the output extension
        let is_jp2 = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jp2"));
        if !is_jp2 {
            return Err(Jp2Error::Codec {
                operation: "encode",
                message: format!("{} does not have a .jp2 extension", path.display()),
            });
        }

        let scratch = tempfile::tempdir()?;
        let source = scratch.path().join("source.png");
        data.save(&source)?;

        let mut args: Vec<OsString> = vec!["-i".into(), source.into(), "-o".into(), path.into()];
        args.extend(self.compress_args.iter().map(OsString::from));
        self.run("encode", &self.compress_bin, args)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RawCodec;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn raw_codec_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.jp2");
        let img = GrayImage::from_fn(3, 2, |x, y| image::Luma([(x + 10 * y) as u8]));

        RawCodec.encode(&path, &img).unwrap();
        let boxes = RawCodec.boxes(&path).unwrap();
        assert_eq!(boxes.last().unwrap().box_type, boxes::BoxType::CODESTREAM);
        assert_eq!(RawCodec.decode(&path).unwrap().to_luma8(), img);
    }

    #[test]
    fn missing_binary_is_a_codec_error() {
        let config = CodecConfig {
            compress_bin: "/nonexistent/opj_compress".into(),
            decompress_bin: "/nonexistent/opj_decompress".into(),
            compress_args: Vec::new(),
        };
        let codec = OpenJpegCli::from_config(&config);
        let dir = TempDir::new().unwrap();

        let err = codec.decode(&dir.path().join("in.jp2")).unwrap_err();
        assert!(matches!(err, Jp2Error::Codec { operation: "decode", .. }));

        let img = GrayImage::new(2, 2);
        let err = codec.encode(&dir.path().join("out.jp2"), &img).unwrap_err();
        assert!(matches!(err, Jp2Error::Codec { operation: "encode", .. }));
    }

    #[test]
    fn encode_requires_jp2_extension() {
        let codec = OpenJpegCli::default();
        let img = GrayImage::new(2, 2);
        let err = codec.encode(Path::new("out.j2k"), &img).unwrap_err();
        assert!(err.to_string().contains(".jp2"));
    }
}
