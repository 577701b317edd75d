use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Stage of [`write`](crate::jp2::Jp2Io::write) that failed after the
/// temporary container was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// Reading the box list back from the temporary container.
    ReadBack,
    /// Building or inserting the XML metadata box.
    InsertMetadata,
    /// Rewriting the destination file from the modified box list.
    Rewrite,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadBack => "reading back the temporary container",
            Self::InsertMetadata => "inserting the metadata box",
            Self::Rewrite => "rewriting the destination",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while reading or writing JP2 files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Jp2Error {
    /// The container has no XML metadata box, or the box has no `fits` element.
    #[error("missing metadata in {}: {detail}", .path.display())]
    MissingMetadata {
        /// File that was inspected.
        path: PathBuf,
        /// What exactly was missing.
        detail: &'static str,
    },

    /// The external JPEG 2000 codec failed.
    #[error("codec {operation} failed: {message}")]
    Codec {
        /// `"decode"` or `"encode"`.
        operation: &'static str,
        /// Codec diagnostics (usually its stderr).
        message: String,
    },

    /// A write failed after the temporary container had been created.
    #[error("write did not complete while {stage}: {source}")]
    IncompleteWrite {
        /// Step that failed.
        stage: WriteStage,
        /// Underlying failure.
        #[source]
        source: Box<Jp2Error>,
    },

    /// The box structure of the container is malformed.
    #[error("invalid box structure: {0}")]
    InvalidBox(String),

    /// The XML box contents could not be parsed or produced.
    #[error("XML error: {0}")]
    Xml(String),

    /// A header key cannot be used as an XML element name.
    #[error("header key {0:?} is not a valid XML element name")]
    InvalidFieldName(String),

    /// Pixel exchange with the codec failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Jp2Error {
    pub(crate) fn incomplete(stage: WriteStage, source: Jp2Error) -> Self {
        Self::IncompleteWrite {
            stage,
            source: Box::new(source),
        }
    }
}

/// Result shorthand using [`Jp2Error`].
pub type Result<T, E = Jp2Error> = std::result::Result<T, E>;
