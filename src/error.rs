use std::path::PathBuf;

/// Errors produced while extracting and parsing generation metadata.
///
/// [`Error::Metadata`] and [`Error::Parse`] describe data that simply does not
/// fit one extraction technique or one generator grammar. [`ParserManager`]
/// skips over them and keeps searching. Every other variant aborts the whole
/// parse.
///
/// [`ParserManager`]: crate::pipeline::ParserManager
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The container holds bytes that a given extractor could not read.
    #[error("Error reading metadata: {0}")]
    Metadata(String),

    /// The extracted bag does not match a generator grammar.
    #[error("{0}")]
    Parse(String),

    /// A data model value was constructed from invalid input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read image file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub(crate) fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }

    /// `true` for errors the search loop recovers from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Metadata(_) | Self::Parse(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
