/// Errors surfaced by the extraction engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed `buildServer.json`, invalid root URI, or an
    /// otherwise unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A JSON document (config or aquery output) failed to decode. The buffer
    /// length is carried so a truncated Bazel invocation is recognizable from
    /// the log alone.
    #[error("failed to decode JSON document of {len} bytes: {source}")]
    Json {
        len: usize,
        #[source]
        source: serde_json::Error,
    },

    /// `bazel aquery` produced output that is not valid UTF-8.
    #[error("bazel output is not valid UTF-8: {0}")]
    Bazel(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn json(len: usize, source: serde_json::Error) -> Self {
        Self::Json { len, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
