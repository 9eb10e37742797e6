//! Image pipeline errors.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use pagec_paths::PathTraversal;

/// Failure of a single transcoder invocation.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// The transcoder program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The transcoder ran and reported failure.
    #[error("{program} failed for {} ({status}): {stderr}", .output.display())]
    Failed {
        /// Program name.
        program: String,
        /// File the job was writing.
        output: PathBuf,
        /// Exit status.
        status: ExitStatus,
        /// Captured standard error.
        stderr: String,
    },
    /// In-process transcoders report their own messages.
    #[error("Transcoding {} failed: {message}", .output.display())]
    Other {
        /// File the job was writing.
        output: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Error returned by [`ImagePipeline`](crate::ImagePipeline) operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// A derivative path resolved outside the output root.
    #[error(transparent)]
    Traversal(#[from] PathTraversal),
    /// Source dimensions could not be read.
    #[error("Cannot read dimensions of {}: {message}", .path.display())]
    Dimensions {
        /// Source image.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },
    /// A transcoder job failed.
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    /// Filesystem failure.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The worker pool could not be built.
    #[error("Failed to create thread pool: {0}")]
    Pool(String),
    /// Options that cannot produce a derivative set.
    #[error("Invalid image options: {0}")]
    InvalidOptions(String),
}
