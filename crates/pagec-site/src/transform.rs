//! Text transforms run over stylesheets and SVG markup.
//!
//! A [`TextTransform`] turns one string into another. [`CommandTransform`]
//! does it by piping the text through an external program; the compilers
//! built on top ([`StyleCompiler`], [`SvgOptimizer`]) chain transforms and
//! cache the result by content.

use std::fmt;
use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use pagec_cache::CacheBucket;

use crate::error::BuildError;

/// Cache bucket for compiled stylesheets.
pub const STYLES_BUCKET: &str = "styles";
/// Cache bucket for optimized SVG markup.
pub const SVG_BUCKET: &str = "svg";

/// Error from a text transform.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A command line with no program.
    #[error("Transform command is empty")]
    EmptyCommand,
    /// The program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying error.
        source: io::Error,
    },
    /// Writing input or reading output failed.
    #[error("I/O error talking to {program}: {source}")]
    Io {
        /// Program name.
        program: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The program exited unsuccessfully.
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit status.
        status: ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// The program produced output that is not UTF-8.
    #[error("{program} produced invalid UTF-8")]
    InvalidUtf8 {
        /// Program name.
        program: String,
    },
}

/// A string-to-string transformation step.
pub trait TextTransform: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Transform `input`.
    fn apply(&self, input: &str) -> Result<String, TransformError>;
}

/// Runs an external program with the text on stdin and reads stdout back.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandTransform {
    /// Build from a command line (`["sass", "--stdin"]`).
    pub fn from_command(command: &[String]) -> Result<Self, TransformError> {
        let (program, args) = command.split_first().ok_or(TransformError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            env: Vec::new(),
        })
    }

    /// Set an environment variable for the program.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl TextTransform for CommandTransform {
    fn name(&self) -> &str {
        &self.program
    }

    fn apply(&self, input: &str) -> Result<String, TransformError> {
        let io_err = |source| TransformError::Io {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransformError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin from a separate thread while stdout is drained.
        let stdin = child.stdin.take();
        let (output, written) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(input.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            (output, written)
        });
        let output = output.map_err(io_err)?;

        if !output.status.success() {
            return Err(TransformError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        // A program may legitimately exit without reading all of its input.
        if let Err(e) = written
            && e.kind() != io::ErrorKind::BrokenPipe
        {
            return Err(io_err(e));
        }
        String::from_utf8(output.stdout).map_err(|_| TransformError::InvalidUtf8 {
            program: self.program.clone(),
        })
    }
}

/// Compiles stylesheets through an ordered chain of transforms.
///
/// Results are cached by browser list and source text, so editing either
/// recompiles while unchanged styles are served from the cache.
pub struct StyleCompiler {
    transforms: Vec<Box<dyn TextTransform>>,
    browsers: Vec<String>,
    cache: CacheBucket,
}

impl fmt::Debug for StyleCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleCompiler")
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("browsers", &self.browsers)
            .field("cache", &self.cache.name())
            .finish()
    }
}

impl StyleCompiler {
    /// Create a compiler running `transforms` in order.
    #[must_use]
    pub fn new(
        transforms: Vec<Box<dyn TextTransform>>,
        browsers: Vec<String>,
        cache: CacheBucket,
    ) -> Self {
        Self {
            transforms,
            browsers,
            cache,
        }
    }

    /// Create a compiler from command lines. Each program sees the browser
    /// targets in `BROWSERSLIST`.
    pub fn from_commands(
        commands: &[Vec<String>],
        browsers: Vec<String>,
        cache: CacheBucket,
    ) -> Result<Self, TransformError> {
        let targets = browsers.join(", ");
        let transforms = commands
            .iter()
            .map(|command| {
                let transform =
                    CommandTransform::from_command(command)?.env("BROWSERSLIST", targets.as_str());
                Ok(Box::new(transform) as Box<dyn TextTransform>)
            })
            .collect::<Result<Vec<_>, TransformError>>()?;
        Ok(Self::new(transforms, browsers, cache))
    }

    /// Browser targets.
    #[must_use]
    pub fn browsers(&self) -> &[String] {
        &self.browsers
    }

    /// Compile `source`. Without transforms the source is returned as is.
    pub fn compile(&self, source: &str) -> Result<String, BuildError> {
        if self.transforms.is_empty() {
            return Ok(source.to_owned());
        }

        let mut inputs = self.browsers.join(",").into_bytes();
        inputs.push(0);
        inputs.extend_from_slice(source.as_bytes());

        self.cache.get_or_compute_string(&inputs, || {
            let mut css = source.to_owned();
            for transform in &self.transforms {
                tracing::debug!(transform = transform.name(), "Applying style transform");
                css = transform.apply(&css)?;
            }
            Ok(css)
        })
    }
}

/// Optimizes inline SVG markup through an optional transform.
pub struct SvgOptimizer {
    transform: Option<Box<dyn TextTransform>>,
    cache: CacheBucket,
}

impl fmt::Debug for SvgOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvgOptimizer")
            .field("transform", &self.transform.as_ref().map(|t| t.name()))
            .field("cache", &self.cache.name())
            .finish()
    }
}

impl SvgOptimizer {
    /// Create an optimizer. `None` passes markup through untouched.
    #[must_use]
    pub fn new(transform: Option<Box<dyn TextTransform>>, cache: CacheBucket) -> Self {
        Self { transform, cache }
    }

    /// Optimize `svg`.
    pub fn optimize(&self, svg: &str) -> Result<String, BuildError> {
        let Some(transform) = &self.transform else {
            return Ok(svg.to_owned());
        };
        self.cache
            .get_or_compute_string(svg.as_bytes(), || Ok(transform.apply(svg)?))
    }
}
