//! External transcoder boundary.

use std::path::PathBuf;
use std::process::Command;

use crate::TranscodeError;

/// How a job maps the source onto its target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Fit inside `width x height`, keeping the aspect; never upscale.
    Bound,
    /// Cover `width x height` and crop the overflow around the center.
    Fill,
}

/// One derivative file to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    /// Source image.
    pub source: PathBuf,
    /// Output file; its extension selects the format.
    pub output: PathBuf,
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// Encoder quality, 1-100.
    pub quality: u8,
    /// Resize behavior.
    pub mode: ResizeMode,
}

/// Produces derivative files.
///
/// Implementations strip metadata, interlace progressively and use 4:2:0
/// chroma subsampling where the format supports it. Jobs run concurrently,
/// so implementations must be `Send + Sync` and must not share output
/// files between jobs.
pub trait Transcoder: Send + Sync {
    /// Write `job.output`.
    fn transcode(&self, job: &TranscodeJob) -> Result<(), TranscodeError>;
}

/// Transcoder backed by the ImageMagick command-line tool.
#[derive(Debug, Clone)]
pub struct MagickTranscoder {
    program: String,
}

impl MagickTranscoder {
    /// Use `program` (`magick` for ImageMagick 7, `convert` for 6).
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to the program for `job`.
    #[must_use]
    pub fn args(job: &TranscodeJob) -> Vec<String> {
        let size = format!("{}x{}", job.width, job.height);
        let mut args = vec![job.source.to_string_lossy().into_owned()];
        match job.mode {
            ResizeMode::Bound => {
                args.extend(["-resize".to_owned(), format!("{size}>")]);
            }
            ResizeMode::Fill => {
                args.extend([
                    "-resize".to_owned(),
                    format!("{size}^"),
                    "-gravity".to_owned(),
                    "center".to_owned(),
                    "-extent".to_owned(),
                    size,
                ]);
            }
        }
        args.extend([
            "-quality".to_owned(),
            job.quality.to_string(),
            "-strip".to_owned(),
            "-interlace".to_owned(),
            "Plane".to_owned(),
            "-sampling-factor".to_owned(),
            "4:2:0".to_owned(),
            job.output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

impl Default for MagickTranscoder {
    fn default() -> Self {
        Self::new("magick")
    }
}

impl Transcoder for MagickTranscoder {
    fn transcode(&self, job: &TranscodeJob) -> Result<(), TranscodeError> {
        let output = Command::new(&self.program)
            .args(Self::args(job))
            .output()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                program: self.program.clone(),
                output: job.output.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job(mode: ResizeMode) -> TranscodeJob {
        TranscodeJob {
            source: PathBuf::from("src/hero.jpg"),
            output: PathBuf::from("root/res/src/hero-1-640.webp"),
            width: 640,
            height: 360,
            quality: 65,
            mode,
        }
    }

    #[test]
    fn test_bound_args() {
        assert_eq!(
            MagickTranscoder::args(&job(ResizeMode::Bound)),
            vec![
                "src/hero.jpg",
                "-resize",
                "640x360>",
                "-quality",
                "65",
                "-strip",
                "-interlace",
                "Plane",
                "-sampling-factor",
                "4:2:0",
                "root/res/src/hero-1-640.webp",
            ]
        );
    }

    #[test]
    fn test_fill_args_crop_to_center() {
        let args = MagickTranscoder::args(&job(ResizeMode::Fill));
        assert_eq!(
            &args[1..7],
            &["-resize", "640x360^", "-gravity", "center", "-extent", "640x360"]
        );
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let transcoder = MagickTranscoder::new("pagec-no-such-transcoder");
        let err = transcoder.transcode(&job(ResizeMode::Bound)).unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
    }
}
