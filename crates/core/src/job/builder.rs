//! Maps options onto an engine argument vector.

use thiserror::Error;

use super::types::{Compression, JobDescription, Options};

/// Video codec every job encodes with.
pub const VIDEO_CODEC: &str = "libx264";

/// Encoder preset. Favors speed over compression efficiency.
pub const PRESET: &str = "ultrafast";

/// CRF used when compression is disabled.
pub const CRF_STANDARD: u8 = 23;

/// CRF used when compression is enabled.
pub const CRF_COMPRESSED: u8 = 28;

/// Input name used when the uploaded file has no extension.
pub const DEFAULT_INPUT_REF: &str = "input";

/// Errors that prevent a job from being built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The user has not chosen whether to compress.
    #[error("Compression has not been chosen")]
    CompressionUnset,
}

impl Compression {
    /// CRF value for this choice, if one has been made.
    pub fn crf(&self) -> Option<u8> {
        match self {
            Self::Unset => None,
            Self::Disabled => Some(CRF_STANDARD),
            Self::Enabled => Some(CRF_COMPRESSED),
        }
    }
}

/// Name the input is staged under, keeping the uploaded file's extension.
pub fn input_ref_for(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains(['/', '\\']) => {
            format!("{}.{}", DEFAULT_INPUT_REF, ext)
        }
        _ => DEFAULT_INPUT_REF.to_string(),
    }
}

/// Builds the job for an input file name and options.
///
/// Deterministic and side-effect free: equal inputs give equal jobs.
pub fn build_job(file_name: &str, options: &Options) -> Result<JobDescription, JobError> {
    let crf = options.compression.crf().ok_or(JobError::CompressionUnset)?;

    let input_ref = input_ref_for(file_name);
    let output_ref = format!("output.{}", options.output_format.extension());

    let args = vec![
        "-i".to_string(),
        input_ref.clone(),
        // Width follows the aspect ratio, rounded to an even number
        "-vf".to_string(),
        format!("scale=-2:{}", options.resolution.height()),
        "-c:v".to_string(),
        VIDEO_CODEC.to_string(),
        "-preset".to_string(),
        PRESET.to_string(),
        "-crf".to_string(),
        crf.to_string(),
        output_ref.clone(),
    ];

    Ok(JobDescription::new(input_ref, output_ref, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{OutputFormat, Resolution};

    fn options(resolution: Resolution, compression: Compression, format: OutputFormat) -> Options {
        Options {
            resolution,
            compression,
            output_format: format,
        }
    }

    #[test]
    fn test_clip_mov_to_compressed_mp4() {
        let job = build_job(
            "clip.mov",
            &options(Resolution::P480, Compression::Enabled, OutputFormat::Mp4),
        )
        .unwrap();

        assert_eq!(job.input_ref(), "input.mov");
        assert_eq!(job.output_ref(), "output.mp4");
        assert_eq!(
            job.args(),
            &[
                "-i",
                "input.mov",
                "-vf",
                "scale=-2:480",
                "-c:v",
                "libx264",
                "-preset",
                "ultrafast",
                "-crf",
                "28",
                "output.mp4",
            ]
        );
    }

    #[test]
    fn test_every_combination_uses_fixed_quality_set() {
        for resolution in Resolution::ALL {
            for compression in [Compression::Disabled, Compression::Enabled] {
                for format in OutputFormat::ALL {
                    let job = build_job("movie.mkv", &options(resolution, compression, format))
                        .unwrap();
                    let args = job.args();

                    let scale = format!("scale=-2:{}", resolution.height());
                    assert!(args.contains(&scale));

                    let crf_pos = args.iter().position(|a| a == "-crf").unwrap();
                    let crf = args[crf_pos + 1].parse::<u8>().unwrap();
                    assert!(crf == CRF_STANDARD || crf == CRF_COMPRESSED);
                    assert_eq!(crf, compression.crf().unwrap());

                    assert_eq!(args.last().unwrap(), &format!("output.{}", format.extension()));
                }
            }
        }
    }

    #[test]
    fn test_unset_compression_cannot_build() {
        let result = build_job(
            "clip.mov",
            &options(Resolution::P720, Compression::Unset, OutputFormat::Mp4),
        );
        assert_eq!(result, Err(JobError::CompressionUnset));
    }

    #[test]
    fn test_build_is_deterministic() {
        let opts = options(Resolution::P360, Compression::Disabled, OutputFormat::Avi);
        assert_eq!(build_job("a.webm", &opts), build_job("a.webm", &opts));
    }

    #[test]
    fn test_input_ref_for() {
        assert_eq!(input_ref_for("clip.mov"), "input.mov");
        assert_eq!(input_ref_for("holiday.final.MP4"), "input.MP4");
        assert_eq!(input_ref_for("README"), "input");
        assert_eq!(input_ref_for("trailing."), "input");
        assert_eq!(input_ref_for(".hidden"), "input.hidden");
    }
}
