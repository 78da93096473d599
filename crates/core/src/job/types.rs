//! Types for the job module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target output height. Width follows the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

impl Resolution {
    /// Every selectable resolution, in presentation order.
    pub const ALL: [Resolution; 3] = [Resolution::P720, Resolution::P480, Resolution::P360];

    /// Output height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Self::P720 => 720,
            Self::P480 => 480,
            Self::P360 => 360,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let height = s.trim().trim_end_matches(['p', 'P']);
        Self::ALL
            .into_iter()
            .find(|r| r.height().to_string() == height)
            .ok_or_else(|| format!("unsupported resolution: {}", s))
    }
}

/// Whether the output should trade quality for size.
///
/// `Unset` is a real state: no job can be built until the user decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Unset,
    Disabled,
    Enabled,
}

impl Compression {
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }
}

impl From<bool> for Compression {
    fn from(compress: bool) -> Self {
        if compress {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

/// Family of a container format. Members of one family share a byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFamily {
    /// ISO base media file format (mp4, mov).
    IsoBmff,
    /// Resource Interchange File Format (avi).
    Riff,
}

/// Output container label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Avi,
    Mov,
}

impl OutputFormat {
    /// Every selectable format, in presentation order.
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Mp4, OutputFormat::Avi, OutputFormat::Mov];

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Avi => "video/x-msvideo",
            Self::Mov => "video/quicktime",
        }
    }

    pub fn family(&self) -> ContainerFamily {
        match self {
            Self::Mp4 | Self::Mov => ContainerFamily::IsoBmff,
            Self::Avi => ContainerFamily::Riff,
        }
    }

    /// Whether bytes produced as `self` may be offered under `other`'s label.
    pub fn can_relabel_as(&self, other: OutputFormat) -> bool {
        self.family() == other.family()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == ext)
            .ok_or_else(|| format!("unsupported output format: {}", s))
    }
}

/// User-selected transcoding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Options {
    pub resolution: Resolution,
    pub compression: Compression,
    pub output_format: OutputFormat,
}

/// A fully specified engine job. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescription {
    input_ref: String,
    output_ref: String,
    args: Vec<String>,
}

impl JobDescription {
    pub(crate) fn new(input_ref: String, output_ref: String, args: Vec<String>) -> Self {
        Self {
            input_ref,
            output_ref,
            args,
        }
    }

    /// Name the input is staged under in the engine namespace.
    pub fn input_ref(&self) -> &str {
        &self.input_ref
    }

    /// Name the engine writes its output to.
    pub fn output_ref(&self) -> &str {
        &self.output_ref
    }

    /// Engine argument vector.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}
