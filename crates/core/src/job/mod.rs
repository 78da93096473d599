//! Job builder: turns a file name and user options into an engine job.
//!
//! The mapping is fixed. Height comes from the chosen [`Resolution`], width
//! is derived by the engine (`scale=-2:<height>`), compression selects one
//! of two CRF constants, and the preset is always [`PRESET`].

mod builder;
mod types;

pub use builder::{
    build_job, input_ref_for, JobError, CRF_COMPRESSED, CRF_STANDARD, DEFAULT_INPUT_REF, PRESET,
    VIDEO_CODEC,
};
pub use types::{Compression, ContainerFamily, JobDescription, Options, OutputFormat, Resolution};
