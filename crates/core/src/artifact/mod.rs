//! Artifact presenter: retrievable, named downloads for completed jobs.
//!
//! An [`Artifact`] carries the output bytes, a MIME type and default file
//! name derived from its container label, and a revocable retrieval handle.
//! Relabeling (e.g. mp4 to mov) reuses the bytes and is only offered inside
//! one container family; any other format change needs a new job.

mod presenter;
mod types;

pub use presenter::ArtifactPresenter;
pub use types::{Artifact, ArtifactError, HANDLE_PREFIX};
