//! # qbot-archive
//!
//! Export collaborators for completed questionnaire transcripts.
//!
//! ## Key Types
//!
//! - [`DocumentWriter`] - Writes `<session_id>.json` into a directory
//! - [`GitArchive`] - Commits the document into a git checkout and
//!   optionally pushes it to a remote
//!
//! Both implement [`qbot_core::TranscriptSink`] and are meant to run on the
//! background [`qbot_core::ArchiveQueue`].

mod document;
mod error;
mod git;

pub use document::{document_file_name, render_document, DocumentWriter};
pub use error::ArchiveError;
pub use git::GitArchive;
