//! HackMD notes API: wire types and the HTTP client.

pub mod api_types;
pub mod client;

pub use api_types::{RawNote, RawScalar};
pub use client::{Credential, HackmdClient, NoteSource, UpstreamError};
