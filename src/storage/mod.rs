//! # Temporary Storage
//!
//! Scratch files and directories for uploaded or downloaded media. Each
//! resource is owned by exactly one request and is deleted before that
//! request's response goes out, on success and failure alike.

pub mod scratch;

pub use scratch::{ScratchResource, ScratchStore};
