//! mirrorfs - write-through local mirror for HTTP responses
//!
//! Streams `GET` responses to the client while building a byte-identical
//! copy on disk. A mirror file only ever appears at its final path complete:
//! bodies are collected in a hidden temp file beside the target and renamed
//! into place once the whole `200 OK` response has been written.

pub mod cli;
pub mod config;
pub mod error;
pub mod mirror;
pub mod ui;
pub mod upstream;

pub use error::{MirrorError, MirrorResult};
