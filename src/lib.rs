#![forbid(unsafe_code)]

//! Public entry point for the RyoTube download client.
//!
//! The crate owns the client-side download state of the video site: the
//! observable registry the Downloads page renders, the routine that streams a
//! video from the backend to disk, and the manager that starts and cancels
//! those routines. Everything else lives behind the backend's REST API.

pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod metadata;

#[cfg(test)]
pub(crate) mod testing;

pub use error::DownloadError;
