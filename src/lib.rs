//! hackpost: serves HackMD notes as blog posts through a file cache.

pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod hackmd;
pub mod logging;
pub mod posts;
pub mod server;

pub use error::{Error, Result};
