//! sisyphe-media library
//!
//! Media acquisition for the Sisyphe chat bot: image fetching with bounded
//! concurrency, rate-limited audio/video downloads through a video-indexing
//! service, and a scoped work area that owns every file until it is released.

pub mod cli;
pub mod config;
pub mod logging;
pub mod media;
