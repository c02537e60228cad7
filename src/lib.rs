//! Cliphost - clip hosting backend.
//!
//! Uploaded sources are stored as chunked objects, transcoded into an
//! adaptive DASH package by a bounded pool of ffmpeg workers, and served back
//! with HTTP range semantics.
//!
//! # Architecture
//!
//! - [`storage`]: Chunked, supersedable uploads over a blob backend
//! - [`progress`]: Live per-asset transcode progress
//! - [`transcode`]: Worker pool, job steps and startup recovery
//! - [`catalog`]: Durable asset flags (processing, views)
//! - [`streaming`]: Range-aware object delivery
//! - [`server`]: Internal and public HTTP routers
//! - [`config`]: TOML configuration

pub mod catalog;
pub mod config;
pub mod progress;
pub mod server;
pub mod storage;
pub mod streaming;
pub mod transcode;
