//! modweave installs third-party mods into a game's data directory by
//! applying ordered edit payloads to copies of the original files, backed
//! by a two-tier cache (pristine snapshots plus content fingerprints) that
//! makes every run fully restorable and safe to repeat.

pub mod cache;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod manifest;
pub mod payload;
pub mod run;
