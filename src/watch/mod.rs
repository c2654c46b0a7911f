// src/watch/mod.rs

//! Filesystem watching.

pub mod watcher;

pub use watcher::{EXCLUDED_DIRS, TreeWatcher};
