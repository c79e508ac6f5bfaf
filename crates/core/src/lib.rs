//! Core library: config, folder scanning, timestamp remapping and the watch loop.

pub mod config;
pub mod models;
pub mod remap;
pub mod scanner;
pub mod watcher;
