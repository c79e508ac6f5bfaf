//! Process wiring for the folder uploader.
pub mod watch;
