//! Development mode support: the hot-update protocol and its browser client.
//!
//! Watching files and serving the socket live in `pack-dev`; this module only
//! decides what a rebuild means for connected clients.

pub mod hmr;

pub use hmr::{compute_updates, HmrMessage, HotUpdate, HotUpdateSink, CLIENT_RUNTIME};
