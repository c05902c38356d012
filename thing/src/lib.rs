//! PiCamera Web Thing library
//!
//! Exposes one camera as a Web Thing: a background loop keeps a snapshot
//! file fresh while remote callers read and change capture parameters.

pub mod app;
pub mod camera;
pub mod errors;
pub mod filesys;
pub mod hardware;
pub mod logs;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
