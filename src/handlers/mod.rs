//! HTTP endpoints besides health and the media socket.

pub mod calls;
pub mod config;
pub mod voice;

pub use calls::*;
pub use config::*;
pub use voice::*;
