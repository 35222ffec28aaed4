//! HTTP stream server
//!
//! Every `GET` becomes a hub subscriber and receives the MJPEG stream, except
//! the snapshot path which returns the latest frame once.

pub mod config;
pub mod connection;
pub mod http;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::StreamServer;
