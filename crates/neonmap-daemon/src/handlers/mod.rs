//! HTTP and WebSocket handlers.

pub mod canvas;
pub mod health;
pub mod shield;
pub mod stamp;
pub mod user;
pub mod ws;
