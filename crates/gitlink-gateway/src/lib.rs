//! Delivery of `ClientEvent`s to the client surfaces of individual platform
//! users over WebSocket.

pub mod auth;
pub mod connection;
pub mod hub;

pub use hub::EventHub;
