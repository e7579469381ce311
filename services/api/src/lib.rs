//! Conversation Coach API Library Crate
//!
//! HTTP speech endpoints, scenario listing, live practice sessions over
//! WebSocket and the local speech engine. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
