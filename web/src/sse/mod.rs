//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for SSE endpoints.
//! The stream registry itself lives in the `sse` crate.

pub mod handler;
