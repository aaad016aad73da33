//! Crash-dump daemon
//!
//! Serves the collection control surface over HTTP, runs collections in the
//! background and keeps the resulting logs on disk.

pub mod api;
pub mod config;
pub mod service;
