//! Ribbon display library
//!
//! This module exports the core components for testing and integration.

pub mod app;
pub mod assets;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod producer;
pub mod render;
pub mod speech;
pub mod summary;
pub mod sysinfo;
pub mod task;
pub mod weather;
pub mod web;
