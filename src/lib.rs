pub mod config;
pub mod geometry;
pub mod model;
pub mod projector;
pub mod render;
pub mod spotify;
pub mod sync;

/// Application name for XDG paths
pub const APP_NAME: &str = "emotionify";
