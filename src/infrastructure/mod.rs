// Infrastructure layer - configuration and archive storage
pub mod config;
pub mod grid_archive;
