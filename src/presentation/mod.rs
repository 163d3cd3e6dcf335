// Presentation layer - HTTP adapter over the extraction service
pub mod app_state;
pub mod error;
pub mod handlers;
