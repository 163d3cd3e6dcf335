// Application state for HTTP handlers
use crate::application::extraction_service::ExtractionService;
use crate::infrastructure::config::RequestDefaults;

#[derive(Clone)]
pub struct AppState {
    pub extraction_service: ExtractionService,
    pub defaults: RequestDefaults,
}
