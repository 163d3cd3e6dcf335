// Application layer - Reconstruction pipeline and use cases
pub mod archive_repository;
pub mod error_combiner;
pub mod errors;
pub mod extraction_service;
pub mod interpolation;
pub mod reconstruction;
pub mod region;
pub mod site_resolver;
pub mod smoothing;
pub mod spatial_aggregator;
