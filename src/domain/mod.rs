// Domain layer - Geometry, observations and output records
pub mod geometry;
pub mod observation;
pub mod record;
