pub mod ai_model;
pub mod analysis_model;
pub mod cache;
pub mod classifier;
pub mod external;
pub mod merger;
pub mod purpose;
pub mod suspicion;
