pub mod config;
pub mod error;
pub mod fit;
pub mod model;
