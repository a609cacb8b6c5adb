pub mod booth;
pub mod camera;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod face;
pub mod kiosk;
pub mod orchestrator;
pub mod sampler;
pub mod session;
pub mod shapes;
