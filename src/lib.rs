pub mod config;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod player;
pub mod services;
