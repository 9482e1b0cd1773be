pub mod config;
pub mod controller;
pub mod domain;
pub mod hardware;
pub mod ingest;
pub mod telemetry;
