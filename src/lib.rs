pub mod config;
pub mod detectors;
pub mod executor;
pub mod llm;
pub mod logger;
pub mod state;
pub mod testgen;
pub mod triage;
