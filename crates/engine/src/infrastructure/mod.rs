//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod config;
pub mod llm_services;
pub mod lore;
pub mod ollama;
pub mod persistence;
pub mod ports;
pub mod resilient_llm;
