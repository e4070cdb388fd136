//! Core delve library (reasoning engine, providers, research collaborators, config).

pub mod config;
pub mod core;
pub mod prompts;
pub mod providers;
pub mod reasoning;
pub mod research;
