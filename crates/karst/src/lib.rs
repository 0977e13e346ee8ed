//! # KARST
//!
//! Integration crate for the KARST engine: loads startup configuration and
//! wires the kernel subsystems into one [`Engine`] context.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! ├───────────────────┬───────────────────┬───────────────────┤
//! │  ResourceManager  │    EntityWorld    │   Message Queue   │
//! │                   │                   │                   │
//! │  • providers      │  • entity ids     │  • sender (any    │
//! │  • sections       │  • aspect pools   │    thread, Clone) │
//! │  • target state   │  • broadcasts     │  • receiver (one) │
//! └───────────────────┴───────────────────┴───────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML startup configuration
//! - `engine`: the engine context

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;

// Re-export the kernel
pub use karst_core as core;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, ResourcesConfig, TargetState};
pub use engine::Engine;
