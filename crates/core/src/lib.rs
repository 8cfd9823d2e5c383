//! # da-core
//!
//! Core installer for the dashboard assistant's ML-Commons resources.
//!
//! This crate provides:
//! - Configuration loading from `.dashboard-assistant/` and the embedded provider catalog
//! - ML-Commons repositories with an OpenSearch REST client and an in-process mock
//! - The six installation steps and their compensations
//! - The saga manager and the installation orchestrator
//! - Read-only monitoring of installed models
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and the provider catalog
//! - [`context`]: Identifiers produced during a run
//! - [`engine`]: Installation orchestrator
//! - [`monitor`]: Model and active agent views
//! - [`predict`]: Prediction response validation
//! - [`repositories`]: Repository traits and implementations
//! - [`state`]: Progress transitions and the saga manager
//! - [`steps`]: Installation steps

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod predict;
pub mod repositories;
pub mod state;
pub mod steps;
