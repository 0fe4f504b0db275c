//! Commit-reveal price voter client.
//!
//! Orchestrates the full pipeline:
//! - Startup chain resolution (submitter, assets, epoch timing)
//! - Venue feed connections and per-asset price providers
//! - One-time whitelisting
//! - Epoch-driven commit and reveal submission
//! - On-chain confirmation listening

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
