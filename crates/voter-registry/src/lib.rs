//! Asset discovery and startup chain resolution.
//!
//! Before the first epoch is worked, everything the voter needs from the
//! chain is resolved once through the oracle manager contract: the
//! submitter address, the supported asset set with its submission
//! indices, and the epoch timing parameters. A failure here is fatal;
//! running with a partial registry would commit to wrong indices.

pub mod error;
pub mod registry;
pub mod resolve;

pub use error::{RegistryError, RegistryResult};
pub use registry::AssetRegistry;
pub use resolve::{resolve_chain, ChainResolution};
