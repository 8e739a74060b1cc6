//! Artefact acquisition building blocks.
//!
//! # Sub-modules
//!
//! - [`source`] - Typed sources and glob expansion.
//! - [`manifest`] - `package.json` reading and archive naming.
//! - [`packaging`] - Deterministic `.tgz` creation.
//! - [`packaging_error`] - Error types for packaging operations.
//! - [`download`] - Download trait and HTTP implementation.
//! - [`registry`] - npm specifiers and registry lookups.

pub mod download;
pub mod manifest;
pub mod packaging;
pub mod packaging_error;
pub mod registry;
pub mod source;
