//! Pilet publishing library.
//!
//! This crate turns pilets (independently deployable plugin modules) into
//! package archives and uploads them to a feed service. Artefacts can be built
//! fresh from source, picked up from local globs, downloaded from URLs, or
//! resolved through an npm registry. It is used by the `pilet-publish` CLI
//! binary and can be driven programmatically with injected collaborators for
//! testing.
//!
//! # Modules
//!
//! - [`artefact`] - Source expansion, package manifests, packing, downloads,
//!   and registry lookups
//! - [`auth`] - Authorization schemes and the run-scoped credential cache
//! - [`batch`] - Sequential upload loop and batch verdict
//! - [`builder`] - Build orchestration around an external bundler
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - External command execution abstraction
//! - [`config`] - Immutable release configuration
//! - [`error`] - Semantic error types with exit codes
//! - [`hooks`] - Ordered lifecycle hooks fired around the build
//! - [`http`] - HTTP agent construction with custom trust roots
//! - [`output`] - Progress and summary formatting
//! - [`pipeline`] - End-to-end publish orchestration
//! - [`resolution`] - Artefact resolution strategies
//! - [`trust`] - CA certificate loading
//! - [`upload`] - Upload requests and outcome classification

pub mod artefact;
pub mod auth;
pub mod batch;
pub mod builder;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod hooks;
pub mod http;
pub mod output;
pub mod pipeline;
pub mod resolution;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod trust;
pub mod upload;
