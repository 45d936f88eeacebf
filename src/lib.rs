//! Core of a USB man-in-the-middle proxy: the Manager orchestrates a
//! per-endpoint relay topology between a device-facing proxy and a
//! host-facing proxy, applying a configurable filter chain and admitting
//! user-supplied injectors.
//!
//! This crate is the orchestrator only (see `SPEC_FULL.md` §1). The
//! transport-facing proxies, descriptor parsing, CLI, configuration
//! loading, and concrete filters/injectors are external collaborators;
//! only their contracts ([`proxy`], [`model`], [`filter`], [`injector`])
//! are pinned here.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod injector;
pub mod manager;
pub mod model;
pub mod packet;
pub mod proxy;
pub mod queue;
pub mod relayer;
pub mod request;

pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use manager::{Manager, ManagerStatus};
