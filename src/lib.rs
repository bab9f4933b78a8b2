//! Siftgate - credential-injecting API gateway for the Sift mail
//! classification backend, plus the typed client that talks to it.
//!
//! # Components
//!
//! - **Gateway** ([`gateway`], [`forward`], [`proxy_service`]): a catch-all
//!   route that forwards any method and path under a prefix to the backend,
//!   injecting the server-held `x-api-key` and relaying status and body
//!   verbatim.
//! - **Client** ([`client`]): `get`/`post` over the gateway prefix with
//!   JSON semantics, and typed endpoint wrappers.
//! - **Workflow** ([`workflow`]): shadow/live mode discipline and dry-run
//!   aware batch reporting.

pub mod client;
pub mod config;
pub mod error;
pub mod forward;
pub mod gateway;
pub mod logging_layer;
pub mod proxy_service;
pub mod timeout;
pub mod types;
pub mod workflow;
