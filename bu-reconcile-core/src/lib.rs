#![doc = "bu-reconcile-core: desired-state reconciliation for Better Uptime resources."]

//! This crate holds the data model, the HTTP seam ([`contract::Transport`]),
//! the paginating API client and the reconciler. It contains no network code;
//! the CLI crate supplies a `reqwest` transport and tests supply mocks.
//!
//! # Usage
//! Build an [`client::ApiClient`] around a transport, wrap it in a
//! [`reconcile::Reconciler`] and call `reconcile` with a
//! [`reconcile::ReconcileRequest`].

pub mod client;
pub mod contract;
pub mod model;
pub mod reconcile;
