//! # Funding settlement server
//!
//! This crate hosts the HTTP surface of the funding settlement engine. It is responsible for:
//! * Accepting new pledges and opening payment sessions for them.
//! * Listening for incoming webhook deliveries from the payment gateway and handing them to the
//!   reconciler.
//! * Serving recomputed funding snapshots for projects.
//! * Running the background job queue (post-checkout processing, escrow settlement).
//!
//! ## Configuration
//! The server is configured via `FSP_*` environment variables. See [config] for the full list.
//!
//! ## Routes
//! * `/health`: a health check route that returns a 200 OK response.
//! * `/api/projects`, `/api/projects/{id}/publish`: project lifecycle.
//! * `/api/projects/{id}/funding`: the current funding snapshot.
//! * `/api/pledges`: create a pledge and open a payment session.
//! * `/api/investments/{id}/refund`: refund a confirmed pledge.
//! * `/webhook/payments`: the gateway webhook endpoint.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
