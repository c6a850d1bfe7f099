//! Foxhole War API client.
//!
//! [`WarApiClient`] implements [`frontline_core::source::WarSource`] over
//! HTTP. Response decoding lives in [`wire`] so it can be tested without
//! a network.

pub mod client;
pub mod wire;

pub use client::WarApiClient;
