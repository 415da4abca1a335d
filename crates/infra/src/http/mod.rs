//! HTTP plumbing shared by the transport layer.

mod client;

pub use client::{HttpClient, HttpClientBuilder};
