//! Test harness utilities for end-to-end protocol testing.
//!
//! Provides a fake simulation server that speaks the JSON envelope protocol
//! over real WebSockets, so the probe runs against an independent stack.

#![allow(dead_code)]

mod server;

pub use server::{ServerOptions, SimServer};

/// An endpoint on a port nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/ws", addr)
}
