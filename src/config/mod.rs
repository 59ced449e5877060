//! Configuration module

mod client;

pub use client::ClientConfig;
