//! HTTP Client (C1): retries, jitter, User-Agent rotation, and encoding
//! detection for publisher responses.

pub mod client;
pub mod encoding;
pub mod robots;

pub use client::{FetchResponse, HttpClient};
pub use robots::RobotsTxt;
