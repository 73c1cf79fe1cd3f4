//! # Host Bridge Traits
//!
//! Collaborator contracts the core consumes but never implements itself.
//!
//! ## Overview
//!
//! Media providers talk to their backends (streaming catalogs, scraped sites,
//! cloud storage, scrobbling services) through a plain request/response
//! transport. The core never embeds a transport: it only depends on the
//! [`HttpClient`](http::HttpClient) contract defined here. Script-backed
//! providers and native bridges are just other implementations of the same
//! contract.
//!
//! Hosts can also forward the core's structured logs into their own logging
//! pipeline through [`LoggerSink`](log::LoggerSink).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async `(url, method, headers, body)` to
//!   `{status, headers, body}` exchange
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the message actionable
//! (URL, status code, timeout).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so that a single instance can be
//! shared by every provider and sync task.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct ScriptBridgeClient;
//!
//! #[async_trait]
//! impl HttpClient for ScriptBridgeClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         // Forward to the embedded script runtime
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod log;

pub use error::BridgeError;

pub use http::{Backoff, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
