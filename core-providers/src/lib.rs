//! # Media Providers
//!
//! Capability contracts for backend adapters and the registry that routes
//! media descriptors to them.
//!
//! ## Overview
//!
//! - [`MediaProvider`]: base contract with typed item factories
//! - Capability traits: [`CatalogProvider`], [`AuthProvider`],
//!   [`LibrarySource`], [`PlaybackProvider`], [`StorageProvider`], [`Scrobbler`]
//! - [`ProviderRegistry`]: registration, lookup by name and `resolve`
//! - [`ProviderError`]: invalid arguments, classified backend failures and
//!   transport errors
//!
//! Concrete adapters live outside the core. They reach their backends through
//! the `bridge_traits::HttpClient` they are constructed with.

pub mod error;
pub mod provider;
pub mod registry;

pub use error::{ProviderError, ProviderErrorCode, Result};
pub use provider::{
    decode_owned, AuthProvider, CatalogProvider, CreatePlaylistOptions, LibraryPage,
    LibrarySource, MediaProvider, NowPlaying, PlaybackProvider, PlaybackState, Scrobble,
    ScrobbleResult, Scrobbler, StorageProvider,
};
pub use registry::{ProviderRegistry, ResolvedItem};
