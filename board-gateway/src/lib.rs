//! # board-gateway
//!
//! Resolves content identifiers to renderable content for meshboard.
//!
//! Content referenced by messages and posts may live on the local node, behind
//! an application proxy, in the content store, or only on public gateways,
//! and may not have propagated anywhere yet. [`GatewayResolver`] walks those
//! sources in a fixed order with a short timeout per step and always comes back
//! with something: bytes, a verified URL, or an unverified default URL.
//!
//! When the declared mime type is missing or generic, bytes are sniffed
//! (see [`board_core::sniff`]) to correct the media kind.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod fetch;
mod resolver;

pub use fetch::{FetchError, Fetched, Fetcher, HttpFetcher, Method, MockFetcher, MockRoute};
pub use resolver::{
    GatewayError, GatewayResolver, Payload, Resolution, ResolverConfig, Strategy,
    DEFAULT_GATEWAY, DEFAULT_PROBE_TIMEOUT, DEFAULT_PUBLIC_GATEWAYS,
};
