//! Adapter traits for the four external collaborators: content store,
//! pub/sub transport, signature verifier, durable sidecar.
//!
//! The core daemon never talks to IPFS, a pub/sub broker, an ENS resolver,
//! or a durable cache directly — it only ever calls through these traits,
//! so the router/epoch engine/supervisor can be driven deterministically
//! in tests against [`fakes`].

pub mod sidecar;
pub mod store;
pub mod transport;
pub mod verifier;

#[cfg(test)]
pub mod fakes;

pub use sidecar::Sidecar;
pub use store::ContentStore;
pub use transport::{Message, Transport};
pub use verifier::SignatureVerifier;
