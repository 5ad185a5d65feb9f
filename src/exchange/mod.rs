// Exchange REST integration: request signing and the authenticated client
pub mod client;
pub mod signer;

pub use client::{ExchangeClient, OrderOutcome};
pub use signer::{canonical_json, signed_headers, SignedHeaders};
