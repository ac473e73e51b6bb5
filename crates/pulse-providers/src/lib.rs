//! External signal providers for the Pulse ranking engine.
//!
//! Every provider is a [`ProviderAdapter`] that turns one upstream API into
//! normalized [`pulse_core::Signal`]s and reports failures as
//! [`ProviderError`] values. [`ProviderRegistry`] decides which adapters run.

pub mod adapter;
pub mod adapters;
pub mod error;
mod http;
pub mod registry;

pub use adapter::ProviderAdapter;
pub use error::ProviderError;
pub use http::build_client;
pub use registry::{ProviderHandle, ProviderRegistry};
