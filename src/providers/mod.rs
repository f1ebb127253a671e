//! Provider adapters, one per external data source.
//!
//! Each adapter translates one provider's wire shapes into the canonical
//! Asset/Activity records. The wire contract of a provider is known only
//! inside its adapter module.

pub mod binance;
pub mod bitcoin;
pub mod bitfinex;
pub mod cryptocom;
pub mod evm;
pub mod kraken;
pub mod sign;
pub mod util;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Activity, Asset};
use crate::names::NameResolver;
use crate::price::RateProvider;

/// Uniform capability contract over every exchange and blockchain adapter.
#[async_trait]
pub trait Provider: Send + Sync {
    fn origin_name(&self) -> &str;

    /// Current holdings in canonical units with fiat values attached.
    /// Zero-balance positions are never returned.
    async fn all_assets(&self) -> Result<Vec<Asset>>;

    /// Historical events with normalized direction and status, raw
    /// provider payloads preserved under `details`.
    async fn all_activities(&self) -> Result<Vec<Activity>>;
}

/// Collaborators shared by every adapter instance.
#[derive(Clone)]
pub struct ProviderContext {
    /// Fiat currency asset values are quoted in.
    pub fiat: String,
    /// Display name used when a ticker cannot be resolved.
    pub fallback_name: String,
    pub rates: Arc<dyn RateProvider>,
    pub names: Arc<dyn NameResolver>,
}
