//! Local system: data and orders handled by the platform itself.
//!
//! Nothing to authenticate against, so connecting always succeeds at once.

use crate::adapter::{Adapter, AdapterInfo, ConnectionResult, ValidatedParams};
use crate::error::Result;
use async_trait::async_trait;

pub const CODE: &str = "LOCAL";

static INFO: AdapterInfo = AdapterInfo {
    code: CODE,
    name: "Local system",
    supports_feed: true,
    supports_broker: true,
    supports_multiple_feeds: true,
    supports_inventory: false,
    config_params: &[],
    connect_params: &[],
};

#[derive(Clone, Default)]
pub struct LocalAdapter;

impl LocalAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn info(&self) -> &'static AdapterInfo {
        &INFO
    }

    fn clone_with(&self, _config: &ValidatedParams, _connect: &ValidatedParams) -> Result<Box<dyn Adapter>> {
        Ok(Box::new(self.clone()))
    }

    async fn connect(&mut self) -> Result<ConnectionResult> {
        Ok(ConnectionResult::Connected)
    }
}
