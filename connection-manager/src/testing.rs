//! Scripted adapter shared by unit tests.

use crate::adapter::{
    Adapter, AdapterInfo, ConnectionResult, ParamDef, ParamType, PriceBars, ValidatedParams,
};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::Cookie;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const CODE: &str = "SCRIPTED";
pub const NAME: &str = "Scripted";
pub const COMPLETION_PATH: &str = "/done";

static CONFIG_PARAMS: &[ParamDef] = &[ParamDef::new("region", ParamType::String).with_default("eu")];
static CONNECT_PARAMS: &[ParamDef] = &[ParamDef::new("username", ParamType::String)];

static INFO: AdapterInfo = AdapterInfo {
    code: CODE,
    name: NAME,
    supports_feed: true,
    supports_broker: false,
    supports_multiple_feeds: false,
    supports_inventory: false,
    config_params: CONFIG_PARAMS,
    connect_params: CONNECT_PARAMS,
};

#[derive(Clone, Copy, Debug)]
pub enum Handshake {
    Immediate,
    Proxied,
    Fail,
}

/// Call counters and remaining scripted failures, shared by every clone.
#[derive(Debug, Default)]
pub struct Probe {
    pub connect_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub init_calls: AtomicU32,
    pub bars_calls: AtomicU32,
    pub failing_refreshes: AtomicU32,
    pub bar_timeouts: AtomicU32,
}

impl Probe {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Clone)]
pub struct ScriptedAdapter {
    pub handshake: Handshake,
    pub token_exp: u64,
    pub init_fails: bool,
    pub auth_url: String,
    pub probe: Arc<Probe>,
}

impl ScriptedAdapter {
    pub fn new(handshake: Handshake) -> Self {
        Self {
            handshake,
            token_exp: 0,
            init_fails: false,
            auth_url: "https://backend.example.com/sso/login".to_string(),
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn with_token_exp(mut self, seconds: u64) -> Self {
        self.token_exp = seconds;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.init_fails = true;
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn boxed(&self) -> Box<dyn Adapter> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn info(&self) -> &'static AdapterInfo {
        &INFO
    }

    fn auth_url(&self) -> String {
        self.auth_url.clone()
    }

    fn clone_with(&self, _config: &ValidatedParams, _connect: &ValidatedParams) -> Result<Box<dyn Adapter>> {
        Ok(self.boxed())
    }

    async fn connect(&mut self) -> Result<ConnectionResult> {
        self.probe.connect_calls.fetch_add(1, Ordering::SeqCst);
        match self.handshake {
            Handshake::Immediate => Ok(ConnectionResult::Connected),
            Handshake::Proxied => Ok(ConnectionResult::NeedsProxiedLogin),
            Handshake::Fail => Err(GatewayError::auth_failure("bad credentials")),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.probe.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_web_login_completed(&self, status: u16, path: &str) -> bool {
        status == 200 && path == COMPLETION_PATH
    }

    async fn init_from_web_login(&mut self, _request_headers: &HeaderMap, _cookies: &[Cookie<'static>]) -> Result<()> {
        self.probe.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.init_fails {
            return Err(GatewayError::auth_failure("session rejected"));
        }
        Ok(())
    }

    fn token_exp_seconds(&self) -> u64 {
        self.token_exp
    }

    async fn refresh_token(&mut self) -> Result<()> {
        self.probe.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if Probe::take(&self.probe.failing_refreshes) {
            return Err(GatewayError::auth_failure("token expired"));
        }
        Ok(())
    }

    async fn price_bars(&self, symbol: &str, _date: NaiveDate) -> Result<PriceBars> {
        self.probe.bars_calls.fetch_add(1, Ordering::SeqCst);
        if Probe::take(&self.probe.bar_timeouts) {
            return Ok(PriceBars::timed_out(symbol));
        }
        Ok(PriceBars {
            symbol: symbol.to_string(),
            bars: Vec::new(),
            timeout: false,
        })
    }
}
