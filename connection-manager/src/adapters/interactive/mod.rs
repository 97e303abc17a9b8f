//! Interactive Brokers client portal.
//!
//! Login happens in the browser, through the gateway's web-login proxy:
//! `connect` only asks for a proxied login, and the session cookies are
//! captured from the proxied traffic once the SSO flow reaches its
//! completion page. The session is kept alive with the `tickle` endpoint.

mod model;

use crate::adapter::{
    ensure_success, session_client, Account, AccountType, Adapter, AdapterInfo, AdapterSettings,
    ConnectionResult, ParamDef, ParamType, ValidatedParams,
};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::Cookie;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{info, warn};

use model::*;

pub const CODE: &str = "IBKR";

/// Session lifetime is short; tickle every minute.
const TOKEN_EXP_SECONDS: u64 = 60;

static CONFIG_PARAMS: &[ParamDef] = &[
    ParamDef::new(PARAM_AUTH_URL, ParamType::String)
        .with_default(DEFAULT_AUTH_URL)
        .range(0, 64),
    ParamDef::new(PARAM_API_URL, ParamType::String)
        .with_default(DEFAULT_API_URL)
        .range(0, 64),
];

static INFO: AdapterInfo = AdapterInfo {
    code: CODE,
    name: "Interactive Brokers",
    supports_feed: true,
    supports_broker: true,
    supports_multiple_feeds: false,
    supports_inventory: true,
    config_params: CONFIG_PARAMS,
    connect_params: &[],
};

pub struct InteractiveAdapter {
    settings: AdapterSettings,
    auth_url: String,
    api_url: String,
    client: Option<reqwest::Client>,
    /// `Cookie` header value carrying the browser session
    session: Option<String>,
}

impl InteractiveAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        Self {
            settings,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            client: None,
            session: None,
        }
    }

    fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| GatewayError::auth_failure("Interactive Brokers adapter is not bound"))
    }

    fn session(&self) -> Result<&str> {
        self.session
            .as_deref()
            .ok_or_else(|| GatewayError::auth_failure("No active Interactive Brokers session"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client()?
            .get(format!("{}{}", self.api_url, path))
            .header(header::COOKIE, self.session()?)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::malformed(format!("Bad response from {}: {}", path, e)))
    }

    async fn post(&self, path: &str, cookies: &str) -> Result<reqwest::Response> {
        let response = self
            .client()?
            .post(format!("{}{}", self.api_url, path))
            .header(header::COOKIE, cookies)
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl Adapter for InteractiveAdapter {
    fn info(&self) -> &'static AdapterInfo {
        &INFO
    }

    fn auth_url(&self) -> String {
        self.auth_url.clone()
    }

    fn clone_with(&self, config: &ValidatedParams, _connect: &ValidatedParams) -> Result<Box<dyn Adapter>> {
        let auth_url = config.text(PARAM_AUTH_URL).unwrap_or(DEFAULT_AUTH_URL);
        let api_url = config.text(PARAM_API_URL).unwrap_or(DEFAULT_API_URL);

        Ok(Box::new(Self {
            settings: self.settings.clone(),
            auth_url: auth_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            client: Some(session_client(&self.settings)?),
            session: None,
        }))
    }

    async fn connect(&mut self) -> Result<ConnectionResult> {
        self.session = None;
        Ok(ConnectionResult::NeedsProxiedLogin)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(cookies) = self.session.take() {
            if let Err(e) = self.post(URL_LOGOUT, &cookies).await {
                warn!(error = %e, "Interactive Brokers logout failed");
            }
        }
        Ok(())
    }

    fn is_web_login_completed(&self, status: u16, path: &str) -> bool {
        (200..400).contains(&status) && path.starts_with(LOGIN_COMPLETED_PATH)
    }

    async fn init_from_web_login(&mut self, request_headers: &HeaderMap, cookies: &[Cookie<'static>]) -> Result<()> {
        let cookie_header = merge_session_cookies(request_headers, cookies);
        if cookie_header.is_empty() {
            return Err(GatewayError::auth_failure("No session cookies received from the login"));
        }

        self.session = Some(cookie_header);

        let validate: Validate = match self.get(URL_VALIDATE).await {
            Ok(v) => v,
            Err(e) => {
                self.session = None;
                return Err(e);
            }
        };

        if !validate.result {
            self.session = None;
            return Err(GatewayError::auth_failure("Session not validated by Interactive Brokers"));
        }

        info!(
            ib_user = %validate.user_name,
            ib_user_id = validate.user_id,
            "Interactive Brokers session established"
        );
        Ok(())
    }

    fn token_exp_seconds(&self) -> u64 {
        TOKEN_EXP_SECONDS
    }

    async fn refresh_token(&mut self) -> Result<()> {
        let cookies = self.session()?.to_string();
        self.post(URL_TICKLE, &cookies).await?;
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let accounts: Vec<PortfolioAccount> = self.get(URL_ACCOUNTS).await?;

        Ok(accounts
            .into_iter()
            .map(|a| {
                let kind = if a.kind.eq_ignore_ascii_case("cash") {
                    AccountType::Cash
                } else {
                    AccountType::Margin
                };
                Account::new(a.id, kind, a.currency)
            })
            .collect())
    }

    async fn orders(&self) -> Result<serde_json::Value> {
        let orders: Orders = self.get(URL_ORDERS).await?;
        serde_json::to_value(orders).map_err(|e| GatewayError::malformed(e.to_string()))
    }

    async fn positions(&self) -> Result<serde_json::Value> {
        let accounts: Vec<PortfolioAccount> = self.get(URL_ACCOUNTS).await?;
        let mut positions = serde_json::Map::new();

        for account in accounts {
            let path = format!("/v1/api/portfolio/{}/positions/0", account.id);
            let value: serde_json::Value = self.get(&path).await?;
            positions.insert(account.id, value);
        }

        Ok(serde_json::Value::Object(positions))
    }

    async fn test_service(&self, path: &str, query: &str) -> Result<String> {
        info!(path = %path, query = %query, "Testing Interactive Brokers service");

        let mut url = format!("{}{}", self.api_url, path);
        if !query.is_empty() {
            url = format!("{}?{}", url, query);
        }

        let response = self
            .client()?
            .get(url)
            .header(header::COOKIE, self.session()?)
            .send()
            .await?;
        Ok(response.text().await?)
    }
}

/// Builds one `Cookie` header from the browser's cookies and the ones set by the final response.
///
/// Response cookies win over request cookies with the same name.
fn merge_session_cookies(request_headers: &HeaderMap, cookies: &[Cookie<'static>]) -> String {
    let mut jar: BTreeMap<String, String> = BTreeMap::new();

    for value in request_headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for cookie in Cookie::split_parse(value.to_string()).flatten() {
            jar.insert(cookie.name().to_string(), cookie.value().to_string());
        }
    }

    for cookie in cookies {
        jar.insert(cookie.name().to_string(), cookie.value().to_string());
    }

    jar.iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}
