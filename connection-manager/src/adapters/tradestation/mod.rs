//! Tradestation.
//!
//! The sign-in is performed entirely inside `connect` by replaying what a
//! browser does (see [`login`]); the user supplies username, password and
//! the current 2FA code as connect parameters. Tokens last twenty minutes
//! and are renewed through the web platform's token endpoint.

mod api;
mod login;
mod markup;

use crate::adapter::params::{PARAM_PASSWORD, PARAM_TWO_FA_CODE, PARAM_USERNAME};
use crate::adapter::{
    ensure_success, session_client, Account, AccountType, Adapter, AdapterInfo, AdapterSettings,
    ConnectionResult, Instrument, ParamDef, ParamType, PriceBar, PriceBars, RootSymbol, ValidatedParams,
};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{info, warn};

use api::*;

pub const CODE: &str = "TS";

pub const PARAM_CLIENT_ID: &str = "clientId";
pub const PARAM_LIVE_ACCOUNT: &str = "liveAccount";

const TOKEN_EXP_SECONDS: u64 = 20 * 60;

static CONFIG_PARAMS: &[ParamDef] = &[
    ParamDef::new(PARAM_CLIENT_ID, ParamType::String)
        .with_default("TDoILDTVZjp0k5J0xsWbXS1yEUncnj08")
        .range(0, 64),
    ParamDef::new(PARAM_LIVE_ACCOUNT, ParamType::Bool).with_default("false"),
];

static CONNECT_PARAMS: &[ParamDef] = &[
    ParamDef::new(PARAM_USERNAME, ParamType::String).range(0, 64),
    ParamDef::new(PARAM_PASSWORD, ParamType::Password).range(0, 64),
    ParamDef::new(PARAM_TWO_FA_CODE, ParamType::String).range(0, 64),
];

static INFO: AdapterInfo = AdapterInfo {
    code: CODE,
    name: "Tradestation",
    supports_feed: true,
    supports_broker: true,
    supports_multiple_feeds: false,
    supports_inventory: true,
    config_params: CONFIG_PARAMS,
    connect_params: CONNECT_PARAMS,
};

/// Backend locations. Overridable so the login can be replayed against a local server.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub live_api: String,
    pub demo_api: String,
    pub login_page: String,
    pub login_post: String,
    pub login_callback: String,
    pub two_fa: String,
    pub dashboard_path: String,
    pub refresh_token: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            live_api: "https://api.tradestation.com".to_string(),
            demo_api: "https://sim-api.tradestation.com".to_string(),
            login_page: "https://my.tradestation.com/api/auth/login?returnTo=%2F".to_string(),
            login_post: "https://signin.tradestation.com/usernamepassword/login".to_string(),
            login_callback: "https://signin.tradestation.com/login/callback".to_string(),
            two_fa: "https://signin.tradestation.com/u/mfa-otp-challenge".to_string(),
            dashboard_path: "/dashboard".to_string(),
            refresh_token: "https://my.tradestation.com/api/auth/token".to_string(),
        }
    }
}

impl Endpoints {
    /// Every endpoint rooted at one base URL, with the production paths.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            live_api: format!("{}/live", base),
            demo_api: format!("{}/sim", base),
            login_page: format!("{}/api/auth/login?returnTo=%2F", base),
            login_post: format!("{}/usernamepassword/login", base),
            login_callback: format!("{}/login/callback", base),
            two_fa: format!("{}/u/mfa-otp-challenge", base),
            dashboard_path: "/dashboard".to_string(),
            refresh_token: format!("{}/api/auth/token", base),
        }
    }

    fn two_fa_path(&self) -> String {
        url::Url::parse(&self.two_fa)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }
}

pub struct TradestationAdapter {
    settings: AdapterSettings,
    endpoints: Endpoints,
    client_id: String,
    live_account: bool,
    username: String,
    password: String,
    two_fa_code: String,
    client: Option<reqwest::Client>,
    access_token: String,
    id_token: String,
    api_url: String,
}

impl TradestationAdapter {
    pub fn new(settings: AdapterSettings) -> Self {
        Self::with_endpoints(settings, Endpoints::default())
    }

    pub fn with_endpoints(settings: AdapterSettings, endpoints: Endpoints) -> Self {
        Self {
            settings,
            endpoints,
            client_id: String::new(),
            live_account: false,
            username: String::new(),
            password: String::new(),
            two_fa_code: String::new(),
            client: None,
            access_token: String::new(),
            id_token: String::new(),
            api_url: String::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| GatewayError::auth_failure("Tradestation session not established"))
    }

    async fn do_get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client()?
            .get(url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::malformed(format!("Bad Tradestation response: {}", e)))
    }

    /// Connect-time check that the tokens work and a futures account exists.
    async fn test_token(&self) -> Result<()> {
        let accounts = self.accounts().await?;
        if accounts.is_empty() {
            return Err(GatewayError::auth_failure("Futures account not found or not active"));
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for TradestationAdapter {
    fn info(&self) -> &'static AdapterInfo {
        &INFO
    }

    fn clone_with(&self, config: &ValidatedParams, connect: &ValidatedParams) -> Result<Box<dyn Adapter>> {
        let mut bound = Self::with_endpoints(self.settings.clone(), self.endpoints.clone());
        bound.client_id = config.text(PARAM_CLIENT_ID).unwrap_or_default().to_string();
        bound.live_account = config.flag(PARAM_LIVE_ACCOUNT).unwrap_or(false);
        bound.username = connect.text(PARAM_USERNAME).unwrap_or_default().to_string();
        bound.password = connect.text(PARAM_PASSWORD).unwrap_or_default().to_string();
        bound.two_fa_code = connect.text(PARAM_TWO_FA_CODE).unwrap_or_default().to_string();
        Ok(Box::new(bound))
    }

    async fn connect(&mut self) -> Result<ConnectionResult> {
        // Fresh cookie jar for every sign-in
        self.client = Some(session_client(&self.settings)?);

        self.login().await?;

        self.api_url = if self.live_account {
            self.endpoints.live_api.clone()
        } else {
            self.endpoints.demo_api.clone()
        };

        self.test_token().await?;

        info!(username = %self.username, live = self.live_account, "Tradestation session established");
        Ok(ConnectionResult::Connected)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.access_token.clear();
        self.id_token.clear();
        self.client = None;
        Ok(())
    }

    fn token_exp_seconds(&self) -> u64 {
        TOKEN_EXP_SECONDS
    }

    async fn refresh_token(&mut self) -> Result<()> {
        let mut headers = login::common_headers();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert("Origin", HeaderValue::from_static("https://my.tradestation.com"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));

        let response = self
            .client()?
            .post(&self.endpoints.refresh_token)
            .headers(headers)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let out: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::malformed(format!("Bad token refresh response: {}", e)))?;

        self.access_token = out.access_token;
        if !out.id_token.is_empty() {
            self.id_token = out.id_token;
        }
        Ok(())
    }

    async fn root_symbols(&self, filter: &str) -> Result<Vec<RootSymbol>> {
        // Category FU = futures, first 1000 matches
        let url = format!(
            "{}{}/{}?$filter=Category%20eq%20%27FU%27&$top=1000",
            self.api_url,
            URL_SYMBOLS_SUGGEST,
            urlencoding::encode(filter)
        );
        let found: Vec<RootFound> = self.do_get(&url).await?;

        let mut roots: BTreeMap<String, RootSymbol> = BTreeMap::new();
        for rf in found {
            roots.entry(rf.root.clone()).or_insert_with(|| RootSymbol {
                code: rf.root,
                instrument: rf.description,
                exchange: rf.exchange,
                country: rf.country,
                currency: rf.currency,
                point_value: rf.point_value,
            });
        }

        Ok(roots.into_values().collect())
    }

    async fn root_symbol(&self, root: &str) -> Result<RootSymbol> {
        self.root_symbols(root)
            .await?
            .into_iter()
            .find(|r| r.code == root)
            .ok_or_else(|| GatewayError::NotFound(format!("Root symbol not found: {}", root)))
    }

    async fn instruments(&self, root: &str) -> Result<Vec<Instrument>> {
        // C=FU futures, Exp=true include expired contracts
        let url = format!(
            "{}{}/C=FU&Exp=true&R={}",
            self.api_url,
            URL_SYMBOLS_SEARCH,
            urlencoding::encode(root)
        );
        let found: Vec<SymbolFound> = self.do_get(&url).await?;

        let mut instruments = Vec::new();
        for sf in found.into_iter().filter(|s| s.category == "Future") {
            instruments.push(Instrument {
                expiration_date: convert_expiration_date(&sf.expiration_date)?,
                continuous: sf.name.starts_with('@'),
                name: sf.name,
                description: sf.description,
                exchange: sf.exchange,
                country: sf.country,
                root: sf.root,
                point_value: sf.point_value,
                min_move: sf.min_move,
            });
        }

        Ok(instruments)
    }

    async fn price_bars(&self, symbol: &str, date: NaiveDate) -> Result<PriceBars> {
        let day = date.format("%m-%d-%Y");
        let url = format!(
            "{}{}/{}?interval=1&unit=Minute&firstdate={}T00:00:00Z&lastdate={}T23:59:59Z",
            self.api_url,
            URL_MARKET_DATA_BARCHARTS,
            urlencoding::encode(symbol),
            date.format("%Y-%m-%d"),
            date.format("%Y-%m-%d"),
        );

        let response = self
            .client()?
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::GATEWAY_TIMEOUT {
            warn!(symbol = %symbol, day = %day, "Tradestation bar request timed out");
            return Ok(PriceBars::timed_out(symbol));
        }

        let response = ensure_success(response).await?;
        let chart: BarchartResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::malformed(format!("Bad barchart response: {}", e)))?;

        let bars = chart
            .bars
            .into_iter()
            .map(convert_bar)
            .collect::<Result<Vec<_>>>()?;

        Ok(PriceBars {
            symbol: symbol.to_string(),
            bars,
            timeout: false,
        })
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        let url = format!("{}{}", self.api_url, URL_BROKERAGE_ACCOUNTS);
        let response: AccountsResponse = self.do_get(&url).await?;

        let mut accounts = convert_accounts(&response);

        for account in &mut accounts {
            let url = format!("{}{}/{}/balances", self.api_url, URL_BROKERAGE_ACCOUNTS, account.code);
            let balances: BalancesResponse = self.do_get(&url).await?;

            if balances.balances.len() != 1 {
                return Err(GatewayError::malformed(format!(
                    "Incorrect number of balances returned: {}",
                    balances.balances.len()
                )));
            }

            let b = &balances.balances[0];
            account.cash_balance = to_f64(&b.cash_balance);
            account.equity = to_f64(&b.equity);
            account.realized_profit_loss = to_f64(&b.balance_detail.realized_profit_loss);
            account.unrealized_profit_loss = to_f64(&b.balance_detail.unrealized_profit_loss);
            account.open_order_margin = to_f64(&b.balance_detail.open_order_margin);
            account.initial_margin = to_f64(&b.balance_detail.initial_margin);
            account.maintenance_margin = to_f64(&b.balance_detail.maintenance_margin);
        }

        Ok(accounts)
    }

    async fn test_service(&self, path: &str, query: &str) -> Result<String> {
        info!(path = %path, query = %query, "Testing Tradestation service");

        let mut url = format!("{}{}", self.api_url, path);
        if !query.is_empty() {
            url = format!("{}?{}", url, query);
        }

        let response = self
            .client()?
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(response.text().await?)
    }
}

/// Keeps active futures accounts only.
fn convert_accounts(response: &AccountsResponse) -> Vec<Account> {
    response
        .accounts
        .iter()
        .filter(|a| a.account_type == "Futures" && a.status == "Active")
        .map(|a| Account::new(a.account_id.clone(), AccountType::Futures, a.currency.clone()))
        .collect()
}

/// Balance figures arrive as strings; unparseable ones count as zero.
fn to_f64(value: &str) -> f64 {
    match value.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            if !value.is_empty() {
                warn!(value = %value, "Tradestation: cannot convert value to f64");
            }
            0.0
        }
    }
}

/// Parses `/Date(<millis>)/`. Negative timestamps mean "no expiration".
fn convert_expiration_date(date: &str) -> Result<Option<DateTime<Utc>>> {
    let invalid = || GatewayError::malformed(format!("Invalid expiration date: {}", date));

    let start = date.find('(').ok_or_else(invalid)?;
    let end = date.find(')').ok_or_else(invalid)?;
    if end <= start {
        return Err(invalid());
    }

    let millis: i64 = date[start + 1..end].parse().map_err(|_| invalid())?;
    if millis < 0 {
        return Ok(None);
    }

    DateTime::from_timestamp_millis(millis).map(Some).ok_or_else(invalid)
}

fn convert_bar(bar: Bar) -> Result<PriceBar> {
    let time = DateTime::parse_from_rfc3339(&bar.time_stamp)
        .map_err(|_| GatewayError::malformed(format!("Invalid bar timestamp: {}", bar.time_stamp)))?
        .with_timezone(&Utc);

    Ok(PriceBar {
        time,
        open: to_f64(&bar.open),
        high: to_f64(&bar.high),
        low: to_f64(&bar.low),
        close: to_f64(&bar.close),
        up_volume: bar.up_volume,
        down_volume: bar.down_volume,
    })
}
