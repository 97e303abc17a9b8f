//! Tradestation REST and sign-in payloads.

use serde::{Deserialize, Serialize};

pub const URL_BROKERAGE_ACCOUNTS: &str = "/v3/brokerage/accounts";
pub const URL_MARKET_DATA_BARCHARTS: &str = "/v3/marketdata/barcharts";
pub const URL_SYMBOLS_SEARCH: &str = "/v2/data/symbols/search";
pub const URL_SYMBOLS_SUGGEST: &str = "/v2/data/symbols/suggest";

// --- sign-in -----------------------------------------------------------------

/// Login page configuration, base64-encoded in the page markup.
#[derive(Debug, Default, Deserialize)]
pub struct Auth0Config {
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(rename = "auth0Domain", default)]
    pub auth0_domain: String,
    #[serde(rename = "auth0Tenant", default)]
    pub auth0_tenant: String,
    #[serde(rename = "internalOptions", default)]
    pub internal_options: InternalOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct InternalOptions {
    #[serde(default)]
    pub protocol: String,
    #[serde(rename = "_csrf", default)]
    pub csrf: String,
    #[serde(rename = "_intstate", default)]
    pub intstate: String,
}

/// Credential submission body.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub audience: &'a str,
    pub client_id: &'a str,
    pub connection: &'a str,
    pub nonce: &'a str,
    pub password: &'a str,
    pub redirect_uri: &'a str,
    pub response_type: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
    pub tenant: &'a str,
    pub username: &'a str,
    #[serde(rename = "_csrf")]
    pub csrf: &'a str,
    #[serde(rename = "_intstate")]
    pub intstate: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub expiry: i64,
}

// --- /v3/brokerage/accounts --------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountsResponse {
    #[serde(default)]
    pub accounts: Vec<BrokerageAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerageAccount {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub account_type: String,
}

// --- /v3/brokerage/accounts/{id}/balances ------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalancesResponse {
    #[serde(default)]
    pub balances: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Balance {
    #[serde(default)]
    pub cash_balance: String,
    #[serde(default)]
    pub equity: String,
    #[serde(default)]
    pub balance_detail: BalanceDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalanceDetail {
    #[serde(default)]
    pub realized_profit_loss: String,
    #[serde(default)]
    pub unrealized_profit_loss: String,
    #[serde(default)]
    pub open_order_margin: String,
    #[serde(default)]
    pub initial_margin: String,
    #[serde(default)]
    pub maintenance_margin: String,
}

// --- /v2/data/symbols/search/{query} -----------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SymbolFound {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub root: String,
    /// `/Date(<millis>)/`
    #[serde(default)]
    pub expiration_date: String,
    #[serde(default)]
    pub point_value: f64,
    #[serde(default)]
    pub min_move: f64,
}

// --- /v2/data/symbols/suggest/{filter} ---------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RootFound {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub point_value: f64,
    pub root: String,
}

// --- /v3/marketdata/barcharts/{symbol} ---------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BarchartResponse {
    #[serde(default)]
    pub bars: Vec<Bar>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bar {
    pub time_stamp: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    #[serde(default)]
    pub up_volume: u64,
    #[serde(default)]
    pub down_volume: u64,
}
