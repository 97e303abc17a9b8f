//! Client portal API payloads.

use serde::{Deserialize, Serialize};

pub const PARAM_AUTH_URL: &str = "authUrl";
pub const PARAM_API_URL: &str = "apiUrl";

pub const DEFAULT_AUTH_URL: &str = "https://www.interactivebrokers.co.uk/sso/Login";
pub const DEFAULT_API_URL: &str = "https://api.ibkr.com";

/// Path the SSO flow lands on once credentials (and 2FA) were accepted.
pub const LOGIN_COMPLETED_PATH: &str = "/sso/Dispatcher";

pub const URL_VALIDATE: &str = "/v1/api/sso/validate";
pub const URL_TICKLE: &str = "/v1/api/tickle";
pub const URL_LOGOUT: &str = "/v1/api/logout";
pub const URL_ACCOUNTS: &str = "/v1/api/portfolio/accounts";
pub const URL_ORDERS: &str = "/v1/api/iserver/account/orders";

/// Answer of the session validation endpoint.
#[derive(Debug, Deserialize)]
pub struct Validate {
    #[serde(rename = "USER_ID")]
    pub user_id: i64,
    #[serde(rename = "USER_NAME")]
    pub user_name: String,
    #[serde(rename = "RESULT")]
    pub result: bool,
    #[serde(rename = "AUTH_TIME", default)]
    pub auth_time: i64,
    #[serde(rename = "IS_FREE_TRIAL", default)]
    pub is_free_trial: bool,
    #[serde(rename = "CREDENTIAL", default)]
    pub credential: String,
    #[serde(rename = "IP", default)]
    pub ip: String,
    #[serde(rename = "EXPIRES", default)]
    pub expires: i64,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioAccount {
    pub id: String,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Orders {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub snapshot: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "acct")]
    pub account_id: String,
    #[serde(rename = "conid")]
    pub contract_id: i64,
    pub order_id: i64,
    #[serde(default)]
    pub ticker: String,
    #[serde(rename = "secType", default)]
    pub security_type: String,
    #[serde(default)]
    pub remaining_quantity: f64,
    #[serde(default)]
    pub filled_quantity: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub order_type: String,
    #[serde(default)]
    pub time_in_force: String,
    #[serde(rename = "avgPrice", default)]
    pub average_price: String,
    /// Format is YYMMDDHHmmss in UTC
    #[serde(default)]
    pub last_execution_time: String,
    #[serde(default)]
    pub side: String,
}
