use chrono::{DateTime, Utc};
use serde::Serialize;

/// A futures root (e.g. "ES") as offered by a backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSymbol {
    pub code: String,
    pub instrument: String,
    pub exchange: String,
    pub country: String,
    pub currency: String,
    pub point_value: f64,
}

/// One tradeable contract under a root.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub name: String,
    pub description: String,
    pub exchange: String,
    pub country: String,
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub point_value: f64,
    pub min_move: f64,
    /// Continuous (rolled) contract rather than a single expiry
    pub continuous: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub up_volume: u64,
    pub down_volume: u64,
}

/// Bars for one symbol and day.
///
/// `timeout` is set when the backend accepted the request but could not
/// produce the data in time; callers retry these.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBars {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
    #[serde(skip)]
    pub timeout: bool,
}

impl PriceBars {
    pub fn timed_out(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: Vec::new(),
            timeout: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Cash,
    Margin,
    Futures,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: AccountType,
    pub currency_code: String,
    pub cash_balance: f64,
    pub equity: f64,
    pub realized_profit_loss: f64,
    pub unrealized_profit_loss: f64,
    pub open_order_margin: f64,
    pub initial_margin: f64,
    pub maintenance_margin: f64,
}

impl Account {
    pub fn new(code: impl Into<String>, kind: AccountType, currency_code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind,
            currency_code: currency_code.into(),
            cash_balance: 0.0,
            equity: 0.0,
            realized_profit_loss: 0.0,
            unrealized_profit_loss: 0.0,
            open_order_margin: 0.0,
            initial_margin: 0.0,
            maintenance_margin: 0.0,
        }
    }
}
