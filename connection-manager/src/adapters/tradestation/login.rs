//! Scripted browser login.
//!
//! ```text
//! GET  login page ──▶ embedded config + authorize query (state, nonce, ...)
//! POST credentials ──▶ hidden form (wa, wresult, wctx)
//! POST form to callback ──▶ 2FA page (new state)
//! POST 2FA code ──▶ dashboard, tokens in response headers
//! ```
//!
//! The backend rejects requests that do not look like they come from a
//! desktop browser, so every step carries browser-like headers.

use super::api::{Auth0Config, LoginRequest};
use super::markup::{self, LoginResult};
use super::TradestationAdapter;
use crate::adapter::ensure_success;
use crate::error::{GatewayError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tracing::{debug, error};

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const AUTH0_CLIENT: &str = "eyJuYW1lIjoiYXV0aDAuanMtdWxwIiwidmVyc2lvbiI6IjkuMTYuNCJ9";
const LOGIN_CONNECTION: &str = "auth0-api-connection";

/// Authorize parameters carried by the login page URL, plus its embedded config.
#[derive(Debug, Default)]
pub(super) struct LoginInfo {
    pub state: String,
    pub client: String,
    pub protocol: String,
    pub scope: String,
    pub response_type: String,
    pub redirect_uri: String,
    pub audience: String,
    pub nonce: String,
    pub code_challenge_method: String,
    pub code_challenge: String,
    pub config: Auth0Config,
}

impl LoginInfo {
    fn from_url(url: &reqwest::Url, config: Auth0Config) -> Self {
        let mut info = LoginInfo {
            config,
            ..Default::default()
        };

        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "state" => info.state = value,
                "client" => info.client = value,
                "protocol" => info.protocol = value,
                "scope" => info.scope = value,
                "response_type" => info.response_type = value,
                "redirect_uri" => info.redirect_uri = value,
                "audience" => info.audience = value,
                "nonce" => info.nonce = value,
                "code_challenge_method" => info.code_challenge_method = value,
                "code_challenge" => info.code_challenge = value,
                _ => {}
            }
        }

        info
    }
}

/// Headers a desktop Chrome sends on every request.
pub(super) fn common_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    h.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    h.insert("Pragma", HeaderValue::from_static("no-cache"));
    h.insert(
        "Sec-Ch-Ua",
        HeaderValue::from_static("\"Not)A;Brand\";v=\"8\", \"Chromium\";v=\"138\", \"Google Chrome\";v=\"138\""),
    );
    h.insert("Sec-Ch-Ua-Mobile", HeaderValue::from_static("?0"));
    h.insert("Sec-Ch-Ua-Platform", HeaderValue::from_static("\"Linux\""));
    h.insert(
        "User-Agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
        ),
    );
    h
}

/// Headers of the sign-in page's own XHR calls.
fn xhr_headers() -> HeaderMap {
    let mut h = common_headers();
    h.insert(ACCEPT, HeaderValue::from_static("*/*"));
    h.insert("Priority", HeaderValue::from_static("u=0, i"));
    h.insert("Origin", HeaderValue::from_static("https://signin.tradestation.com"));
    h.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    h.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    h.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    h.insert("Auth0-Client", HeaderValue::from_static(AUTH0_CLIENT));
    h
}

impl TradestationAdapter {
    /// Runs the whole sign-in and stores the resulting tokens.
    pub(super) async fn login(&mut self) -> Result<()> {
        let info = self.create_login_info().await?;
        let result = self.submit_credentials(&info).await?;
        let state = self.call_callback(&result).await?;
        self.submit_two_fa_code(&state).await
    }

    async fn create_login_info(&self) -> Result<LoginInfo> {
        let mut headers = common_headers();
        headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
        headers.insert("Priority", HeaderValue::from_static("u=0, i"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
        headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let response = self
            .client()?
            .get(&self.endpoints.login_page)
            .headers(headers)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        // Many redirects happen before the page: the authorize query is on the final URL
        let final_url = response.url().clone();
        let body = response.text().await?;

        let encoded = markup::extract_encoded_config(&body)
            .ok_or_else(|| GatewayError::malformed("Can't extract config from login page"))?;
        let decoded = BASE64
            .decode(encoded.as_bytes())
            .map_err(|_| GatewayError::malformed(format!("Can't decode config from base64: {}", encoded)))?;
        let config: Auth0Config = serde_json::from_slice(&decoded)
            .map_err(|e| GatewayError::malformed(format!("Bad login config JSON: {}", e)))?;

        debug!(final_url = %final_url, tenant = %config.auth0_tenant, "Tradestation login page parsed");
        Ok(LoginInfo::from_url(&final_url, config))
    }

    async fn submit_credentials(&self, info: &LoginInfo) -> Result<LoginResult> {
        let client_id = if info.client.is_empty() {
            self.client_id.as_str()
        } else {
            info.client.as_str()
        };

        let request = LoginRequest {
            audience: &info.audience,
            client_id,
            connection: LOGIN_CONNECTION,
            nonce: &info.nonce,
            password: &self.password,
            redirect_uri: &info.redirect_uri,
            response_type: &info.response_type,
            scope: &info.scope,
            state: &info.state,
            tenant: &info.config.auth0_tenant,
            username: &self.username,
            csrf: &info.config.internal_options.csrf,
            intstate: &info.config.internal_options.intstate,
        };

        let response = self
            .client()?
            .post(&self.endpoints.login_post)
            .headers(xhr_headers())
            .json(&request)
            .send()
            .await?;
        let body = response.text().await?;

        let result = markup::extract_login_result(&body);
        if result.wa.is_empty() {
            error!(username = %self.username, "Can't login to Tradestation");
            return Err(GatewayError::auth_failure("Can't login to Tradestation"));
        }

        Ok(result)
    }

    /// Posts the hidden form and returns the state of the 2FA challenge.
    async fn call_callback(&self, result: &LoginResult) -> Result<String> {
        let form = [
            ("wa", result.wa.as_str()),
            ("wresult", result.wresult.as_str()),
            ("wctx", result.wctx.as_str()),
        ];

        let response = self
            .client()?
            .post(&self.endpoints.login_callback)
            .headers(xhr_headers())
            .form(&form[..])
            .send()
            .await?;

        let final_url = response.url().clone();
        if final_url.path() != self.endpoints.two_fa_path() {
            error!(path = %final_url.path(), "Didn't get the 2FA page");
            return Err(GatewayError::auth_failure("Didn't get the 2FA page"));
        }

        Ok(final_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default())
    }

    async fn submit_two_fa_code(&mut self, state: &str) -> Result<()> {
        let form = [
            ("state", state),
            ("code", self.two_fa_code.as_str()),
            ("action", "default"),
        ];

        let mut headers = common_headers();
        headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));

        let url = format!("{}?state={}", self.endpoints.two_fa, urlencoding::encode(state));
        let response = self
            .client()?
            .post(url)
            .headers(headers)
            .form(&form[..])
            .send()
            .await?;

        if response.url().path() != self.endpoints.dashboard_path {
            error!(path = %response.url().path(), "Didn't get the dashboard page");
            return Err(GatewayError::auth_failure("Didn't get the dashboard page"));
        }

        let header_text = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        self.access_token = header_text("X-Authorization");
        self.id_token = header_text("X-Id-Token");

        if self.access_token.is_empty() {
            return Err(GatewayError::auth_failure("Dashboard did not return an access token"));
        }

        Ok(())
    }
}
