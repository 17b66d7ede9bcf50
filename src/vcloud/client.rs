use crate::vcloud::error::{Result as VcdResult, VcdError};
use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use url::Url;

pub const DEFAULT_API_VERSION: &str = "38.0";

const ACCESS_TOKEN_HEADER: &str = "x-vmware-vcloud-access-token";

#[derive(Clone)]
pub struct VcdClient {
    pub(crate) client: Client,
    pub(crate) base_url: Url,
    api_version: String,
    bearer: Option<String>,
}

impl VcdClient {
    pub fn new(host: &str, port: Option<u16>, verify_ssl: bool, api_version: &str) -> Result<Self> {
        let scheme = if host.starts_with("http://") {
            "http"
        } else {
            "https"
        };

        let host_cleaned = if let Some(stripped) = host.strip_prefix("http://") {
            stripped
        } else if let Some(stripped) = host.strip_prefix("https://") {
            stripped
        } else {
            host
        };
        let host_cleaned = host_cleaned.trim_end_matches('/');

        let url_str = match port {
            Some(p) => format!("{}://{}:{}/", scheme, host_cleaned, p),
            None => format!("{}://{}/", scheme, host_cleaned),
        };

        let base_url = Url::parse(&url_str).context("Invalid host URL")?;

        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .cookie_store(true)
            .build()
            .context("Failed to build reqwest client")?;

        Ok(Self {
            client,
            base_url,
            api_version: api_version.to_string(),
            bearer: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn set_api_token(&mut self, token: &str) {
        self.bearer = Some(format!("Bearer {}", token));
    }

    /// Opens a session and keeps the returned access token for later calls.
    /// The `System` org authenticates against the provider endpoint.
    pub async fn login(&mut self, org: &str, user: &str, password: &str) -> Result<()> {
        let path = if org.eq_ignore_ascii_case("system") {
            "cloudapi/1.0.0/sessions/provider"
        } else {
            "cloudapi/1.0.0/sessions"
        };
        let url = self.base_url.join(path)?;

        let resp = self
            .client
            .post(url)
            .basic_auth(format!("{}@{}", user, org), Some(password))
            .header(ACCEPT, self.json_accept())
            .send()
            .await
            .context("Login request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VcdError::Auth(format!("{} - {}", status, text)).into());
        }

        let token = resp
            .headers()
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| VcdError::Auth("Session response carried no access token".into()))?;

        self.set_api_token(&token);
        info!("Successfully logged in as {}@{}", user, org);
        Ok(())
    }

    fn json_accept(&self) -> String {
        format!("application/json;version={}", self.api_version)
    }

    fn xml_accept(&self) -> String {
        format!("application/*+xml;version={}", self.api_version)
    }

    fn build(&self, method: Method, path: &str, query: &[(&str, String)]) -> VcdResult<RequestBuilder> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        debug!("{} {}", method, url);

        let mut req = self.client.request(method, url);
        if let Some(token) = &self.bearer {
            if let Ok(value) = HeaderValue::from_str(token) {
                req = req.header(AUTHORIZATION, value);
            }
        }
        Ok(req)
    }

    async fn send(&self, req: RequestBuilder, path: &str) -> VcdResult<reqwest::Response> {
        let resp = req.send().await.map_err(VcdError::Request)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            debug!("Request to {} failed: {}", path, status);
            return Err(VcdError::Api(status, text));
        }
        Ok(resp)
    }

    /// GET against a structured (JSON) endpoint.
    pub(crate) async fn get_json(&self, path: &str, query: &[(&str, String)]) -> VcdResult<Value> {
        let req = self
            .build(Method::GET, path, query)?
            .header(ACCEPT, self.json_accept());
        let resp = self.send(req, path).await?;
        resp.json().await.map_err(VcdError::Request)
    }

    /// GET against a legacy endpoint that answers in XML; the body is returned unparsed.
    pub(crate) async fn get_xml(&self, path: &str, query: &[(&str, String)]) -> VcdResult<String> {
        let req = self
            .build(Method::GET, path, query)?
            .header(ACCEPT, self.xml_accept());
        let resp = self.send(req, path).await?;
        resp.text().await.map_err(VcdError::Request)
    }
}
