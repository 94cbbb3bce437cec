/*!
 * HTTP implementation of the pricing API
 *
 * Talks to the REST backend with `reqwest`. Every response body goes
 * through the schema layer before it leaves this module.
 */

#[cfg(feature = "http")]
use std::sync::Arc;
#[cfg(feature = "http")]
use async_trait::async_trait;
#[cfg(feature = "http")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "http")]
use tracing::{debug, warn};

#[cfg(feature = "http")]
use crate::api::{LookupRequest, PricingApi};
#[cfg(feature = "http")]
use crate::auth::{AccessToken, TokenPair, TokenRefresher, TokenSource, TokenStore};
use crate::config::RxConfig;
#[cfg(feature = "http")]
use crate::data_types::*;
#[cfg(feature = "http")]
use crate::error::AuthError;
#[cfg(feature = "http")]
use crate::schema::{self, endpoints};
use crate::{Result, RxError};

/// Body of a successful GET, or a 404
#[cfg(feature = "http")]
enum Fetched {
    Body(String),
    NotFound,
}

/// Pricing API client over HTTP
#[cfg(feature = "http")]
pub struct HttpPricingApi {
    config: RxConfig,
    client: reqwest::Client,
    auth: Option<Arc<TokenRefresher<HttpTokenSource>>>,
}

#[cfg(feature = "http")]
impl HttpPricingApi {
    /// Create a client for the configured base URL.
    ///
    /// With `auth.enabled`, bearer tokens are read from `store` and renewed
    /// through the configured refresh endpoint.
    pub fn new(config: RxConfig, store: Option<Arc<dyn TokenStore>>) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;

        let auth = match (config.auth.enabled, store) {
            (true, Some(store)) => {
                let source = HttpTokenSource {
                    client: client.clone(),
                    url: config.endpoint_url(&config.auth.refresh_path),
                };
                Some(Arc::new(TokenRefresher::new(source, store)))
            }
            (true, None) => {
                return Err(RxError::Configuration {
                    message: "auth is enabled but no token store was provided".to_string(),
                    suggestion: Some("Pass a TokenStore or disable auth".to_string()),
                });
            }
            (false, _) => None,
        };

        Ok(Self { config, client, auth })
    }

    pub fn config(&self) -> &RxConfig {
        &self.config
    }

    /// The shared refresher, so other clients can queue behind the same refresh
    pub fn refresher(&self) -> Option<&Arc<TokenRefresher<HttpTokenSource>>> {
        self.auth.as_ref()
    }

    async fn send(&self, path: &str, params: &[(&str, String)], token: Option<&AccessToken>) -> Result<reqwest::Response> {
        let url = self.config.endpoint_url(path);
        let mut request = self.client.get(&url).query(params);
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, token.header_value());
        }
        debug!(endpoint = path, ?params, "GET");
        request.send().await.map_err(|e| RxError::Transport {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Fetched> {
        let token = match &self.auth {
            Some(refresher) => Some(refresher.valid_token().await?),
            None => None,
        };

        let mut response = self.send(path, params, token.as_ref()).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(refresher) = &self.auth {
                debug!(endpoint = path, "401 with bearer token, refreshing and replaying");
                let token = refresher.fresh_token().await?;
                response = self.send(path, params, Some(&token)).await?;
            }
        }

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            let err = RxError::from_status(path, status.as_u16());
            if err.is_access_blocked() {
                warn!(endpoint = path, status = status.as_u16(), "public access blocked");
            }
            return Err(err);
        }

        let body = response.text().await.map_err(|e| RxError::Transport {
            endpoint: path.to_string(),
            message: format!("failed reading body: {}", e),
        })?;
        Ok(Fetched::Body(body))
    }

    async fn fetch_list<W: schema::WireRecord>(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<W::Output>> {
        match self.fetch(path, params).await? {
            Fetched::Body(body) => schema::decode_list::<W>(path, &body, self.config.record_policy()),
            Fetched::NotFound => Err(RxError::from_status(path, 404)),
        }
    }
}

#[cfg(feature = "http")]
fn build_client(config: &RxConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(config.timeout());
    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.as_str());
    }
    builder.build().map_err(|e| RxError::Custom {
        message: format!("Failed to create HTTP client: {}", e),
        suggestion: Some("Check your network configuration".to_string()),
    })
}

#[cfg(feature = "http")]
fn paging_params(request: &LookupRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("pageNumber", request.cursor.page.to_string()),
        ("pageSize", request.page_size.to_string()),
    ];
    if let Some((name, id)) = request.scope_param() {
        params.push((name, id.to_string()));
    }
    params
}

#[cfg(feature = "http")]
#[async_trait]
impl PricingApi for HttpPricingApi {
    async fn search_bins(&self, text: &str) -> Result<Vec<Bin>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RxError::empty_query("bin"));
        }
        self.fetch_list::<schema::BinWire>(endpoints::BINS_BY_NAME, &[("bin", text.to_string())])
            .await
    }

    async fn pcns_for_bin(&self, bin_id: i64) -> Result<Vec<Pcn>> {
        self.fetch_list::<schema::PcnWire>(endpoints::PCNS_BY_BIN, &[("binId", bin_id.to_string())])
            .await
    }

    async fn rx_groups_for_pcn(&self, pcn_id: i64) -> Result<Vec<RxGroup>> {
        self.fetch_list::<schema::RxGroupWire>(endpoints::RX_GROUPS_BY_PCN, &[("pcnId", pcn_id.to_string())])
            .await
    }

    async fn search_drug_classes(&self, request: &LookupRequest, version: &ClassVersion) -> Result<Vec<DrugClass>> {
        let mut params = vec![
            ("drugClassName", request.query.clone()),
            ("classVersion", version.to_string()),
        ];
        params.extend(paging_params(request));
        self.fetch_list::<schema::DrugClassWire>(request.class_endpoint(), &params)
            .await
    }

    async fn search_drugs(&self, request: &LookupRequest) -> Result<Vec<Drug>> {
        let mut params = vec![("drugName", request.query.clone())];
        params.extend(paging_params(request));
        self.fetch_list::<schema::DrugWire>(request.drug_endpoint(), &params)
            .await
    }

    async fn drugs_for_class(&self, class_id: i64, class_type: &ClassVersion) -> Result<Vec<Drug>> {
        let params = [("classId", class_id.to_string()), ("classType", class_type.to_string())];
        self.fetch_list::<schema::DrugWire>(endpoints::DRUGS_BY_CLASS, &params)
            .await
    }

    async fn pricing_detail(&self, ndc: &Ndc, insurance_id: i64) -> Result<Option<PricingQuote>> {
        let params = [("ndc", ndc.as_str().to_string()), ("insuranceId", insurance_id.to_string())];
        match self.fetch(endpoints::DETAILS, &params).await? {
            Fetched::Body(body) => schema::decode_optional::<schema::PricingWire>(endpoints::DETAILS, &body),
            Fetched::NotFound => Ok(None),
        }
    }

    async fn alternatives(&self, ndc: &Ndc) -> Result<Vec<DrugAlternative>> {
        self.fetch_list::<schema::AlternativeWire>(endpoints::ALTERNATIVES, &[("ndc", ndc.as_str().to_string())])
            .await
    }
}

/// Refresh-token exchange against the backend's refresh endpoint
#[cfg(feature = "http")]
pub struct HttpTokenSource {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http")]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[cfg(feature = "http")]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[cfg(feature = "http")]
#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn refresh(&self, refresh_token: &str) -> std::result::Result<TokenPair, AuthError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::Rejected(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(AuthError::Transport(format!("HTTP {}", status.as_u16())));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transport(format!("malformed refresh response: {}", e)))?;
        let expires_at = body
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));
        Ok(TokenPair {
            access: AccessToken::new(body.access_token, expires_at),
            refresh_token: body.refresh_token,
        })
    }
}

// Placeholder types when the feature is not enabled, for better error messages
#[cfg(not(feature = "http"))]
pub struct HttpPricingApi;

#[cfg(not(feature = "http"))]
impl HttpPricingApi {
    pub fn new(_config: RxConfig, _store: Option<std::sync::Arc<dyn crate::auth::TokenStore>>) -> Result<Self> {
        Err(RxError::feature_required("http"))
    }
}
