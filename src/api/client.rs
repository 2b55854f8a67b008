use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use crate::config::types::Config;
use crate::error::{AppRunError, ConfigError, OrderError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitItemOrderRequest<'a> {
    pub owner_name: &'a str,
}

/// The remote endpoint that turns a scanned key into an order.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_unit_item_order(&self, key: &str, owner_name: &str) -> Result<(), OrderError>;
}

pub struct HttpOrderApi {
    client: Client,
    base_url: Url,
}

impl HttpOrderApi {
    pub fn new(config: &Config) -> Result<Self, AppRunError> {
        let base_url = parse_base_url(&config.api_base_url)?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ConfigError::InvalidAuthToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| AppRunError::HttpClient { source })?;

        Ok(HttpOrderApi { client, base_url })
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    async fn create_unit_item_order(&self, key: &str, owner_name: &str) -> Result<(), OrderError> {
        let url = order_url(&self.base_url, key)?;
        debug!("POST {}", url);

        let response = self.client
            .post(url)
            .json(&UnitItemOrderRequest { owner_name })
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response.status())?;
        info!("Order created for key {}", key);
        Ok(())
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidApiUrl {
            url: raw.to_string(),
            reason: "url can not have path segments".to_string(),
        });
    }

    Ok(url)
}

pub fn order_url(base_url: &Url, key: &str) -> Result<Url, OrderError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| OrderError::InvalidKey { key: key.to_string() })?
        .pop_if_empty()
        .extend(["order", "unitItem", key]);
    Ok(url)
}

pub fn check_status(status: StatusCode) -> Result<(), OrderError> {
    match status {
        StatusCode::CREATED => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(OrderError::Unauthorized { status: status.as_u16() }),
        _ => Err(OrderError::UnexpectedStatus { status: status.as_u16() }),
    }
}

fn transport_error(source: reqwest::Error) -> OrderError {
    if source.is_timeout() {
        OrderError::Timeout
    } else {
        OrderError::Transport { source }
    }
}
