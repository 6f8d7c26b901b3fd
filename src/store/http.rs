//! HTTP Resource Store
//!
//! REST client for a JSON resource server exposing `/users` and
//! `/transactions`.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use reqwest::{Response, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::{ResourceStore, StoreError};
use crate::config::StoreConfig;
use crate::core_types::{TransactionId, UserId};
use crate::models::{BalancePatch, NewTransaction, Transaction, TransactionPatch, User};

const USERS: &str = "users";
const TRANSACTIONS: &str = "transactions";

/// Resource store backed by a REST server
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            "Initializing HTTP resource store"
        );

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, collection: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.base_url, collection, id),
            None => format!("{}/{}", self.base_url, collection),
        }
    }

    async fn get<R: DeserializeOwned>(
        &self,
        collection: &'static str,
        id: Option<&str>,
    ) -> Result<R, StoreError> {
        let url = self.url(collection, id);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("GET {} failed: {}", url, e)))?;
        decode(response, collection, id).await
    }

    async fn send_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        collection: &'static str,
        id: Option<&str>,
        body: &B,
    ) -> Result<R, StoreError> {
        let url = self.url(collection, id);
        debug!(url = %url, method = %method, "write");
        let response = self
            .client
            .request(method.clone(), &url)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("{} {} failed: {}", method, url, e)))?;
        decode(response, collection, id).await
    }
}

async fn decode<R: DeserializeOwned>(
    response: Response,
    collection: &'static str,
    id: Option<&str>,
) -> Result<R, StoreError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound {
            collection,
            id: id.unwrap_or_default().to_string(),
        });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| StoreError::Decode(format!("{}: {}", collection, e)))
}

#[async_trait]
impl ResourceStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.get(USERS, None).await
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        self.get(USERS, Some(id.as_str())).await
    }

    async fn update_user_balance(
        &self,
        id: &UserId,
        balance: Decimal,
    ) -> Result<User, StoreError> {
        self.send_json(
            reqwest::Method::PATCH,
            USERS,
            Some(id.as_str()),
            &BalancePatch { balance },
        )
        .await
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.get(TRANSACTIONS, None).await
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, StoreError> {
        self.get(TRANSACTIONS, Some(id.as_str())).await
    }

    async fn create_transaction(&self, tx: &NewTransaction) -> Result<Transaction, StoreError> {
        self.send_json(reqwest::Method::POST, TRANSACTIONS, None, tx)
            .await
    }

    async fn patch_transaction(
        &self,
        id: &TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction, StoreError> {
        self.send_json(reqwest::Method::PATCH, TRANSACTIONS, Some(id.as_str()), patch)
            .await
    }
}
