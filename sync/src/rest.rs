//! PostgREST-style HTTP remote.
//!
//! Each table is exposed at `{base}/rest/v1/{table}`. Every request carries
//! the `apikey` header and a bearer token: the session access token once
//! signed in, the API key otherwise.

use crate::error::{Result, SyncError};
use crate::remote::RemoteBackend;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use tally_engine::{schema::OWNER_COLUMN, Table};

/// HTTP client for the remote tables.
///
/// No request timeout is set; a stalled call holds the drain in flight until
/// the connection itself fails.
#[derive(Debug)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestRemote {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        })
    }

    /// Set or clear the session token used as bearer.
    pub fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.api_key.clone());

        request
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn check(table: Table, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(SyncError::Rejected {
            table,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteBackend for RestRemote {
    async fn upsert(&self, table: Table, row: Value) -> Result<()> {
        let on_conflict = format!("id,{OWNER_COLUMN}");
        let request = self
            .client
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict.as_str())])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);

        let resp = self.authorized(request).send().await?;
        Self::check(table, resp).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<()> {
        let filter = format!("eq.{id}");
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", filter.as_str())]);

        let resp = self.authorized(request).send().await?;
        Self::check(table, resp).await?;
        Ok(())
    }

    async fn fetch_all(&self, table: Table, owner: &str) -> Result<Vec<Value>> {
        let filter = format!("eq.{owner}");
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[(OWNER_COLUMN, filter.as_str()), ("select", "*")]);

        let resp = self.authorized(request).send().await?;
        let resp = Self::check(table, resp).await?;
        match resp.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            _ => Err(SyncError::InvalidResponse(format!("expected an array of {table} rows"))),
        }
    }
}
