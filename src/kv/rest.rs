//! Client for a KV store speaking the REST dialect.
//!
//! Every primitive maps to one request and every answer is `{ "result": ... }`.
//! Works against a hosted store as well as this server's own `/api/kv` proxy.

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{counter_value, KvError, KvStore};
use crate::config::UpstreamKv;

/// Header carrying the optional store namespace.
pub const NAMESPACE_HEADER: &str = "Upstash-Namespaces";

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Clone)]
pub struct RestKv {
    client: Client,
    base: Url,
    token: Option<String>,
    namespace: Option<String>,
}

impl RestKv {
    /// Create a client rooted at `base_url`, e.g. `https://kv.example` or
    /// `http://127.0.0.1:8080/api/kv`.
    pub fn new(base_url: &str, token: Option<String>, namespace: Option<String>) -> Result<Self, KvError> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| KvError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(KvError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: Client::new(),
            base,
            token,
            namespace,
        })
    }

    pub fn from_upstream(upstream: &UpstreamKv) -> Result<Self, KvError> {
        Self::new(
            &upstream.url,
            Some(upstream.token.clone()),
            upstream.namespace.clone(),
        )
    }

    fn endpoint(&self, op: &str, key: &str) -> Result<Url, KvError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| KvError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .push(op)
            .push(key);
        Ok(url)
    }

    async fn call(
        &self,
        op: &'static str,
        method: Method,
        key: &str,
        body: Option<Value>,
    ) -> Result<Value, KvError> {
        let mut request = self.client.request(method, self.endpoint(op, key)?);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KvError::Status {
                op,
                status: status.as_u16(),
            });
        }

        let reply: Reply = response.json().await?;
        Ok(reply.result)
    }
}

#[async_trait]
impl KvStore for RestKv {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        let result = self.call("get", Method::GET, key, None).await?;
        Ok(match result {
            Value::Null => None,
            value => Some(value),
        })
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), KvError> {
        self.call("set", Method::POST, key, Some(json!({ "value": value })))
            .await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let result = self.call("incr", Method::POST, key, None).await?;
        counter_value(&result).ok_or_else(|| KvError::NotANumber {
            key: key.to_string(),
        })
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.call("del", Method::POST, key, None).await?;
        Ok(())
    }
}
