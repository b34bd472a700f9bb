use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::ConsulError;

use super::{CatalogNode, ConsulOps, HealthCheck, HealthEntry, KvEntry, ServiceRegistration};

/// Live coordination-store client, grounded on the HTTP KV/catalog/health/
/// agent API (`examples/original_source/sense.py`, `tarantool.py` drive the
/// same endpoints through the Python `consul` client).
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: reqwest::Client,
    base_url: String,
    acl_token: Option<String>,
}

impl ConsulClient {
    pub fn new(base_url: impl Into<String>, acl_token: Option<String>, timeout: Duration) -> Result<Self, ConsulError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConsulError::Transport)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            acl_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, self.url(path));
        if let Some(token) = &self.acl_token {
            req = req.header("X-Consul-Token", token);
        }
        req
    }
}

#[derive(Deserialize)]
struct RawKvEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

#[derive(Deserialize)]
struct RawCatalogNode {
    #[serde(rename = "Node")]
    node: String,
    #[serde(rename = "Address")]
    address: String,
}

#[derive(Deserialize)]
struct RawHealthCheck {
    #[serde(rename = "CheckID")]
    check_id: String,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Deserialize)]
struct RawServiceEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Tags")]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct RawHealthEntry {
    #[serde(rename = "Node")]
    node: RawCatalogNode,
    #[serde(rename = "Service")]
    service: RawServiceEntry,
    #[serde(rename = "Checks")]
    checks: Vec<RawHealthCheck>,
}

fn decode_ascii(key: &str, raw: Option<String>) -> Result<String, ConsulError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(String::new()),
    };
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, raw.as_bytes())
        .map_err(|e| ConsulError::Decode(format!("{key}: {e}")))?;
    if !decoded.is_ascii() {
        return Err(ConsulError::Decode(format!("{key}: value is not ASCII")));
    }
    String::from_utf8(decoded).map_err(|e| ConsulError::Decode(format!("{key}: {e}")))
}

impl ConsulOps for ConsulClient {
    fn kv_get<'a>(
        &'a self,
        prefix: &'a str,
        recurse: bool,
        index: Option<u64>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(u64, Vec<KvEntry>), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let mut req = self.request(reqwest::Method::GET, &format!("/v1/kv/{prefix}"));
            if recurse {
                req = req.query(&[("recurse", "true")]);
            }
            if let Some(idx) = index {
                req = req.query(&[("index", idx.to_string()), ("wait", "10s".to_string())]);
            }
            let resp = req.send().await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok((index.unwrap_or(0), Vec::new()));
            }
            let new_index = resp
                .headers()
                .get("X-Consul-Index")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(index.unwrap_or(0));
            let raw: Vec<RawKvEntry> = resp.json().await?;
            let mut entries = Vec::with_capacity(raw.len());
            for e in raw {
                let value = decode_ascii(&e.key, e.value)?;
                entries.push(KvEntry { key: e.key, value });
            }
            Ok((new_index, entries))
        })
    }

    fn kv_put<'a>(&'a self, key: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            self.request(reqwest::Method::PUT, &format!("/v1/kv/{key}"))
                .body(value.to_string())
                .send()
                .await?;
            Ok(())
        })
    }

    fn kv_delete<'a>(&'a self, prefix: &'a str, recurse: bool) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let mut req = self.request(reqwest::Method::DELETE, &format!("/v1/kv/{prefix}"));
            if recurse {
                req = req.query(&[("recurse", "true")]);
            }
            req.send().await?;
            Ok(())
        })
    }

    fn catalog_services(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<String>, ConsulError>> + Send + '_>> {
        Box::pin(async move {
            let resp = self.request(reqwest::Method::GET, "/v1/catalog/services").send().await?;
            let map: std::collections::HashMap<String, Vec<String>> = resp.json().await?;
            Ok(map.into_keys().collect())
        })
    }

    fn catalog_nodes(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<CatalogNode>, ConsulError>> + Send + '_>> {
        Box::pin(async move {
            let resp = self.request(reqwest::Method::GET, "/v1/catalog/nodes").send().await?;
            let raw: Vec<RawCatalogNode> = resp.json().await?;
            Ok(raw
                .into_iter()
                .map(|n| CatalogNode { node: n.node, address: n.address })
                .collect())
        })
    }

    fn health_service<'a>(&'a self, name: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<HealthEntry>, ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self.request(reqwest::Method::GET, &format!("/v1/health/service/{name}")).send().await?;
            let raw: Vec<RawHealthEntry> = resp.json().await?;
            Ok(raw
                .into_iter()
                .map(|e| HealthEntry {
                    service_id: e.service.id,
                    service_address: e.service.address,
                    node: e.node.node,
                    tags: e.service.tags,
                    checks: e
                        .checks
                        .into_iter()
                        .map(|c| HealthCheck { check_id: c.check_id, status: c.status })
                        .collect(),
                })
                .collect())
        })
    }

    fn agent_service_register<'a>(&'a self, registration: ServiceRegistration) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let checks: Vec<_> = registration
                .checks
                .iter()
                .map(|c| {
                    json!({
                        "CheckID": c.check_id,
                        "Name": c.name,
                        "Args": ["/bin/sh", "-c", c.script],
                        "Interval": format!("{}s", c.interval_secs),
                        "Status": c.initial_status,
                    })
                })
                .collect();
            let body = json!({
                "ID": registration.id,
                "Name": registration.name,
                "Tags": registration.tags,
                "Address": registration.address,
                "Port": registration.port,
                "Checks": checks,
            });
            self.request(reqwest::Method::PUT, "/v1/agent/service/register")
                .json(&body)
                .send()
                .await?;
            Ok(())
        })
    }

    fn agent_service_deregister<'a>(&'a self, service_id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            self.request(reqwest::Method::PUT, &format!("/v1/agent/service/deregister/{service_id}"))
                .send()
                .await?;
            Ok(())
        })
    }

    fn agent_check_deregister<'a>(&'a self, check_id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            self.request(reqwest::Method::PUT, &format!("/v1/agent/check/deregister/{check_id}"))
                .send()
                .await?;
            Ok(())
        })
    }
}
