//! Consul HTTP API client
//!
//! Only the endpoints the distributed engine needs: KV, sessions and the
//! leader status used as a reachability probe.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{KvBackend, SessionSpec};
use crate::config::ConsulConfig;
use crate::error::{Result, SdError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SessionCreateRequest<'a> {
    name: &'a str,
    #[serde(rename = "TTL")]
    ttl: String,
    behavior: &'a str,
    lock_delay: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionCreateResponse {
    #[serde(rename = "ID")]
    id: String,
}

pub struct ConsulClient {
    http: Client,
    base: Url,
    datacenter: Option<String>,
    token: Option<String>,
    allow_stale: bool,
}

impl ConsulClient {
    pub fn new(config: &ConsulConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base: parse_address(&config.address)?,
            datacenter: config.datacenter.clone(),
            token: config.token.clone(),
            allow_stale: config.allow_stale,
        })
    }

    /// Fail unless the cluster currently has a leader
    pub fn check_leader(&self) -> Result<String> {
        let resp = self.send(self.request(Method::GET, &["status", "leader"])?)?;
        let resp = expect_success(resp, "status/leader")?;
        let leader: String = resp.json()?;
        if leader.is_empty() {
            return Err(SdError::Http("Consul cluster has no leader".into()));
        }
        Ok(leader)
    }

    /// URL for `/v1/<segments...>`, each segment percent-encoded
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SdError::Config(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn kv_url(&self, key: &str) -> Result<Url> {
        let mut segments = vec!["kv"];
        segments.extend(key.split('/'));
        self.url(&segments)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(self.decorate(self.http.request(method, self.url(segments)?)))
    }

    fn kv_request(&self, method: Method, key: &str) -> Result<RequestBuilder> {
        Ok(self.decorate(self.http.request(method, self.kv_url(key)?)))
    }

    fn decorate(&self, mut req: RequestBuilder) -> RequestBuilder {
        if let Some(dc) = &self.datacenter {
            req = req.query(&[("dc", dc.as_str())]);
        }
        if let Some(token) = &self.token {
            req = req.header("X-Consul-Token", token.as_str());
        }
        req
    }

    fn read_options(&self, req: RequestBuilder) -> RequestBuilder {
        if self.allow_stale {
            req.query(&[("stale", "")])
        } else {
            req
        }
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        Ok(req.send()?)
    }
}

impl KvBackend for ConsulClient {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let req = self.read_options(self.kv_request(Method::GET, key)?.query(&[("raw", "")]));
        let resp = self.send(req)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = expect_success(resp, key)?;
        Ok(Some(resp.bytes()?.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let req = self.kv_request(Method::PUT, key)?.body(value.to_vec());
        let ok: bool = expect_success(self.send(req)?, key)?.json()?;
        if !ok {
            return Err(SdError::Storage(format!("Consul rejected write of {key}")));
        }
        debug!(key, bytes = value.len(), "KV put");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let req = self.kv_request(Method::DELETE, key)?;
        expect_success(self.send(req)?, key)?;
        debug!(key, "KV delete");
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let req = self.read_options(self.kv_request(Method::GET, prefix)?.query(&[("keys", "")]));
        let resp = self.send(req)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Ok(expect_success(resp, prefix)?.json()?)
    }

    fn create_session(&self, spec: &SessionSpec) -> Result<String> {
        let body = SessionCreateRequest {
            name: &spec.name,
            ttl: format!("{}s", spec.ttl.as_secs().max(1)),
            behavior: spec.behavior.as_str(),
            lock_delay: "0s",
        };
        let req = self.request(Method::PUT, &["session", "create"])?.json(&body);
        let created: SessionCreateResponse =
            expect_success(self.send(req)?, "session/create")?.json()?;
        debug!(session = %created.id, "Session created");
        Ok(created.id)
    }

    fn renew_session(&self, id: &str) -> Result<bool> {
        let resp = self.send(self.request(Method::PUT, &["session", "renew", id])?)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        expect_success(resp, "session/renew")?;
        Ok(true)
    }

    fn destroy_session(&self, id: &str) -> Result<()> {
        let resp = self.send(self.request(Method::PUT, &["session", "destroy", id])?)?;
        expect_success(resp, "session/destroy")?;
        debug!(session = id, "Session destroyed");
        Ok(())
    }

    fn acquire(&self, key: &str, value: &[u8], session: &str) -> Result<bool> {
        let req = self
            .kv_request(Method::PUT, key)?
            .query(&[("acquire", session)])
            .body(value.to_vec());
        Ok(expect_success(self.send(req)?, key)?.json()?)
    }

    fn release(&self, key: &str, session: &str) -> Result<bool> {
        let req = self
            .kv_request(Method::PUT, key)?
            .query(&[("release", session)]);
        Ok(expect_success(self.send(req)?, key)?.json()?)
    }
}

fn expect_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(SdError::Http(format!(
        "{what}: unexpected status {}: {}",
        status.as_u16(),
        body.trim()
    )))
}

/// Accepts `host:port` or a full URL
fn parse_address(address: &str) -> Result<Url> {
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    Url::parse(&with_scheme)
        .map_err(|e| SdError::Config(format!("invalid consul.address {address:?}: {e}")))
}
