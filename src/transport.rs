use async_trait::async_trait;

use crate::error::{NavError, Result};

/// Outbound HTTP, abstracted so the engine can be driven against a live
/// site or against canned fixtures in tests.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// GET a URL (site-relative path) with an optional querystring,
    /// returning the response body.
    async fn get(&self, url: &str, querystring: Option<&str>) -> Result<String>;

    /// POST a form-encoded body, returning the response body.
    async fn post(&self, url: &str, form: &[(String, String)]) -> Result<String>;
}

/// Live transport over `reqwest`.
pub struct Http {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for Http {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Http {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reposio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), url)
        }
    }
}

#[async_trait]
impl Transport for Http {
    async fn get(&self, url: &str, querystring: Option<&str>) -> Result<String> {
        let mut target = self.absolute(url);
        if let Some(qs) = querystring {
            if !qs.is_empty() {
                let sep = if target.contains('?') { '&' } else { '?' };
                target.push(sep);
                target.push_str(qs);
            }
        }
        tracing::debug!(url = %target, "GET");
        let response = self.client.get(&target).send().await?;
        if !response.status().is_success() {
            return Err(NavError::Http(format!(
                "GET {} returned {}",
                target,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn post(&self, url: &str, form: &[(String, String)]) -> Result<String> {
        let target = self.absolute(url);
        tracing::debug!(url = %target, "POST");
        let response = self.client.post(&target).form(form).send().await?;
        if !response.status().is_success() {
            return Err(NavError::Http(format!(
                "POST {} returned {}",
                target,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}
