use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::debug;

use crate::host::Network;
use crate::http::{Request, Response};

/// Network access backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestNetwork {
  client: reqwest::Client,
}

impl ReqwestNetwork {
  pub fn new(user_agent: &str) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Network for ReqwestNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let url = response.url().to_string();
    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    debug!(url = %url, status = status.as_u16(), bytes = body.len(), "network response");

    Ok(Response {
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      ..Response::new(&url, status.as_u16(), body.to_vec())
    })
  }
}
