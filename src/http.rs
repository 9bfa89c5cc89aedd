//! Request and response values exchanged between the agent and its host.

use reqwest::Method;
use url::Url;

/// How the request was initiated by the controlled view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  /// Script, stylesheet, image, XHR and the like
  #[default]
  Subresource,
}

/// A request issued by a controlled view.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub headers: Vec<(String, String)>,
}

impl Request {
  /// Plain GET for a subresource.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      mode: RequestMode::Subresource,
      headers: Vec::new(),
    }
  }

  /// GET issued by a page navigation.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }
}

/// A response, either live from the network or replayed from a cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      url: url.to_string(),
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Minimal response handed out when neither network nor cache can serve.
  pub fn offline() -> Self {
    Self {
      status_text: "Offline".to_string(),
      ..Self::new("", 503, "Offline")
    }
    .with_header("Content-Type", "text/plain")
  }

  /// True for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    find_header(&self.headers, name)
  }

  /// Header names listed in `Vary`, lowercased.
  pub fn vary(&self) -> Vec<String> {
    self
      .headers
      .iter()
      .filter(|(name, _)| name.eq_ignore_ascii_case("vary"))
      .flat_map(|(_, value)| value.split(','))
      .map(|name| name.trim().to_lowercase())
      .filter(|name| !name.is_empty())
      .collect()
  }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
  headers
    .iter()
    .find(|(n, _)| n.eq_ignore_ascii_case(name))
    .map(|(_, v)| v.as_str())
}
