//! Network-first request handling with cache fallback.

use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::{FetchOutcome, OfflineAgent, ResponseSource};
use crate::config::ExcludeConfig;
use crate::http::{Request, Response};

/// A `host` or `host:port` rule. IPv6 hosts are written bracketed, as in URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostRule {
  host: String,
  port: Option<u16>,
}

impl HostRule {
  fn parse(rule: &str) -> Self {
    let rule = rule.to_lowercase();
    if let Some((host, port)) = rule.rsplit_once(':') {
      // A trailing part that is not all digits belongs to an IPv6 address
      if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(port) = port.parse() {
          return Self {
            host: host.to_string(),
            port: Some(port),
          };
        }
      }
    }
    Self { host: rule, port: None }
  }

  fn matches(&self, host: &str, port: Option<u16>) -> bool {
    self.host == host && self.port.map_or(true, |p| Some(p) == port)
  }
}

/// Requests the agent declines to handle.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
  path_contains: Vec<String>,
  schemes: Vec<String>,
  hosts: Vec<HostRule>,
}

impl ExclusionRules {
  pub fn from_config(config: &ExcludeConfig) -> Self {
    Self {
      path_contains: config.path_contains.clone(),
      schemes: config.schemes.iter().map(|s| s.to_lowercase()).collect(),
      hosts: config.hosts.iter().map(|h| HostRule::parse(h)).collect(),
    }
  }

  pub fn matches(&self, url: &Url) -> bool {
    if self.schemes.iter().any(|s| s == url.scheme()) {
      return true;
    }

    if self
      .path_contains
      .iter()
      .any(|fragment| url.path().contains(fragment.as_str()))
    {
      return true;
    }

    let Some(host) = url.host_str() else {
      return false;
    };
    let port = url.port_or_known_default();

    self.hosts.iter().any(|rule| rule.matches(host, port))
  }
}

impl OfflineAgent {
  /// Answer a request from a controlled view.
  ///
  /// 1. Excluded requests pass through untouched
  /// 2. Try the network; successful GETs are copied into the current cache
  ///    in the background and returned as-is
  /// 3. On network failure, serve an exact cache match
  /// 4. Navigations that miss fall back to the cached offline document
  /// 5. Anything else gets a synthesized 503
  pub async fn on_fetch(&self, request: &Request) -> FetchOutcome {
    if self.settings.exclude.matches(&request.url) {
      debug!(url = %request.url, "request excluded from interception");
      return FetchOutcome::Passthrough;
    }

    match self.host.network.fetch(request).await {
      Ok(response) => {
        if response.ok() && request.method == Method::GET {
          self.cache_in_background(request.clone(), response.clone());
        }
        FetchOutcome::Respond {
          response,
          source: ResponseSource::Network,
        }
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network unavailable, falling back to cache");
        self.fallback(request)
      }
    }
  }

  /// Best-effort write; never awaited by the caller and never reported back.
  fn cache_in_background(&self, request: Request, response: Response) {
    let caches = Arc::clone(&self.host.caches);
    let name = self.settings.cache_name.clone();

    self.background.spawn_blocking(move || {
      match caches.put(&name, &request, &response) {
        Ok(()) => debug!(cache = %name, url = %request.url, "response cached"),
        Err(e) => warn!(cache = %name, url = %request.url, error = %e, "failed to cache response"),
      }
    });
  }

  fn fallback(&self, request: &Request) -> FetchOutcome {
    if let Some(response) = self.lookup(request) {
      return FetchOutcome::Respond {
        response,
        source: ResponseSource::Cache,
      };
    }

    if request.is_navigation() {
      let document = Request::get(self.settings.offline_document.clone());
      if let Some(response) = self.lookup(&document) {
        return FetchOutcome::Respond {
          response,
          source: ResponseSource::OfflineDocument,
        };
      }
    }

    FetchOutcome::Respond {
      response: Response::offline(),
      source: ResponseSource::Offline,
    }
  }

  /// Storage errors count as a miss.
  fn lookup(&self, request: &Request) -> Option<Response> {
    match self.host.caches.match_any(request) {
      Ok(found) => found.map(|cached| cached.response),
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache lookup failed");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheStorage;
  use crate::config::Config;
  use crate::testing::{url, Harness};

  fn respond(outcome: FetchOutcome) -> (Response, ResponseSource) {
    match outcome {
      FetchOutcome::Respond { response, source } => (response, source),
      FetchOutcome::Passthrough => panic!("expected a response, got passthrough"),
    }
  }

  fn rules() -> ExclusionRules {
    ExclusionRules::from_config(&Config::default().exclude)
  }

  #[test]
  fn test_extension_and_dev_server_requests_are_excluded() {
    let rules = rules();
    assert!(rules.matches(&Url::parse("chrome-extension://abcdef/popup.js").unwrap()));
    assert!(rules.matches(&Url::parse("moz-extension://abcdef/content.js").unwrap()));
    assert!(rules.matches(&Url::parse("http://localhost:8080/sockjs-node/info").unwrap()));
    assert!(rules.matches(&Url::parse("http://localhost:35729/livereload.js").unwrap()));
    assert!(rules.matches(&Url::parse("https://cdn.example/chrome-extension/x.js").unwrap()));
  }

  #[test]
  fn test_application_requests_are_not_excluded() {
    let rules = rules();
    assert!(!rules.matches(&Url::parse("http://localhost:8080/index.html").unwrap()));
    assert!(!rules.matches(&Url::parse("https://studio.example/app.js").unwrap()));
    assert!(!rules.matches(&Url::parse("http://localhost/").unwrap()));
  }

  #[test]
  fn test_host_rule_without_port_matches_any_port() {
    let rules = ExclusionRules::from_config(&ExcludeConfig {
      path_contains: Vec::new(),
      schemes: Vec::new(),
      hosts: vec!["analytics.example".to_string()],
    });
    assert!(rules.matches(&Url::parse("https://analytics.example:8443/collect").unwrap()));
    assert!(!rules.matches(&Url::parse("https://studio.example/").unwrap()));
  }

  #[test]
  fn test_ipv6_host_rules() {
    let rules = ExclusionRules::from_config(&ExcludeConfig {
      path_contains: Vec::new(),
      schemes: Vec::new(),
      hosts: vec!["[::1]".to_string(), "[fe80::2]:3000".to_string()],
    });

    assert!(rules.matches(&Url::parse("http://[::1]:8080/app.js").unwrap()));
    assert!(rules.matches(&Url::parse("http://[::1]/").unwrap()));
    assert!(rules.matches(&Url::parse("http://[fe80::2]:3000/reload").unwrap()));
    assert!(!rules.matches(&Url::parse("http://[fe80::2]:3001/reload").unwrap()));
  }

  #[test]
  fn test_host_rule_parsing() {
    assert_eq!(
      HostRule::parse("LocalHost:35729"),
      HostRule {
        host: "localhost".to_string(),
        port: Some(35729)
      }
    );
    assert_eq!(HostRule::parse("[::1]").port, None);
    assert_eq!(HostRule::parse("[::1]").host, "[::1]");
    assert_eq!(HostRule::parse("example.com:").port, None);
  }

  #[tokio::test]
  async fn test_excluded_request_passes_through_without_network() {
    let harness = Harness::new();
    let request = Request::get(Url::parse("http://localhost:35729/livereload.js").unwrap());

    let outcome = harness.agent.on_fetch(&request).await;

    assert!(matches!(outcome, FetchOutcome::Passthrough));
    assert_eq!(harness.network.calls(), 0);
    assert!(harness.caches.keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_response_returned_unchanged_and_cached() {
    let harness = Harness::new();
    harness.network.route("/app.js", 200, "console.log('hi')");
    let request = Request::get(url("/app.js"));

    let (response, source) = respond(harness.agent.on_fetch(&request).await);
    assert_eq!(source, ResponseSource::Network);
    assert_eq!(response.body, b"console.log('hi')");

    harness.agent.flush_background().await;
    let cached = harness.caches.match_in("makerai-v1.0", &request).unwrap().unwrap();
    assert_eq!(cached.response, response);
  }

  #[tokio::test]
  async fn test_non_ok_responses_are_returned_but_not_cached() {
    let harness = Harness::new();
    harness.network.route("/missing", 404, "Not Found");
    let request = Request::get(url("/missing"));

    let (response, source) = respond(harness.agent.on_fetch(&request).await);
    assert_eq!(source, ResponseSource::Network);
    assert_eq!(response.status, 404);

    harness.agent.flush_background().await;
    assert!(harness.caches.match_any(&request).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_non_get_responses_are_not_cached() {
    let harness = Harness::new();
    harness.network.route("/api/save", 200, "saved");
    let request = Request::get(url("/api/save")).with_method(Method::POST);

    let (response, _) = respond(harness.agent.on_fetch(&request).await);
    assert_eq!(response.body, b"saved");

    harness.agent.flush_background().await;
    assert!(harness.caches.keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_request_served_from_cache_unmodified() {
    let harness = Harness::new();
    harness.network.route("/styles.css", 200, "body { color: red }");
    let request = Request::get(url("/styles.css"));

    let (online, _) = respond(harness.agent.on_fetch(&request).await);
    harness.agent.flush_background().await;

    harness.network.set_offline(true);
    let (offline, source) = respond(harness.agent.on_fetch(&request).await);

    assert_eq!(source, ResponseSource::Cache);
    assert_eq!(offline, online);
  }

  #[tokio::test]
  async fn test_offline_navigation_falls_back_to_offline_document() {
    let harness = Harness::new();
    harness.serve_shell();
    harness.agent.on_install().await.unwrap();
    harness.network.set_offline(true);

    let request = Request::navigate(url("/projects/42"));
    let (response, source) = respond(harness.agent.on_fetch(&request).await);

    assert_eq!(source, ResponseSource::OfflineDocument);
    assert_eq!(response.body, b"<html>index</html>");
  }

  #[tokio::test]
  async fn test_offline_subresource_miss_gets_503() {
    let harness = Harness::new();
    harness.serve_shell();
    harness.agent.on_install().await.unwrap();
    harness.network.set_offline(true);

    let request = Request::get(url("/images/banner.png"));
    let (response, source) = respond(harness.agent.on_fetch(&request).await);

    assert_eq!(source, ResponseSource::Offline);
    assert_eq!(response.status, 503);
    assert_eq!(response.body, b"Offline");
  }

  #[tokio::test]
  async fn test_offline_navigation_without_offline_document_gets_503() {
    let harness = Harness::new();
    harness.network.set_offline(true);

    let (response, source) = respond(
      harness
        .agent
        .on_fetch(&Request::navigate(url("/")))
        .await,
    );

    assert_eq!(source, ResponseSource::Offline);
    assert_eq!(response.status, 503);
  }

  #[tokio::test]
  async fn test_exact_match_wins_over_offline_document() {
    let harness = Harness::new();
    harness.serve_shell();
    harness.network.route("/about", 200, "<html>about</html>");
    harness.agent.on_install().await.unwrap();
    harness.agent.on_fetch(&Request::navigate(url("/about"))).await;
    harness.agent.flush_background().await;

    harness.network.set_offline(true);
    let (response, source) = respond(harness.agent.on_fetch(&Request::navigate(url("/about"))).await);

    assert_eq!(source, ResponseSource::Cache);
    assert_eq!(response.body, b"<html>about</html>");
  }

  #[tokio::test]
  async fn test_custom_offline_document() {
    let harness = Harness::with_config(Config {
      origin: crate::testing::ORIGIN.to_string(),
      precache: vec!["/offline.html".to_string()],
      offline_document: "/offline.html".to_string(),
      ..Config::default()
    });
    harness.network.route("/offline.html", 200, "you are offline");
    harness.agent.on_install().await.unwrap();
    harness.network.set_offline(true);

    let (response, source) = respond(harness.agent.on_fetch(&Request::navigate(url("/x"))).await);
    assert_eq!(source, ResponseSource::OfflineDocument);
    assert_eq!(response.body, b"you are offline");
  }
}
