//! Authenticated Tower API client with offset-based pagination

use std::env;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Number of items requested per page on list endpoints.
const PAGE_SIZE: usize = 50;

/// Key carrying the declared total item count on paginated responses.
const TOTAL_SIZE_KEY: &str = "totalSize";

/// Connection settings for one Tower instance.
///
/// Built explicitly and passed into the engine; no ambient process state is
/// read after construction.
#[derive(Debug, Clone)]
pub struct TowerConfig {
    pub base_url: String,
    pub token: String,
    pub debug: bool,
}

impl TowerConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            debug: false,
        }
    }

    /// Read the Tower token and API URL from the environment.
    pub fn from_env() -> Result<Self> {
        let token = env::var("NXF_TOWER_TOKEN")
            .or_else(|_| env::var("TOWER_ACCESS_TOKEN"))
            .map_err(|_| {
                Error::Config(
                    "The 'NXF_TOWER_TOKEN' environment variable must be defined \
                     with a Nextflow Tower API token."
                        .to_string(),
                )
            })?;
        let base_url = env::var("NXF_TOWER_API_URL")
            .or_else(|_| env::var("TOWER_API_ENDPOINT"))
            .map_err(|_| {
                Error::Config(
                    "The 'NXF_TOWER_API_URL' environment variable must be defined \
                     with a Nextflow Tower API URL."
                        .to_string(),
                )
            })?;
        Ok(Self::new(base_url, token))
    }

    /// Enable verbose request/response echo.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Client for the Nextflow Tower API.
pub struct TowerClient {
    http: Client,
    config: TowerConfig,
}

impl TowerClient {
    pub fn new(config: TowerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Make one authenticated request to the Tower API.
    ///
    /// A response body that fails to parse as JSON yields an empty object,
    /// never an error; conflict conditions are reported by Tower inside the
    /// body's `message` field rather than through status codes.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.config.token)
            .query(params);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let result: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| Value::Object(Map::new()));
        if self.config.debug {
            debug!(
                endpoint = %format!("{method} {url}"),
                ?params,
                payload = %body.map(|b| b.to_string()).unwrap_or_default(),
                status = %status,
                response = %result,
                "tower api exchange"
            );
        }
        Ok(result)
    }

    /// Iterate through pages of results for a given list endpoint.
    ///
    /// Follows the offset/limit convention: each page declares the total
    /// item count under `totalSize` and carries its items under the first
    /// remaining array-valued key. Iteration stops once the number of
    /// collected items reaches the declared total.
    pub async fn paged(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut total_size = 1; // Artificial value for initiating the loop
        while items.len() < total_size {
            let mut page_params = params.to_vec();
            let max = PAGE_SIZE.to_string();
            let offset = items.len().to_string();
            page_params.push(("max", max));
            page_params.push(("offset", offset));
            let mut response = self
                .call(method.clone(), endpoint, &page_params, None)
                .await?;
            let Some(fields) = response.as_object_mut() else {
                break;
            };
            total_size = fields
                .remove(TOTAL_SIZE_KEY)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            let Some(page_items) = fields.values_mut().find_map(Value::as_array_mut)
            else {
                break;
            };
            items.append(page_items);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> TowerClient {
        TowerClient::new(TowerConfig::new(server.uri(), "test-token")).unwrap()
    }

    #[tokio::test]
    async fn test_call_returns_empty_object_on_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/compute-envs/abc"))
            .respond_with(ResponseTemplate::new(204).set_body_string(""))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client
            .call(Method::DELETE, "/compute-envs/abc", &[], None)
            .await
            .unwrap();
        assert_eq!(response, json!({}));
    }

    #[tokio::test]
    async fn test_call_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs"))
            .and(wiremock::matchers::header(
                "authorization",
                "Bearer test-token",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organizations": [],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client.call(Method::GET, "/orgs", &[], None).await.unwrap();
        assert!(response["organizations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_debug_echo_leaves_response_intact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orgs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organization": {"orgId": 1},
            })))
            .mount(&server)
            .await;

        let config = TowerConfig::new(server.uri(), "test-token").with_debug(true);
        let client = TowerClient::new(config).unwrap();
        let response = client
            .call(Method::POST, "/orgs", &[], Some(&json!({"name": "x"})))
            .await
            .unwrap();
        assert_eq!(response["organization"]["orgId"], 1);
    }

    #[tokio::test]
    async fn test_paged_follows_offsets_until_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/1/teams"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": (0..50).map(|i| json!({"teamId": i})).collect::<Vec<_>>(),
                "totalSize": 52,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/1/teams"))
            .and(query_param("offset", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": [{"teamId": 50}, {"teamId": 51}],
                "totalSize": 52,
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let items = client
            .paged(Method::GET, "/orgs/1/teams", &[])
            .await
            .unwrap();
        assert_eq!(items.len(), 52);
        assert_eq!(items[51]["teamId"], 51);
    }

    #[tokio::test]
    async fn test_paged_stops_when_total_size_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/1/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "members": [{"memberId": 1}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let items = client
            .paged(Method::GET, "/orgs/1/members", &[])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
    }
}
