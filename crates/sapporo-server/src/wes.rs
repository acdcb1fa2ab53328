//! GA4GH WES client
//!
//! Only the three calls the web front end needs: reading service-info,
//! submitting a run and polling its status.

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

use sapporo_core::RunState;

use crate::error::{ServerError, ServerResult};

/// Versions of one workflow language accepted by a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTypeVersions {
    #[serde(default)]
    pub workflow_type_version: Vec<String>,
}

/// The parts of `GET /service-info` the console stores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub workflow_type_versions: BTreeMap<String, WorkflowTypeVersions>,
    #[serde(default)]
    pub supported_wes_versions: Vec<String>,
    #[serde(default)]
    pub workflow_engine_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_instructions_url: Option<String>,
    #[serde(default)]
    pub contact_info_url: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, serde_json::Value>,
}

/// Body of `POST /runs`, sent as multipart form fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    pub workflow_params: String,
    pub workflow_type: String,
    pub workflow_type_version: String,
    pub tags: String,
    pub workflow_engine_name: Option<String>,
    pub workflow_engine_parameters: String,
    pub workflow_url: String,
    pub workflow_name: Option<String>,
}

impl RunRequest {
    fn into_form(self) -> Form {
        let mut form = Form::new()
            .text("workflow_params", self.workflow_params)
            .text("workflow_type", self.workflow_type)
            .text("workflow_type_version", self.workflow_type_version)
            .text("tags", self.tags)
            .text("workflow_engine_parameters", self.workflow_engine_parameters)
            .text("workflow_url", self.workflow_url);
        if let Some(name) = self.workflow_engine_name {
            form = form.text("workflow_engine_name", name);
        }
        if let Some(name) = self.workflow_name {
            form = form.text("workflow_name", name);
        }
        form
    }
}

#[derive(Debug, Deserialize)]
struct RunId {
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct RunStatus {
    state: String,
}

/// Client for a WES endpoint
#[async_trait]
pub trait WesClient: Send + Sync + Debug {
    /// `GET <endpoint>/service-info`
    async fn service_info(&self, endpoint: &str) -> ServerResult<ServiceInfo>;

    /// `POST <endpoint>/runs`, returning the remote run id
    async fn submit_run(&self, endpoint: &str, request: &RunRequest) -> ServerResult<String>;

    /// `GET <endpoint>/runs/<run_id>/status`
    async fn run_status(&self, endpoint: &str, run_id: &str) -> ServerResult<RunState>;
}

/// reqwest implementation of [`WesClient`]
#[derive(Debug, Clone)]
pub struct ReqwestWesClient {
    client: Client,
}

impl ReqwestWesClient {
    pub fn new(timeout: Duration) -> ServerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Endpoint URL with `segments` appended, each one percent-encoded
    fn url(endpoint: &str, segments: &[&str]) -> ServerResult<Url> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| ServerError::WesError(format!("Invalid endpoint {}: {}", endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| ServerError::WesError(format!("Endpoint {} cannot be a base URL", endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response, what: &str) -> ServerResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ServerError::WesError(format!("{} returned {}: {}", what, status, body)))
    }
}

#[async_trait]
impl WesClient for ReqwestWesClient {
    async fn service_info(&self, endpoint: &str) -> ServerResult<ServiceInfo> {
        let url = Self::url(endpoint, &["service-info"])?;
        debug!(%url, "Fetching service-info");
        let response = self.client.get(url).send().await?;
        let response = Self::check(response, "service-info").await?;
        Ok(response.json::<ServiceInfo>().await?)
    }

    async fn submit_run(&self, endpoint: &str, request: &RunRequest) -> ServerResult<String> {
        let url = Self::url(endpoint, &["runs"])?;
        let response = self
            .client
            .post(url.clone())
            .multipart(request.clone().into_form())
            .send()
            .await?;
        let response = Self::check(response, "POST /runs").await?;
        let RunId { run_id } = response.json().await?;
        info!(%url, %run_id, "Submitted run");
        Ok(run_id)
    }

    async fn run_status(&self, endpoint: &str, run_id: &str) -> ServerResult<RunState> {
        let url = Self::url(endpoint, &["runs", run_id, "status"])?;
        let response = self.client.get(url).send().await?;
        let response = Self::check(response, "run status").await?;
        let status: RunStatus = response.json().await?;
        Ok(status.state.parse().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> ReqwestWesClient {
        ReqwestWesClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn reads_service_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service-info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "workflow_type_versions": {"CWL": {"workflow_type_version": ["v1.0", "v1.2"]}},
                "supported_wes_versions": ["sapporo-wes-1.0.1"],
                "workflow_engine_versions": {"cwltool": "3.1"},
                "system_state_counts": {},
                "tags": {"wes_name": "sapporo"}
            })))
            .mount(&server)
            .await;

        let info = client().service_info(&format!("{}/", server.uri())).await.unwrap();
        assert_eq!(info.supported_wes_versions, vec!["sapporo-wes-1.0.1"]);
        assert_eq!(info.workflow_engine_versions["cwltool"], "3.1");
        assert_eq!(info.workflow_type_versions["CWL"].workflow_type_version.len(), 2);
        assert_eq!(info.auth_instructions_url, None);
    }

    #[tokio::test]
    async fn submits_and_polls_runs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "abc-123"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runs/abc-123/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"run_id": "abc-123", "state": "RUNNING"})),
            )
            .mount(&server)
            .await;

        let request = RunRequest {
            workflow_params: "{}".to_string(),
            workflow_type: "CWL".to_string(),
            workflow_type_version: "v1.0".to_string(),
            tags: "{}".to_string(),
            workflow_engine_name: Some("cwltool".to_string()),
            workflow_engine_parameters: "{}".to_string(),
            workflow_url: "https://example.com/wf.cwl".to_string(),
            workflow_name: None,
        };
        let client = client();
        let run_id = client.submit_run(&server.uri(), &request).await.unwrap();
        assert_eq!(run_id, "abc-123");
        let state = client.run_status(&server.uri(), &run_id).await.unwrap();
        assert_eq!(state, RunState::Running);
    }

    #[tokio::test]
    async fn error_status_becomes_wes_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service-info"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client().service_info(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ServerError::WesError(ref msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn run_ids_are_encoded_as_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wes/runs/a%2Fb%3Fc/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"run_id": "a/b?c", "state": "COMPLETE"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/wes/", server.uri());
        let state = client().run_status(&endpoint, "a/b?c").await.unwrap();
        assert_eq!(state, RunState::Complete);
    }

    #[test]
    fn endpoint_must_be_a_base_url() {
        assert!(matches!(
            ReqwestWesClient::url("mailto:wes@example.com", &["runs"]),
            Err(ServerError::WesError(_))
        ));
        assert!(matches!(
            ReqwestWesClient::url("not a url", &["runs"]),
            Err(ServerError::WesError(_))
        ));
    }

    #[tokio::test]
    async fn unknown_states_fall_back_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/runs/r1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "r1", "state": "WEIRD"})))
            .mount(&server)
            .await;

        let state = client().run_status(&server.uri(), "r1").await.unwrap();
        assert_eq!(state, RunState::Unknown);
    }
}
