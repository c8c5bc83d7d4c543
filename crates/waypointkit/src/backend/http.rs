//! HTTPS backend for the HCP Waypoint API.
//!
//! Projects live in the resource manager API; templates, actions and
//! applications live under `organizations/{org}/projects/{project}` in the
//! Waypoint API. All bodies are JSON.

use crate::backend::{Backend, BackendError, BackendResult};
use crate::types::{
    ActionSpec, ActionState, ApplicationSpec, ApplicationState, Location, ProjectSpec,
    ProjectState, TemplateSpec, TemplateState,
};
use crate::variables::InputVariable;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use urlencoding::encode;
use ureq::http::Response;
use ureq::{Body, RequestBuilder};

/// Default API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.cloud.hashicorp.com";

const RESOURCE_MANAGER_VERSION: &str = "2019-12-10";
const WAYPOINT_VERSION: &str = "2024-11-22";

/// Backend that talks to the Waypoint API over HTTPS.
///
/// # Example
///
/// ```no_run
/// use waypointkit::backend::http::HttpBackend;
/// use waypointkit::backend::Backend;
///
/// let backend = HttpBackend::new().with_token("secret");
/// let project = backend.get_project("prj-1234").unwrap();
/// println!("{} belongs to {}", project.name, project.parent_organization_id);
/// ```
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL.
    api_base: String,
    /// Static bearer token, if any.
    token: Option<String>,
}

impl HttpBackend {
    /// Create a backend for the public API with a 30 second timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Create a backend with a custom API base (for testing).
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self::with_timeout(api_base, Duration::from_secs(30))
    }

    /// Create a backend with a custom API base and request timeout.
    #[must_use]
    pub fn with_timeout(api_base: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Authenticate every request with a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn projects_url(&self) -> String {
        format!("{}/resource-manager/{RESOURCE_MANAGER_VERSION}/projects", self.api_base)
    }

    fn project_url(&self, project_id: &str) -> String {
        format!("{}/{}", self.projects_url(), encode(project_id))
    }

    /// Collection URL for a Waypoint kind (`templates`, `actions`, `applications`).
    fn collection_url(&self, location: &Location, collection: &str) -> String {
        format!(
            "{}/waypoint/{WAYPOINT_VERSION}/organizations/{}/projects/{}/{collection}",
            self.api_base,
            encode(location.organization_id()),
            encode(location.project_id())
        )
    }

    /// IDs are percent-encoded so each one stays a single path segment.
    fn entity_url(&self, location: &Location, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(location, collection), encode(id))
    }

    fn prepare<B>(&self, request: RequestBuilder<B>) -> RequestBuilder<B> {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> BackendResult<T> {
        log::debug!("GET {url}");
        decode(self.prepare(self.agent.get(url)).call()?)
    }

    fn post<T: DeserializeOwned>(&self, url: &str, body: &impl Serialize) -> BackendResult<T> {
        log::debug!("POST {url}");
        decode(self.prepare(self.agent.post(url)).send_json(body)?)
    }

    fn patch<T: DeserializeOwned>(&self, url: &str, body: &impl Serialize) -> BackendResult<T> {
        log::debug!("PATCH {url}");
        decode(self.prepare(self.agent.patch(url)).send_json(body)?)
    }

    fn delete(&self, url: &str) -> BackendResult<()> {
        log::debug!("DELETE {url}");
        let mut response = self.prepare(self.agent.delete(url)).call()?;
        check_status(&mut response)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ureq::Error> for BackendError {
    fn from(err: ureq::Error) -> Self {
        BackendError::transport(err.to_string())
    }
}

fn check_status(response: &mut Response<Body>) -> BackendResult<()> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let text = response.body_mut().read_to_string().unwrap_or_default();
    Err(BackendError::new(Some(status), error_message(status, &text)))
}

fn decode<T: DeserializeOwned>(mut response: Response<Body>) -> BackendResult<T> {
    check_status(&mut response)?;
    let status = response.status().as_u16();
    response
        .body_mut()
        .read_json()
        .map_err(|e| BackendError::new(Some(status), format!("invalid response body: {e}")))
}

/// Pull the `message` field out of an error body, falling back to the raw text.
fn error_message(status: u16, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() => parsed.message,
        _ if body.trim().is_empty() => format!("HTTP {status}"),
        _ => body.trim().to_string(),
    }
}

impl Backend for HttpBackend {
    fn get_project(&self, project_id: &str) -> BackendResult<ProjectState> {
        let envelope: ProjectEnvelope = self.get(&self.project_url(project_id))?;
        Ok(envelope.project.into())
    }

    fn create_project(&self, organization_id: &str, spec: &ProjectSpec) -> BackendResult<ProjectState> {
        let body = CreateProjectBody {
            name: &spec.name,
            description: &spec.description,
            parent: WireParent {
                kind: "ORGANIZATION".to_string(),
                id: organization_id.to_string(),
            },
        };
        let envelope: ProjectEnvelope = self.post(&self.projects_url(), &body)?;
        Ok(envelope.project.into())
    }

    fn update_project(&self, project_id: &str, spec: &ProjectSpec) -> BackendResult<ProjectState> {
        let body = UpdateProjectBody {
            name: &spec.name,
            description: &spec.description,
        };
        let envelope: ProjectEnvelope = self.patch(&self.project_url(project_id), &body)?;
        Ok(envelope.project.into())
    }

    fn delete_project(&self, project_id: &str) -> BackendResult<()> {
        self.delete(&self.project_url(project_id))
    }

    fn get_template(&self, location: &Location, id: &str) -> BackendResult<TemplateState> {
        let envelope: TemplateEnvelope = self.get(&self.entity_url(location, "templates", id))?;
        Ok(envelope.template)
    }

    fn create_template(&self, location: &Location, spec: &TemplateSpec) -> BackendResult<TemplateState> {
        let envelope: TemplateEnvelope = self.post(
            &self.collection_url(location, "templates"),
            &TemplateBody { template: spec },
        )?;
        Ok(envelope.template)
    }

    fn update_template(&self, location: &Location, id: &str, spec: &TemplateSpec) -> BackendResult<TemplateState> {
        let envelope: TemplateEnvelope = self.patch(
            &self.entity_url(location, "templates", id),
            &TemplateBody { template: spec },
        )?;
        Ok(envelope.template)
    }

    fn delete_template(&self, location: &Location, id: &str) -> BackendResult<()> {
        self.delete(&self.entity_url(location, "templates", id))
    }

    fn get_action(&self, location: &Location, id: &str) -> BackendResult<ActionState> {
        let envelope: ActionEnvelope = self.get(&self.entity_url(location, "actions", id))?;
        Ok(envelope.action)
    }

    fn create_action(&self, location: &Location, spec: &ActionSpec) -> BackendResult<ActionState> {
        let envelope: ActionEnvelope =
            self.post(&self.collection_url(location, "actions"), &ActionBody { action: spec })?;
        Ok(envelope.action)
    }

    fn update_action(&self, location: &Location, id: &str, spec: &ActionSpec) -> BackendResult<ActionState> {
        let envelope: ActionEnvelope =
            self.patch(&self.entity_url(location, "actions", id), &ActionBody { action: spec })?;
        Ok(envelope.action)
    }

    fn delete_action(&self, location: &Location, id: &str) -> BackendResult<()> {
        self.delete(&self.entity_url(location, "actions", id))
    }

    fn get_application(&self, location: &Location, id: &str) -> BackendResult<ApplicationState> {
        let envelope: ApplicationEnvelope = self.get(&self.entity_url(location, "applications", id))?;
        Ok(envelope.application.into())
    }

    fn create_application(&self, location: &Location, spec: &ApplicationSpec) -> BackendResult<ApplicationState> {
        let envelope: ApplicationEnvelope = self.post(
            &self.collection_url(location, "applications"),
            &ApplicationBody::from(spec),
        )?;
        Ok(envelope.application.into())
    }

    fn update_application(
        &self,
        location: &Location,
        id: &str,
        spec: &ApplicationSpec,
    ) -> BackendResult<ApplicationState> {
        let envelope: ApplicationEnvelope = self.patch(
            &self.entity_url(location, "applications", id),
            &ApplicationBody::from(spec),
        )?;
        Ok(envelope.application.into())
    }

    fn delete_application(&self, location: &Location, id: &str) -> BackendResult<()> {
        self.delete(&self.entity_url(location, "applications", id))
    }
}

// Wire types for the resource manager API

#[derive(Debug, Deserialize)]
struct ProjectEnvelope {
    project: WireProject,
}

#[derive(Debug, Deserialize)]
struct WireProject {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    parent: WireParent,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireParent {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateProjectBody<'a> {
    name: &'a str,
    description: &'a str,
    parent: WireParent,
}

#[derive(Debug, Serialize)]
struct UpdateProjectBody<'a> {
    name: &'a str,
    description: &'a str,
}

impl From<WireProject> for ProjectState {
    fn from(p: WireProject) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            parent_organization_id: p.parent.id,
        }
    }
}

// Wire types for the Waypoint API

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    template: &'a TemplateSpec,
}

#[derive(Debug, Deserialize)]
struct TemplateEnvelope {
    template: TemplateState,
}

#[derive(Debug, Serialize)]
struct ActionBody<'a> {
    action: &'a ActionSpec,
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: ActionState,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRef {
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
}

impl WireRef {
    fn id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApplicationBody<'a> {
    name: &'a str,
    template: WireRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    readme_markdown: Option<&'a str>,
    actions: Vec<WireRef>,
    variables: &'a [InputVariable],
}

impl<'a> From<&'a ApplicationSpec> for ApplicationBody<'a> {
    fn from(spec: &'a ApplicationSpec) -> Self {
        Self {
            name: &spec.name,
            template: WireRef::id(&spec.template_id),
            readme_markdown: spec.readme_markdown.as_deref(),
            actions: spec.actions.iter().map(|id| WireRef::id(id)).collect(),
            variables: &spec.application_input_variables,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApplicationEnvelope {
    application: WireApplication,
}

#[derive(Debug, Deserialize)]
struct WireApplication {
    id: String,
    name: String,
    template: WireRef,
    #[serde(default)]
    readme_markdown: Option<String>,
    #[serde(default)]
    actions: Vec<WireRef>,
    #[serde(default)]
    application_input_variables: Vec<InputVariable>,
    #[serde(default)]
    template_input_variables: Vec<InputVariable>,
}

impl From<WireApplication> for ApplicationState {
    fn from(a: WireApplication) -> Self {
        Self {
            id: a.id,
            name: a.name,
            template_id: a.template.id,
            template_name: a.template.name,
            readme_markdown: a.readme_markdown,
            action_ids: a.actions.into_iter().map(|r| r.id).collect(),
            application_input_variables: a.application_input_variables,
            template_input_variables: a.template_input_variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ErrorClass;
    use crate::variables::VariableValue;
    use mockito::{Matcher, Server};

    fn location() -> Location {
        Location::new("org-1", "prj-1").unwrap()
    }

    #[test]
    fn test_urls() {
        let backend = HttpBackend::with_api_base("https://example.com/");
        assert_eq!(backend.api_base(), "https://example.com");
        assert_eq!(
            backend.project_url("prj-1"),
            "https://example.com/resource-manager/2019-12-10/projects/prj-1"
        );
        assert_eq!(
            backend.entity_url(&location(), "templates", "tpl-1"),
            "https://example.com/waypoint/2024-11-22/organizations/org-1/projects/prj-1/templates/tpl-1"
        );
    }

    #[test]
    fn test_ids_stay_in_one_path_segment() {
        let backend = HttpBackend::with_api_base("https://example.com");
        assert_eq!(
            backend.project_url("prj/../x?y"),
            "https://example.com/resource-manager/2019-12-10/projects/prj%2F..%2Fx%3Fy"
        );
        let odd = Location::new("org 1", "prj#2").unwrap();
        assert_eq!(
            backend.entity_url(&odd, "actions", "act/1"),
            "https://example.com/waypoint/2024-11-22/organizations/org%201/projects/prj%232/actions/act%2F1"
        );
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(400, r#"{"code":3,"message":"bad name"}"#), "bad name");
        assert_eq!(error_message(502, "Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(500, ""), "HTTP 500");
    }

    #[test]
    fn test_get_project_with_token() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/resource-manager/2019-12-10/projects/prj-1")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"project":{"id":"prj-1","name":"demo","description":"d","parent":{"type":"ORGANIZATION","id":"org-1"}}}"#,
            )
            .create();

        let backend = HttpBackend::with_api_base(server.url()).with_token("secret");
        let project = backend.get_project("prj-1").unwrap();

        mock.assert();
        assert_eq!(project.name, "demo");
        assert_eq!(project.parent_organization_id, "org-1");
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let mut server = Server::new();
        let _mock = server
            .mock(
                "GET",
                "/waypoint/2024-11-22/organizations/org-1/projects/prj-1/templates/tpl-9",
            )
            .with_status(404)
            .with_body(r#"{"code":5,"message":"template not found"}"#)
            .create();

        let backend = HttpBackend::with_api_base(server.url());
        let err = backend.get_template(&location(), "tpl-9").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message, "template not found");
    }

    #[test]
    fn test_server_error_is_transient() {
        let mut server = Server::new();
        let _mock = server
            .mock(
                "DELETE",
                "/waypoint/2024-11-22/organizations/org-1/projects/prj-1/actions/act-1",
            )
            .with_status(503)
            .create();

        let backend = HttpBackend::with_api_base(server.url());
        let err = backend.delete_action(&location(), "act-1").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_create_application_wire_shape() {
        let mut server = Server::new();
        let mock = server
            .mock(
                "POST",
                "/waypoint/2024-11-22/organizations/org-1/projects/prj-1/applications",
            )
            .match_body(Matcher::PartialJson(serde_json::json!({
                "name": "app1",
                "template": {"id": "tpl-1"},
                "actions": [{"id": "act-1"}],
                "variables": [{"name": "faction", "variable_type": "string", "value": "ncr"}]
            })))
            .with_status(200)
            .with_body(
                r#"{"application":{"id":"app-1","name":"app1","template":{"id":"tpl-1","name":"starter"},
                "actions":[{"id":"act-1"}],
                "application_input_variables":[{"name":"faction","variable_type":"string","value":"ncr"}],
                "template_input_variables":[{"name":"waypoint_application","variable_type":"string","value":"app1"}]}}"#,
            )
            .create();

        let spec = ApplicationSpec::new("app1", "tpl-1")
            .with_action("act-1")
            .with_input(InputVariable::string("faction", "ncr"));
        let backend = HttpBackend::with_api_base(server.url());
        let state = backend.create_application(&location(), &spec).unwrap();

        mock.assert();
        assert_eq!(state.template_name, "starter");
        assert!(state.action_ids.contains("act-1"));
        assert_eq!(
            state.application_input_variables[0].value,
            VariableValue::String("ncr".into())
        );
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        let backend = HttpBackend::with_timeout("http://127.0.0.1:1", Duration::from_millis(200));
        let err = backend.get_project("prj-1").unwrap_err();
        assert_eq!(err.status, None);
        assert_eq!(err.class(), ErrorClass::Transient);
    }
}
