use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use cadence_core::config::CollaboratorConfig;
use cadence_core::workflow::{
    BoxFuture, DeliveryResult, EntityStore, NewNote, NewTask, NoteStore, NotificationChannel,
    NotificationTransport, TaskStore,
};
use cadence_core::{CadenceError, Result};

/// Collaborators backed by the host platform's REST API.
///
/// Endpoints, relative to `base_url`:
///
/// | Call | Request |
/// |------|---------|
/// | `get_entity` | `GET entities/{id}` (404 means missing) |
/// | `update_entity_status` | `PATCH entities/{id}/status` |
/// | `assign_owner` | `PATCH entities/{id}/owner` |
/// | `create_task` | `POST tasks`, response `{"id": ...}` |
/// | `add_note` | `POST entities/{id}/notes` |
/// | `send` | `POST notifications/{channel}` |
pub struct HttpCollaborators {
    http: Client,
    base_url: Url,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: Value,
}

impl HttpCollaborators {
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CadenceError::Config(format!(
                "invalid collaborators.base_url '{}': {}",
                config.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CadenceError::Config(format!(
                "collaborators.base_url '{}' cannot be used as a base",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CadenceError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(segments))
            .header("Accept", "application/json");
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and fail on any non-success status.
    async fn send_checked(&self, builder: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| CadenceError::Collaborator(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CadenceError::Collaborator(format!(
                "{} returned {}: {}",
                what,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response)
    }
}

impl EntityStore for HttpCollaborators {
    fn get_entity(&self, entity_id: &str) -> BoxFuture<'_, Result<Option<Value>>> {
        let builder = self.request(Method::GET, &["entities", entity_id]);
        let entity_id = entity_id.to_string();
        Box::pin(async move {
            let response = builder.send().await.map_err(|e| {
                CadenceError::Collaborator(format!("loading entity {} failed: {}", entity_id, e))
            })?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(CadenceError::Collaborator(format!(
                    "loading entity {} returned {}",
                    entity_id,
                    response.status()
                )));
            }

            let entity = response.json::<Value>().await.map_err(|e| {
                CadenceError::Collaborator(format!("entity {} is not valid JSON: {}", entity_id, e))
            })?;
            Ok(Some(entity))
        })
    }

    fn update_entity_status(&self, entity_id: &str, status: &str) -> BoxFuture<'_, Result<()>> {
        let builder = self
            .request(Method::PATCH, &["entities", entity_id, "status"])
            .json(&json!({ "status": status }));
        let what = format!("updating status of entity {}", entity_id);
        Box::pin(async move {
            self.send_checked(builder, &what).await?;
            Ok(())
        })
    }

    fn assign_owner(&self, entity_id: &str, owner_id: &str) -> BoxFuture<'_, Result<()>> {
        let builder = self
            .request(Method::PATCH, &["entities", entity_id, "owner"])
            .json(&json!({ "ownerId": owner_id }));
        let what = format!("assigning owner of entity {}", entity_id);
        Box::pin(async move {
            self.send_checked(builder, &what).await?;
            Ok(())
        })
    }
}

impl TaskStore for HttpCollaborators {
    fn create_task(&self, task: NewTask) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let builder = self.request(Method::POST, &["tasks"]).json(&task);
            let response = self.send_checked(builder, "creating task").await?;

            let created = response.json::<CreatedTask>().await.map_err(|e| {
                CadenceError::Collaborator(format!("task response has no id: {}", e))
            })?;
            Ok(match created.id {
                Value::String(id) => id,
                other => other.to_string(),
            })
        })
    }
}

impl NoteStore for HttpCollaborators {
    fn add_note(&self, note: NewNote) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let builder = self
                .request(Method::POST, &["entities", note.entity_id.as_str(), "notes"])
                .json(&note);
            let what = format!("adding note to entity {}", note.entity_id);
            self.send_checked(builder, &what).await?;
            Ok(())
        })
    }
}

impl NotificationTransport for HttpCollaborators {
    fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        data: &Value,
    ) -> BoxFuture<'_, DeliveryResult> {
        let builder = self
            .request(Method::POST, &["notifications", channel.as_str()])
            .json(&json!({ "recipient": recipient, "data": data }));
        let recipient = recipient.to_string();
        Box::pin(async move {
            let what = format!("{} notification to {}", channel, recipient);
            match self.send_checked(builder, &what).await {
                Ok(_) => DeliveryResult::delivered(),
                Err(e) => {
                    tracing::warn!(
                        channel = %channel,
                        recipient = %recipient,
                        error = %e,
                        "Notification not delivered"
                    );
                    DeliveryResult::failed(e.to_string())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> CollaboratorConfig {
        CollaboratorConfig {
            base_url: base_url.to_string(),
            timeout_secs: 1,
            api_token: Some("secret".into()),
        }
    }

    #[test]
    fn test_urls_are_joined_and_encoded() {
        let http = HttpCollaborators::new(&config("http://localhost:3000/api/")).unwrap();
        assert_eq!(
            http.url(&["entities", "cand-1", "notes"]).as_str(),
            "http://localhost:3000/api/entities/cand-1/notes"
        );
        assert_eq!(
            http.url(&["entities", "a/b c"]).as_str(),
            "http://localhost:3000/api/entities/a%2Fb%20c"
        );

        let http = HttpCollaborators::new(&config("http://localhost:3000/api")).unwrap();
        assert_eq!(http.url(&["tasks"]).as_str(), "http://localhost:3000/api/tasks");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpCollaborators::new(&config("not a url")),
            Err(CadenceError::Config(_))
        ));
        assert!(matches!(
            HttpCollaborators::new(&config("mailto:ops@example.com")),
            Err(CadenceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_transport_reports_failure() {
        // Port 9 (discard) on loopback is closed in test environments.
        let http = HttpCollaborators::new(&config("http://127.0.0.1:9/api")).unwrap();
        let result = http
            .send(NotificationChannel::Email, "ada@example.com", &json!({"template": "generic"}))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("notification to ada@example.com"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_collaborator_error() {
        let http = HttpCollaborators::new(&config("http://127.0.0.1:9/api")).unwrap();
        let err = http.get_entity("cand-1").await.unwrap_err();
        assert!(matches!(err, CadenceError::Collaborator(_)));
    }
}
