/// GraphQL-over-HTTP gateway

use crate::{
    error::{Error, Result},
    feed::{Cursor, NotificationPage, NotificationRecord},
    gateway::RemoteGateway,
    settings::PreferencePatch,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

pub const UPDATE_USER_SETTINGS_MUTATION: &str = r#"
mutation UpdateUserSettings($data: UpdateSettingsInput!) {
  updateUserSettings(data: $data) {
    updatedAt
  }
}
"#;

pub const NOTIFICATIONS_QUERY: &str = r#"
query Notifications($first: Int, $after: String) {
  notifications(first: $first, after: $after) {
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        id
        type
        icon
        title
        description
        targetUrl
        image
        createdAt
        readAt
        avatars { type image name targetUrl referenceId }
        attachments { type image title }
      }
    }
  }
}
"#;

pub const READ_NOTIFICATIONS_MUTATION: &str = r#"
mutation ReadNotifications {
  readNotifications {
    _
  }
}
"#;

/// GraphQL endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQLConfig {
    /// Endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.daily.dev/graphql".to_string(),
            timeout_seconds: 30,
            user_agent: format!("feedsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GraphQLConfig {
    /// Parsed endpoint, rejecting non-HTTP schemes
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::Config(format!("unsupported endpoint scheme: {}", scheme))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct NotificationsData {
    notifications: NotificationConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationConnection {
    page_info: Option<PageInfo>,
    #[serde(default)]
    edges: Vec<NotificationEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationEdge {
    node: NotificationRecord,
}

impl NotificationConnection {
    fn into_page(self) -> Result<NotificationPage> {
        let page_info = self
            .page_info
            .ok_or_else(|| Error::MalformedResponse("notifications without pageInfo".to_string()))?;

        let next_cursor = match (page_info.has_next_page, page_info.end_cursor) {
            (true, Some(cursor)) => Some(Cursor(cursor)),
            (true, None) => {
                return Err(Error::MalformedResponse(
                    "hasNextPage without endCursor".to_string(),
                ))
            }
            (false, _) => None,
        };

        let records = self.edges.into_iter().map(|edge| edge.node).collect();
        Ok(NotificationPage::new(records, next_cursor))
    }
}

/// Decode a GraphQL response body into its `data` payload
fn decode_response<T: DeserializeOwned>(body: serde_json::Value) -> Result<T> {
    let response: GraphQLResponse<T> = serde_json::from_value(body)
        .map_err(|e| Error::MalformedResponse(format!("unexpected response shape: {}", e)))?;

    if let Some(error) = response.errors.first() {
        return Err(Error::RemoteUnavailable(error.message.clone()));
    }

    response
        .data
        .ok_or_else(|| Error::MalformedResponse("response without data".to_string()))
}

/// Gateway talking to a GraphQL endpoint over HTTP
pub struct GraphQLGateway {
    client: reqwest::Client,
    endpoint: Url,
    bearer_token: RwLock<Option<String>>,
}

impl GraphQLGateway {
    pub fn new(config: &GraphQLConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            bearer_token: RwLock::new(None),
        })
    }

    /// Token attached to subsequent requests; obtained elsewhere
    pub async fn set_bearer_token(&self, token: Option<String>) {
        *self.bearer_token.write().await = token;
    }

    async fn request<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> Result<T> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "query": query, "variables": variables }));

        if let Some(token) = self.bearer_token.read().await.as_ref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        decode_response(body).map_err(|e| {
            warn!("GraphQL request failed ({}): {}", e.kind(), e);
            e
        })
    }
}

#[async_trait]
impl RemoteGateway for GraphQLGateway {
    async fn persist_preferences(&self, patch: &PreferencePatch) -> Result<()> {
        debug!("Persisting {} preference(s)", patch.len());
        let _: serde_json::Value = self
            .request(UPDATE_USER_SETTINGS_MUTATION, json!({ "data": patch }))
            .await?;
        Ok(())
    }

    async fn fetch_notification_page(
        &self,
        cursor: Option<&Cursor>,
        page_size: u32,
    ) -> Result<NotificationPage> {
        debug!("Fetching notifications after {:?}", cursor);
        let data: NotificationsData = self
            .request(
                NOTIFICATIONS_QUERY,
                json!({ "first": page_size, "after": cursor.map(Cursor::as_str) }),
            )
            .await?;
        data.notifications.into_page()
    }

    async fn mark_notifications_read(&self) -> Result<()> {
        let _: serde_json::Value = self.request(READ_NOTIFICATIONS_MUTATION, json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::NotificationType;

    fn notifications_body(page_info: serde_json::Value) -> serde_json::Value {
        json!({
            "data": {
                "notifications": {
                    "pageInfo": page_info,
                    "edges": [
                        { "node": { "id": "1", "type": "comment_reply", "readAt": null, "title": "Reply" } },
                        { "node": { "id": "2", "type": "article_picked", "readAt": "2023-01-05T10:00:00Z" } }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_decode_page_with_next_cursor() {
        let body = notifications_body(json!({ "hasNextPage": true, "endCursor": "abc" }));
        let data: NotificationsData = decode_response(body).unwrap();
        let page = data.notifications.into_page().unwrap();

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].kind, NotificationType::CommentReply);
        assert!(page.records[0].is_unread());
        assert!(!page.records[1].is_unread());
        assert_eq!(page.next_cursor, Some(Cursor::new("abc")));
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let body = notifications_body(json!({ "hasNextPage": false, "endCursor": "abc" }));
        let data: NotificationsData = decode_response(body).unwrap();
        assert!(!data.notifications.into_page().unwrap().has_next_page());
    }

    #[test]
    fn test_missing_page_info_is_malformed() {
        let body = json!({ "data": { "notifications": { "edges": [] } } });
        let data: NotificationsData = decode_response(body).unwrap();
        assert!(matches!(data.notifications.into_page(), Err(Error::MalformedResponse(_))));

        let body = notifications_body(json!({ "hasNextPage": true, "endCursor": null }));
        let data: NotificationsData = decode_response(body).unwrap();
        assert!(matches!(data.notifications.into_page(), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_graphql_errors_are_remote_failures() {
        let body = json!({ "data": null, "errors": [{ "message": "Access denied!" }] });
        let result: Result<serde_json::Value> = decode_response(body);
        assert_eq!(result.unwrap_err(), Error::RemoteUnavailable("Access denied!".to_string()));

        let result: Result<NotificationsData> = decode_response(json!({ "data": null }));
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(GraphQLConfig::default().endpoint_url().is_ok());

        let config = GraphQLConfig {
            endpoint: "ftp://example.com".to_string(),
            ..GraphQLConfig::default()
        };
        assert!(matches!(config.endpoint_url(), Err(Error::Config(_))));
        assert!(GraphQLGateway::new(&config).is_err());
    }
}
