// HTTP client wrapper for the Lendwise API
//
// Plain JSON reads plus channel subscriptions over Server-Sent Events.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use lendwise_core::{LibraryStats, Loan, Transaction};
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::live::Prop;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found")]
    NotFound,

    #[error("Event stream error: {0}")]
    Stream(String),
}

/// Props returned by `GET /v1/dashboard`. Props that were not requested are absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<LibraryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loans: Option<Vec<Loan>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
}

/// One SSE frame received on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: String,
    /// SSE event name: `connected` or a dotted status event
    pub event: String,
    /// Message id, shared by the copies of one event on different channels
    pub id: String,
    pub data: String,
}

pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn stats(&self) -> Result<LibraryStats, ClientError> {
        self.get("/v1/stats").await
    }

    /// Fetch only the named props
    pub async fn dashboard(&self, props: &[Prop]) -> Result<DashboardData, ClientError> {
        let only = props
            .iter()
            .map(|prop| prop.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.get(&format!("/v1/dashboard?only={}", only)).await
    }

    /// Subscribe to a broadcast channel. Dropping the stream closes the
    /// connection, which unsubscribes on the server.
    pub async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<impl Stream<Item = Result<ChannelEvent, ClientError>>, ClientError> {
        let url = format!("{}/v1/channels/{}/sse", self.base_url, channel);
        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        let channel = channel.to_string();
        Ok(response
            .bytes_stream()
            .eventsource()
            .map(move |item| match item {
                Ok(event) => Ok(ChannelEvent {
                    channel: channel.clone(),
                    event: event.event,
                    id: event.id,
                    data: event.data,
                }),
                Err(e) => Err(ClientError::Stream(e.to_string())),
            }))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound);
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_stats_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "active_loans": 3,
                "overdue_loans": 1,
                "today_returns": 2,
                "available_books": 40
            })))
            .mount(&server)
            .await;

        let stats = Client::new(&server.uri()).stats().await.unwrap();
        assert_eq!(stats.active_loans, 3);
        assert_eq!(stats.available_books, 40);
    }

    #[tokio::test]
    async fn test_dashboard_requests_only_planned_props() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/dashboard"))
            .and(query_param("only", "loans,stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stats": {
                    "active_loans": 0,
                    "overdue_loans": 0,
                    "today_returns": 0,
                    "available_books": 1
                },
                "loans": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = Client::new(&server.uri())
            .dashboard(&[Prop::Loans, Prop::Stats])
            .await
            .unwrap();
        assert!(data.loans.unwrap().is_empty());
        assert!(data.transactions.is_none());
    }

    #[tokio::test]
    async fn test_api_errors_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/dashboard"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Unknown dashboard prop"))
            .mount(&server)
            .await;

        let err = Client::new(&server.uri())
            .dashboard(&[Prop::Stats])
            .await
            .unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("Unknown"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_yields_sse_frames() {
        let server = MockServer::start().await;
        let body = "event: connected\ndata: {\"status\":\"connected\"}\n\n\
                    id: 0192a1b2-0000-7000-8000-000000000001\nevent: loan.status.changed\ndata: {}\n\n";
        Mock::given(method("GET"))
            .and(path("/v1/channels/loans/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let events: Vec<ChannelEvent> = Client::new(&server.uri())
            .subscribe("loans")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "connected");
        assert_eq!(events[1].channel, "loans");
        assert_eq!(events[1].event, "loan.status.changed");
        assert_eq!(events[1].id, "0192a1b2-0000-7000-8000-000000000001");
        assert_eq!(events[1].data, "{}");
    }

    #[tokio::test]
    async fn test_unknown_channel_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/books/sse"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = Client::new(&server.uri()).subscribe("books").await;
        assert!(matches!(result, Err(ClientError::NotFound)));
    }
}
