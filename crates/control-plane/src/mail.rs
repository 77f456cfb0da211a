// HTTP mail relay transport
//
// Posts each rendered email as JSON to a relay endpoint (MAIL_RELAY_URL).
// Any non-2xx response is a transport error so the job is retried.

use async_trait::async_trait;
use lendwise_core::{MailError, Mailer, OutgoingEmail};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    template: &'a str,
}

pub struct HttpMailer {
    client: Client,
    relay_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(relay_url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            relay_url: relay_url.into(),
            from: from.into(),
        }
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let request = RelayRequest {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.body,
            template: email.template.name(),
        };

        let response = self
            .client
            .post(&self.relay_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MailError::Transport(format!("Failed to reach mail relay: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MailError::Transport(format!(
                "Mail relay error ({}): {}",
                status, error_text
            )));
        }

        debug!(to = %email.to, subject = %email.subject, "Email handed to relay");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HttpMailer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendwise_core::EmailTemplate;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "ada@example.com".to_string(),
            subject: "Book Loan Confirmed - Test Library".to_string(),
            body: "Hello Ada".to_string(),
            template: EmailTemplate::BookBorrowed,
        }
    }

    #[tokio::test]
    async fn test_posts_email_to_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(json!({
                "from": "library@example.com",
                "to": "ada@example.com",
                "subject": "Book Loan Confirmed - Test Library",
                "text": "Hello Ada",
                "template": "book_borrowed"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(format!("{}/send", server.uri()), "library@example.com");
        mailer.send(&email()).await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("relay overloaded"))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "library@example.com");
        let err = mailer.send(&email()).await.unwrap_err();
        match err {
            MailError::Transport(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("relay overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
