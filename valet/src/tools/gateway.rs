//! Typed adapters for external collaborators: mail, messenger and the
//! scheduling-link service.
//!
//! The wire format of each third-party API stays behind these traits; tools
//! depend on the traits only. HTTP implementations are thin reqwest adapters;
//! mock implementations back tests and mock mode and record what they were
//! asked to do.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDetail {
    pub headers: HashMap<String, String>,
    pub body: String,
    pub attachments: Vec<AttachmentMeta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub id: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerEvent {
    pub id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub invitee: Option<String>,
}

/// Mailbox operations (IMAP/SMTP or a mail API behind one surface).
#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn search(
        &self,
        query: &str,
        folder: &str,
        max_results: usize,
    ) -> Result<Vec<EmailSummary>, ToolError>;

    async fn read(&self, email_id: &str, folder: &str) -> Result<EmailDetail, ToolError>;

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, ToolError>;
}

/// Chat messenger (WhatsApp-style provider).
#[async_trait]
pub trait MessengerGateway: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, ToolError>;
}

/// Scheduling-link service (Calendly-style provider).
#[async_trait]
pub trait SchedulerGateway: Send + Sync {
    async fn list_events(&self) -> Result<Vec<SchedulerEvent>, ToolError>;

    async fn create_event(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        invitee: Option<&str>,
    ) -> Result<SchedulerEvent, ToolError>;
}

fn transport_err(e: reqwest::Error) -> ToolError {
    ToolError::Transport(e.to_string())
}

fn status_err(status: reqwest::StatusCode, body: String) -> ToolError {
    ToolError::Application(format!("HTTP {status}: {body}"))
}

/// Mail API spoken over HTTPS. The provider URL and token come from settings.
pub struct HttpMailGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMailGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url.trim_end_matches('/'), path));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl MailGateway for HttpMailGateway {
    async fn search(
        &self,
        query: &str,
        folder: &str,
        max_results: usize,
    ) -> Result<Vec<EmailSummary>, ToolError> {
        let resp = self
            .request(reqwest::Method::GET, "/messages/search")
            .query(&[
                ("q", query),
                ("folder", folder),
                ("limit", &max_results.to_string()),
            ])
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_err(status, resp.text().await.unwrap_or_default()));
        }
        resp.json().await.map_err(transport_err)
    }

    async fn read(&self, email_id: &str, folder: &str) -> Result<EmailDetail, ToolError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/messages/{email_id}"))
            .query(&[("folder", folder)])
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_err(status, resp.text().await.unwrap_or_default()));
        }
        resp.json().await.map_err(transport_err)
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, ToolError> {
        let resp = self
            .request(reqwest::Method::POST, "/messages/send")
            .json(email)
            .send()
            .await
            .map_err(transport_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_err(status, resp.text().await.unwrap_or_default()));
        }
        resp.json().await.map_err(transport_err)
    }
}

/// Messenger REST API adapter.
pub struct HttpMessengerGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMessengerGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }
}

#[async_trait]
impl MessengerGateway for HttpMessengerGateway {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, ToolError> {
        let mut req = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .json(&serde_json::json!({"to": to, "body": body}));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(transport_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_err(status, resp.text().await.unwrap_or_default()));
        }
        resp.json().await.map_err(transport_err)
    }
}

/// Scheduling-link REST API adapter.
pub struct HttpSchedulerGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSchedulerGateway {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }
}

#[async_trait]
impl SchedulerGateway for HttpSchedulerGateway {
    async fn list_events(&self) -> Result<Vec<SchedulerEvent>, ToolError> {
        let mut req = self
            .client
            .get(format!("{}/scheduled_events", self.base_url.trim_end_matches('/')));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(transport_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_err(status, resp.text().await.unwrap_or_default()));
        }
        resp.json().await.map_err(transport_err)
    }

    async fn create_event(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        invitee: Option<&str>,
    ) -> Result<SchedulerEvent, ToolError> {
        let mut req = self
            .client
            .post(format!("{}/scheduled_events", self.base_url.trim_end_matches('/')))
            .json(&serde_json::json!({
                "title": title,
                "start_at": start_at.to_rfc3339(),
                "end_at": end_at.map(|d| d.to_rfc3339()),
                "invitee": invitee,
            }));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(transport_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_err(status, resp.text().await.unwrap_or_default()));
        }
        resp.json().await.map_err(transport_err)
    }
}

/// In-memory mail gateway: preloaded inbox, records sends.
#[derive(Default)]
pub struct MockMailGateway {
    inbox: Vec<(EmailSummary, EmailDetail)>,
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl MockMailGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, summary: EmailSummary, detail: EmailDetail) -> Self {
        self.inbox.push((summary, detail));
        self
    }
}

#[async_trait]
impl MailGateway for MockMailGateway {
    async fn search(
        &self,
        query: &str,
        _folder: &str,
        max_results: usize,
    ) -> Result<Vec<EmailSummary>, ToolError> {
        let q = query.to_lowercase();
        Ok(self
            .inbox
            .iter()
            .filter(|(s, d)| {
                q.is_empty()
                    || s.subject.to_lowercase().contains(&q)
                    || d.body.to_lowercase().contains(&q)
            })
            .take(max_results)
            .map(|(s, _)| s.clone())
            .collect())
    }

    async fn read(&self, email_id: &str, _folder: &str) -> Result<EmailDetail, ToolError> {
        self.inbox
            .iter()
            .find(|(s, _)| s.id == email_id)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| ToolError::Application(format!("no such message: {email_id}")))
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, ToolError> {
        self.sent.lock().expect("mock lock").push(email.clone());
        Ok(DeliveryReceipt {
            id: format!("mock-mail-{}", self.sent.lock().expect("mock lock").len()),
            accepted: true,
        })
    }
}

/// In-memory messenger gateway: records sends.
#[derive(Default)]
pub struct MockMessengerGateway {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockMessengerGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessengerGateway for MockMessengerGateway {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, ToolError> {
        let mut sent = self.sent.lock().expect("mock lock");
        sent.push((to.to_string(), body.to_string()));
        Ok(DeliveryReceipt {
            id: format!("mock-wa-{}", sent.len()),
            accepted: true,
        })
    }
}

/// In-memory scheduler gateway.
#[derive(Default)]
pub struct MockSchedulerGateway {
    pub events: Mutex<Vec<SchedulerEvent>>,
}

impl MockSchedulerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(self, event: SchedulerEvent) -> Self {
        self.events.lock().expect("mock lock").push(event);
        self
    }
}

#[async_trait]
impl SchedulerGateway for MockSchedulerGateway {
    async fn list_events(&self) -> Result<Vec<SchedulerEvent>, ToolError> {
        Ok(self.events.lock().expect("mock lock").clone())
    }

    async fn create_event(
        &self,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: Option<DateTime<Utc>>,
        invitee: Option<&str>,
    ) -> Result<SchedulerEvent, ToolError> {
        let mut events = self.events.lock().expect("mock lock");
        let event = SchedulerEvent {
            id: format!("mock-cal-{}", events.len() + 1),
            title: title.to_string(),
            start_at,
            end_at,
            invitee: invitee.map(str::to_string),
        };
        events.push(event.clone());
        Ok(event)
    }
}
