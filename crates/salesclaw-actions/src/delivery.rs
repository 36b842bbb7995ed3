//! Delivery interfaces used by the action families, and their implementations.
//!
//! Actions decide *what* to send; these traits decide *how*. The default
//! wiring logs every delivery so the engine runs without credentials.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use salesclaw_core::config::resolve_path;
use salesclaw_core::{Result, SalesClawConfig, SalesClawError};

use crate::crm::{ActivityRecord, OpportunityUpdate, TaskDetails};
use crate::report::ReportEntry;
use crate::workflow::{EscalationPlan, FollowupSequence, MeetingRequest};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_chat(&self, channel: &str, text: &str) -> Result<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &[String], text: &str) -> Result<()>;
}

#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Open opportunity for a customer, if any.
    async fn find_opportunity(&self, customer_id: &str) -> Result<Option<String>>;
    async fn update_opportunity(&self, opportunity_id: &str, update: &OpportunityUpdate) -> Result<()>;
    /// Returns the created task id.
    async fn create_task(&self, task: &TaskDetails) -> Result<String>;
    /// Returns the created activity id.
    async fn log_activity(&self, activity: &ActivityRecord) -> Result<String>;
}

#[async_trait]
pub trait Calendar: Send + Sync {
    /// Returns the booked meeting id.
    async fn book_meeting(&self, meeting: &MeetingRequest) -> Result<String>;
}

/// Receives multi-step follow-up sequences and escalation plans.
#[async_trait]
pub trait SequenceSink: Send + Sync {
    async fn create_sequence(&self, sequence: &FollowupSequence) -> Result<String>;
    async fn start_escalation(&self, plan: &EscalationPlan) -> Result<String>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Append an entry to a named bucket (`daily_2024-03-14`, `customer_acme_inc`, ...).
    async fn append(&self, bucket: &str, entry: &ReportEntry) -> Result<()>;
    /// Store a generated report and return where it went.
    async fn publish(&self, file_name: &str, content: &str) -> Result<String>;
}

fn stamp_id(prefix: &str) -> String {
    format!("{prefix}_{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Logs every delivery instead of performing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl Mailer for LogDelivery {
    async fn send_email(&self, to: &[String], subject: &str, _body: &str) -> Result<()> {
        tracing::info!("📤 Email to {}: {subject}", to.join(", "));
        Ok(())
    }
}

#[async_trait]
impl ChatSender for LogDelivery {
    async fn send_chat(&self, channel: &str, text: &str) -> Result<()> {
        let preview: String = text.chars().take(100).collect();
        tracing::info!("💬 Slack {channel}: {preview}");
        Ok(())
    }
}

#[async_trait]
impl SmsSender for LogDelivery {
    async fn send_sms(&self, to: &[String], text: &str) -> Result<()> {
        tracing::info!("📱 SMS to {}: {text}", to.join(", "));
        Ok(())
    }
}

#[async_trait]
impl Calendar for LogDelivery {
    async fn book_meeting(&self, meeting: &MeetingRequest) -> Result<String> {
        tracing::info!(
            "📅 Meeting '{}' at {} with {}",
            meeting.title,
            meeting.start_time.format("%Y-%m-%d %H:%M"),
            meeting.attendees.join(", ")
        );
        Ok(stamp_id("meeting"))
    }
}

#[async_trait]
impl SequenceSink for LogDelivery {
    async fn create_sequence(&self, sequence: &FollowupSequence) -> Result<String> {
        tracing::info!(
            "🔁 Follow-up sequence for {} ({} steps)",
            sequence.customer_id.as_deref().unwrap_or("Unknown"),
            sequence.steps.len()
        );
        Ok(stamp_id("followup"))
    }

    async fn start_escalation(&self, plan: &EscalationPlan) -> Result<String> {
        tracing::info!(
            "🚨 Escalation for {} ({} levels)",
            plan.trigger_id,
            plan.levels.len()
        );
        Ok(stamp_id("escalation"))
    }
}

/// SMTP delivery through lettre.
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: String,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, username: &str, password: &str, from: &str) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email(&self, to: &[String], subject: &str, body: &str) -> Result<()> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from: Mailbox = format!("SalesClaw Alerts <{}>", self.from)
            .parse()
            .map_err(|e| SalesClawError::Delivery(format!("Invalid from: {e}")))?;

        let mut builder = LettreMessage::builder()
            .from(from)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| SalesClawError::Delivery(format!("Invalid to {recipient}: {e}")))?;
            builder = builder.to(mailbox);
        }

        let email = builder
            .body(body.to_string())
            .map_err(|e| SalesClawError::Delivery(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let mailer = AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| SalesClawError::Delivery(format!("SMTP relay: {e}")))?
            .port(self.port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SalesClawError::Delivery(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {}", to.join(", "));
        Ok(())
    }
}

/// Slack incoming-webhook delivery.
pub struct SlackWebhook {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackWebhook {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl ChatSender for SlackWebhook {
    async fn send_chat(&self, channel: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&serde_json::json!({
                "channel": channel,
                "text": text,
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SalesClawError::Delivery(format!("Slack send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Slack message sent to {channel}");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(SalesClawError::Delivery(format!("Slack webhook error {status}: {body}")))
        }
    }
}

/// In-process CRM backed by a static opportunity map. Keeps everything it
/// was asked to write so callers can inspect it.
#[derive(Default)]
pub struct MockCrm {
    opportunities: BTreeMap<String, String>,
    updates: Mutex<Vec<(String, OpportunityUpdate)>>,
    tasks: Mutex<Vec<TaskDetails>>,
    activities: Mutex<Vec<ActivityRecord>>,
}

impl MockCrm {
    pub fn new(opportunities: BTreeMap<String, String>) -> Self {
        Self {
            opportunities,
            ..Default::default()
        }
    }

    pub fn updates(&self) -> Vec<(String, OpportunityUpdate)> {
        self.updates.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn tasks(&self) -> Vec<TaskDetails> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn activities(&self) -> Vec<ActivityRecord> {
        self.activities.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CrmClient for MockCrm {
    async fn find_opportunity(&self, customer_id: &str) -> Result<Option<String>> {
        Ok(self.opportunities.get(customer_id).cloned())
    }

    async fn update_opportunity(&self, opportunity_id: &str, update: &OpportunityUpdate) -> Result<()> {
        tracing::info!("📇 CRM opportunity {opportunity_id} updated");
        self.updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((opportunity_id.to_string(), update.clone()));
        Ok(())
    }

    async fn create_task(&self, task: &TaskDetails) -> Result<String> {
        tracing::info!("📝 CRM task '{}' for {}", task.title, task.assignee);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(task.clone());
        Ok(format!("task_{}", tasks.len()))
    }

    async fn log_activity(&self, activity: &ActivityRecord) -> Result<String> {
        tracing::info!("📇 CRM activity '{}'", activity.subject);
        let mut activities = self.activities.lock().unwrap_or_else(|e| e.into_inner());
        activities.push(activity.clone());
        Ok(format!("activity_{}", activities.len()))
    }
}

/// Buckets as JSON arrays under a directory (`<root>/<bucket>.json`).
pub struct FileReportStore {
    root: PathBuf,
}

impl FileReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn append(&self, bucket: &str, entry: &ReportEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(format!("{bucket}.json"));

        let mut entries: Vec<serde_json::Value> = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Report bucket {} unreadable, starting fresh: {e}", path.display());
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        entries.push(serde_json::to_value(entry)?);

        let json = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!("Report entry appended to {}", path.display());
        Ok(())
    }

    async fn publish(&self, file_name: &str, content: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(file_name);
        tokio::fs::write(&path, content).await?;
        Ok(path.display().to_string())
    }
}

/// Report buckets held in memory.
#[derive(Default)]
pub struct MemoryReportStore {
    buckets: Mutex<BTreeMap<String, Vec<ReportEntry>>>,
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, name: &str) -> Vec<ReportEntry> {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// `(file_name, content)` of every published report.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn append(&self, bucket: &str, entry: &ReportEntry) -> Result<()> {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(bucket.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn publish(&self, file_name: &str, content: &str) -> Result<String> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((file_name.to_string(), content.to_string()));
        Ok(format!("memory://{file_name}"))
    }
}

/// Every delivery channel an action family may need.
#[derive(Clone)]
pub struct Deliveries {
    pub mailer: Arc<dyn Mailer>,
    pub chat: Arc<dyn ChatSender>,
    pub sms: Arc<dyn SmsSender>,
    pub crm: Arc<dyn CrmClient>,
    pub calendar: Arc<dyn Calendar>,
    pub sequences: Arc<dyn SequenceSink>,
    pub reports: Arc<dyn ReportStore>,
}

impl Deliveries {
    /// Log-only delivery with an in-memory report store.
    pub fn logging(config: &SalesClawConfig) -> Self {
        Self {
            mailer: Arc::new(LogDelivery),
            chat: Arc::new(LogDelivery),
            sms: Arc::new(LogDelivery),
            crm: Arc::new(MockCrm::new(config.crm.opportunities.clone())),
            calendar: Arc::new(LogDelivery),
            sequences: Arc::new(LogDelivery),
            reports: Arc::new(MemoryReportStore::new()),
        }
    }

    /// Real transports wherever the config provides them.
    pub fn from_config(config: &SalesClawConfig) -> Self {
        let mut deliveries = Self::logging(config);
        let notify = &config.notifications;

        if !notify.smtp_host.is_empty() {
            tracing::info!("📧 SMTP delivery via {}:{}", notify.smtp_host, notify.smtp_port);
            deliveries.mailer = Arc::new(SmtpMailer::new(
                &notify.smtp_host,
                notify.smtp_port,
                &notify.smtp_username,
                &notify.smtp_password,
                &notify.from_address,
            ));
        }
        if !notify.slack_webhook_url.is_empty() {
            deliveries.chat = Arc::new(SlackWebhook::new(&notify.slack_webhook_url));
        }
        deliveries.reports = Arc::new(FileReportStore::new(resolve_path(&config.reports.storage_path)));
        deliveries
    }
}
