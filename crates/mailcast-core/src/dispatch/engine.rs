//! Dispatch engine - bounded worker pool driving one task per recipient

use super::audit::{AuditRecord, AuditSink};
use super::cooling::CoolingGate;
use super::outcome::{DispatchOutcome, DispatchTask, OutcomeStatus};
use super::rate_limiter::RateLimiter;
use super::reporter::{CampaignReporter, CampaignSummary, RunFacts};
use crate::random::SharedRng;
use crate::render::{Renderer, Template};
use crate::transport::{Envelope, TransportRouter};
use chrono::Utc;
use mailcast_common::{Attachment, CampaignConfig, EmailAddress, Recipient, TransportEndpoint};
use mailcast_storage::SenderPools;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SUBJECT: &str = "Important Information";
pub const DEFAULT_FROM_NAME: &str = "Mailcast";
pub const DEFAULT_FROM_ADDRESS: &str = "noreply@example.com";

/// Filename template applied to every attachment
const ATTACHMENT_NAME_PREFIX: &str = "attachment_[firstName]_[date]_";

/// What a task produced, plus the choices that go into its audit record
struct Delivery {
    outcome: DispatchOutcome,
    delivered_to: String,
    from_address: Option<String>,
    template_name: Option<String>,
    subject: Option<String>,
}

impl Delivery {
    fn bare(recipient: &Recipient, outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            delivered_to: recipient.email.clone(),
            from_address: None,
            template_name: None,
            subject: None,
        }
    }
}

/// Runs a campaign's tasks: slot, admission, render, policy gate, route,
/// send, record.
pub struct DispatchEngine {
    config: CampaignConfig,
    templates: Vec<Template>,
    senders: SenderPools,
    endpoints: Vec<TransportEndpoint>,
    attachments: Vec<Attachment>,
    renderer: Arc<dyn Renderer>,
    router: Arc<TransportRouter>,
    rng: Arc<SharedRng>,
    limiter: RateLimiter,
    gate: CoolingGate,
    reporter: CampaignReporter,
    audit: Arc<dyn AuditSink>,
}

impl DispatchEngine {
    pub fn new(
        config: CampaignConfig,
        renderer: Arc<dyn Renderer>,
        router: Arc<TransportRouter>,
        rng: Arc<SharedRng>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit()),
            gate: CoolingGate::new(config.cooling()),
            reporter: CampaignReporter::new(),
            config,
            templates: Vec::new(),
            senders: SenderPools::default(),
            endpoints: Vec::new(),
            attachments: Vec::new(),
            renderer,
            router,
            rng,
            audit,
        }
    }

    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_senders(mut self, senders: SenderPools) -> Self {
        self.senders = senders;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<TransportEndpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn reporter(&self) -> &CampaignReporter {
        &self.reporter
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Process every recipient and return the summary.
    ///
    /// Tasks are submitted in list order, one per free slot. After `cancel`
    /// fires nothing more is submitted; tasks already running finish and
    /// are recorded.
    pub async fn run(
        self: Arc<Self>,
        recipients: Vec<Recipient>,
        cancel: CancellationToken,
    ) -> CampaignSummary {
        let total = recipients.len();
        let concurrency = self.config.concurrency_limit();
        let slots = Arc::new(Semaphore::new(concurrency));
        let mut workers = JoinSet::new();
        let mut submitted = 0usize;

        info!(
            recipients = total,
            concurrency,
            mode = %self.config.mode,
            rate_limit = self.limiter.limit(),
            test_mode = self.config.test_mode,
            "Starting dispatch"
        );

        for (sequence_index, recipient) in recipients.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            submitted += 1;
            let engine = self.clone();
            let task = DispatchTask {
                recipient,
                sequence_index,
            };
            workers.spawn(async move {
                engine.process(task).await;
                drop(permit);
            });
        }

        if submitted < total {
            warn!(
                submitted,
                remaining = total - submitted,
                "Campaign cancelled, waiting for in-flight tasks"
            );
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }

        let summary = self.reporter.finish(RunFacts {
            total: total as u64,
            concurrency,
            cooling_periods: self.gate.periods(),
            cancelled: cancel.is_cancelled(),
            unsubmitted: (total - submitted) as u64,
        });
        info!(
            processed = summary.statistics.processed,
            successful = summary.statistics.successful,
            failed = summary.statistics.failed,
            skipped = summary.statistics.skipped,
            "Dispatch finished"
        );
        summary
    }

    /// The task boundary: nothing escapes past here
    async fn process(self: Arc<Self>, task: DispatchTask) {
        let DispatchTask {
            recipient,
            sequence_index,
        } = task;

        let engine = self.clone();
        let attempt = recipient.clone();
        let delivery = match tokio::spawn(async move { engine.attempt(&attempt).await }).await {
            Ok(delivery) => delivery,
            Err(e) => Delivery::bare(&recipient, DispatchOutcome::error(join_failure(e))),
        };

        self.record(sequence_index, &recipient, delivery);
    }

    /// Validation, admission and delivery of one recipient
    async fn attempt(&self, recipient: &Recipient) -> Delivery {
        if EmailAddress::parse(&recipient.email).is_none() {
            return Delivery::bare(recipient, DispatchOutcome::error("Invalid recipient email"));
        }
        self.admit().await;
        self.deliver(recipient).await
    }

    /// Wait out any pool pause, then take a rate slot; pause the pool and
    /// retry when the window is exhausted
    async fn admit(&self) {
        loop {
            self.gate.wait().await;
            let admission = self.limiter.try_consume();
            if admission.allowed {
                return;
            }
            self.gate.pause(admission.wait);
        }
    }

    fn pick<'a>(&self, pool: &'a [String], default: &'a str) -> &'a str {
        self.rng
            .choose(pool)
            .map(String::as_str)
            .unwrap_or(default)
    }

    async fn deliver(&self, recipient: &Recipient) -> Delivery {
        let Some(template) = self.rng.choose(&self.templates) else {
            return Delivery::bare(recipient, DispatchOutcome::error("No templates available"));
        };
        let subject = self.pick(&self.senders.subjects, DEFAULT_SUBJECT);
        let from_name = self.pick(&self.senders.from_names, DEFAULT_FROM_NAME);
        let from_address = self.pick(&self.senders.from_addresses, DEFAULT_FROM_ADDRESS);

        let redirect = self.config.active_override();
        let mut delivery = Delivery {
            outcome: DispatchOutcome::error("not attempted"),
            delivered_to: redirect.unwrap_or(&recipient.email).to_string(),
            from_address: Some(from_address.to_string()),
            template_name: Some(template.name.clone()),
            subject: None,
        };

        let content = self.renderer.render(template, subject, recipient);
        let subject = match redirect {
            Some(_) => format!("[TEST] {} ({})", content.subject, recipient.email),
            None => content.subject.clone(),
        };
        delivery.subject = Some(subject.clone());

        let verdict = self.renderer.check_policy(&content.html);
        if verdict.flagged {
            if !self.config.test_mode {
                warn!(
                    recipient = %recipient.email,
                    template = %template.name,
                    "Skipping message, {}",
                    verdict.reason()
                );
                delivery.outcome = DispatchOutcome::skipped(verdict.reason());
                return delivery;
            }
            warn!(
                recipient = %recipient.email,
                "Test mode: message would be skipped, {}",
                verdict.reason()
            );
        }

        let endpoint = match self.router.select_endpoint(self.config.mode, &self.endpoints) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                delivery.outcome = DispatchOutcome::error(e.to_string());
                return delivery;
            }
        };
        let endpoint_label = endpoint.label();

        let attachments = if self.config.include_attachments {
            self.attachments
                .iter()
                .map(|a| Attachment {
                    filename: self.renderer.render_filename(
                        &format!("{}{}", ATTACHMENT_NAME_PREFIX, a.filename),
                        recipient,
                    ),
                    content: a.content.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        let envelope = Envelope {
            to: delivery.delivered_to.clone(),
            original_recipient: recipient.email.clone(),
            from_name: from_name.to_string(),
            from_address: from_address.to_string(),
            subject,
            html: content.html,
            text: content.plain_text,
            attachments,
        };

        if self.config.test_mode {
            debug!(
                recipient = %recipient.email,
                delivered_to = %envelope.to,
                endpoint = %endpoint_label,
                "Test mode: simulating send"
            );
            delivery.outcome = DispatchOutcome::simulated(endpoint_label, envelope.summary());
            return delivery;
        }

        let transport = match self.router.transport_for(&endpoint) {
            Ok(transport) => transport,
            Err(e) => {
                error!(endpoint = %endpoint_label, "Failed to prepare transport: {}", e);
                delivery.outcome = DispatchOutcome::error_at(endpoint_label, e.to_string());
                return delivery;
            }
        };

        delivery.outcome = match transport.send(&envelope).await {
            Ok(receipt) => {
                debug!(
                    recipient = %recipient.email,
                    endpoint = %endpoint_label,
                    message_id = %receipt.message_id,
                    "Message sent"
                );
                DispatchOutcome::success(endpoint_label, receipt.message_id)
            }
            Err(e) => {
                error!(
                    recipient = %recipient.email,
                    endpoint = %endpoint_label,
                    kind = %e.kind,
                    "Send failed: {}",
                    e.message
                );
                DispatchOutcome::error_at(endpoint_label, e.to_string())
            }
        };
        delivery
    }

    fn record(&self, sequence_index: usize, recipient: &Recipient, delivery: Delivery) {
        let outcome = delivery.outcome;
        self.reporter.record(&outcome);

        if outcome.status == OutcomeStatus::Error {
            debug!(
                recipient = %recipient.email,
                "Task {} failed: {}",
                sequence_index,
                outcome.detail.as_deref().unwrap_or_default()
            );
        }

        self.audit.append(AuditRecord {
            sequence_index,
            recipient_email: recipient.email.clone(),
            delivered_to: delivery.delivered_to,
            from_address: delivery.from_address,
            template_name: delivery.template_name,
            subject: delivery.subject,
            endpoint_used: outcome.endpoint_used,
            status: outcome.status,
            error: outcome.detail,
            message_id: outcome.message_id,
            envelope: outcome.envelope,
            timestamp: Utc::now(),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn join_failure(err: JoinError) -> String {
    if err.is_panic() {
        format!("Internal error: {}", panic_message(&*err.into_panic()))
    } else {
        format!("Internal error: {}", err)
    }
}
