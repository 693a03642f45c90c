//! Mailcast Core - campaign dispatch
//!
//! This crate provides the dispatch engine (bounded worker pool, shared rate
//! window, pool-wide cooling pause), content rendering with the keyword
//! policy gate, transport routing and the bundled transports.

pub mod dispatch;
pub mod random;
pub mod render;
pub mod transport;

pub use dispatch::{
    format_duration, AuditRecord, AuditSink, AuditTrail, Campaign, CampaignError,
    CampaignReporter, CampaignStatistics, CampaignSummary, DeliverySetup, DispatchEngine,
    DispatchOutcome, DispatchTask, OutcomeStatus, RateLimiter,
};
pub use random::SharedRng;
pub use render::{ContentRenderer, PlaceholderSet, PolicyVerdict, RenderedContent, Renderer, Template};
pub use transport::{
    Envelope, EnvelopeSummary, LiveTransportFactory, NotAvailable, SendReceipt, Transport, TransportError,
    TransportErrorKind, TransportFactory, TransportRouter,
};
