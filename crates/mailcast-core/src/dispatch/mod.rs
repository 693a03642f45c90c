//! Campaign dispatch - admission control, the worker pool and reporting

mod audit;
mod campaign;
mod cooling;
mod engine;
mod outcome;
mod rate_limiter;
mod reporter;

pub use audit::{AuditRecord, AuditSink, AuditTrail};
pub use campaign::{Campaign, CampaignError, DeliverySetup};
pub use cooling::CoolingGate;
pub use engine::{DispatchEngine, DEFAULT_FROM_ADDRESS, DEFAULT_FROM_NAME, DEFAULT_SUBJECT};
pub use outcome::{DispatchOutcome, DispatchTask, OutcomeStatus};
pub use rate_limiter::{Admission, RateLimiter, WINDOW};
pub use reporter::{format_duration, CampaignReporter, CampaignStatistics, CampaignSummary, RunFacts};
