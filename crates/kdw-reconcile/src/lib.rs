//! kdw-reconcile
//!
//! The reconciliation core: for every active subject, fetch the latest match,
//! derive the KDA ratio, commit it with `last_checked` as one unit, and send a
//! message when the ratio drops below the threshold.
//!
//! IO happens only through the traits in [`ports`]. Adapters live in
//! `kdw-db`, `kdw-riot` and `kdw-notify`.

pub mod engine;
pub mod error;
pub mod notifier;
pub mod policy;
pub mod ports;
pub mod registration;
pub mod report;

pub use engine::{EngineSettings, ReconciliationEngine};
pub use error::{
    CycleError, DeliveryError, ProviderError, RegistrationError, StoreError, SubjectError,
};
pub use notifier::Notifier;
pub use policy::{
    crossing_message, detect_crossing, kda_ratio, match_url, CrossingEvent,
    DEFAULT_RATIO_THRESHOLD,
};
pub use ports::{
    Committed, MatchInfoProvider, NotificationSender, OutboundMessage, SubjectAdmin, SubjectStore,
};
pub use registration::{Registered, Registrar, Registration};
pub use report::{
    CycleReport, CycleSummary, NotificationOutcome, SubjectOutcome, SubjectSummary,
    SubjectUpdate,
};
