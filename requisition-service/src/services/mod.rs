//! Service layer: database access, the three ledgers, and the external
//! collaborators (blob store, audit sink, notifier).

pub mod adjustment_log;
pub mod audit;
pub mod database;
pub mod error;
pub mod evidence_ledger;
pub mod metrics;
pub mod notifier;
pub mod payment_ledger;
pub mod reconcile;
pub mod storage;

pub use adjustment_log::AdjustmentLog;
pub use audit::ActivityAudit;
pub use database::Database;
pub use error::LedgerError;
pub use evidence_ledger::{EvidenceLedger, RecordEvidence};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{EvidenceReadyMessage, MockNotifier, ReviewNotifier, SmtpNotifier};
pub use payment_ledger::{PaymentLedger, RecordPayment};
pub use storage::{BlobHandle, BlobStore, FileUpload, LocalStorage, S3Storage};
