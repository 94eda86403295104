//! Domain model (ids, jobs, audit rows, log entries, operating zone, errors).

pub mod audit;
pub mod errors;
pub mod ids;
pub mod job;
pub mod log;
pub mod zone;

pub use self::audit::AuditRow;
pub use self::errors::{
    ConfigError, CredentialError, HeraldError, IngestError, ReportError, SendError,
};
pub use self::ids::{BatchId, JobId, JobIdentity};
pub use self::job::Job;
pub use self::log::{LogEntry, LogKind, LogOutcome};
pub use self::zone::OperatingZone;
