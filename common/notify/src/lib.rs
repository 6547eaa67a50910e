pub mod model;
pub mod sink;

pub use model::{Actor, LoanEvent, LoanEventKind, NotifyError, NotifyResult, LOAN_EVENT_VERSION};
pub use sink::{extract_actor_from_headers, LogSink, MemorySink, NoopSink, NotificationSink, Notifier};
