//! Adapters for running without a cloud account
//!
//! Filesystem object storage, a local master-key wrapper, the PostgreSQL
//! dump/restore tools and alert sinks that log or POST to a webhook.

mod alerts;
mod fs;
mod keys;
mod pg;

pub use alerts::{LogAlertSink, WebhookAlertSink};
pub use fs::FsObjectStorage;
pub use keys::LocalKeyWrapper;
pub use pg::{PgConnection, PgDumpTool, PgToolConfig};
