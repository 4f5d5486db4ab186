pub mod cbs;

use crate::error::Result;
use serde_json::Value;

pub use cbs::CbsClient;

/// A remote catalog of tables that can be fetched whole by identifier
#[async_trait::async_trait]
pub trait TableSource: Send + Sync {
    /// Short source identifier, used as the `{source}` output path segment
    fn source_name(&self) -> &str;

    /// Fetch every record of `table_name` as JSON objects
    async fn fetch_table(&self, table_name: &str) -> Result<Vec<Value>>;
}
