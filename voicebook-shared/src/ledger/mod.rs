/// Month-partitioned ledger on top of a spreadsheet
///
/// # Modules
///
/// - [`entry`]: Ledger entries, rows read back, header and category constants
/// - [`partition`]: Partition keys (`YYYY-MM`) and lazy partition creation
/// - [`sheets`]: The spreadsheet provider contract
/// - [`google_sheets`]: Google Sheets/Drive implementation of that contract
/// - [`stats`]: Aggregates computed client-side from partition rows
/// - [`store`]: Append, read and aggregate operations
///
/// Each month of entries lives in its own partition (worksheet) named by
/// its `YYYY-MM` key, so "this month" reads never touch history.

pub mod entry;
pub mod google_sheets;
pub mod partition;
pub mod sheets;
pub mod stats;
pub mod store;

use crate::error::{Classify, ErrorKind};
use crate::provider::ProviderError;

pub use entry::{LedgerEntry, LedgerRecord};
pub use partition::{PartitionKey, PartitionResolver};
pub use sheets::{LedgerRef, SpreadsheetProvider};
pub use stats::{DailyTotal, MonthlyStats};
pub use store::{LedgerConfig, LedgerStore};

/// Error type for ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Appending a row failed
    #[error("Failed to write to partition {partition}: {source}")]
    LedgerWriteFailed {
        partition: String,
        #[source]
        source: ProviderError,
    },

    /// Reading a partition (or the partition list) failed
    #[error("Failed to read partition {partition}: {source}")]
    LedgerReadFailed {
        partition: String,
        #[source]
        source: ProviderError,
    },

    /// Creating a missing partition failed
    #[error("Failed to create partition {partition}: {source}")]
    PartitionCreateFailed {
        partition: String,
        #[source]
        source: ProviderError,
    },

    /// Creating or listing ledgers failed
    #[error("Spreadsheet provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Malformed input such as an inverted date range
    #[error("Invalid ledger request: {0}")]
    Validation(String),
}

impl Classify for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            _ => ErrorKind::ExternalService,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            LedgerError::LedgerWriteFailed { .. } => "LEDGER_WRITE_FAILED",
            LedgerError::LedgerReadFailed { .. } => "LEDGER_READ_FAILED",
            LedgerError::PartitionCreateFailed { .. } => "PARTITION_CREATE_FAILED",
            LedgerError::Provider(_) => "SHEETS_ERROR",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}
