use serde::{Deserialize, Serialize};

/// Outcome of one ingestion walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    /// Admitted categories (allow-list filtered)
    pub categories: usize,
    /// Entries newly inserted by this walk
    pub entries: usize,
    /// Entries whose insert failed
    pub failures: usize,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} categories, {} entries, {} failed",
            self.categories, self.entries, self.failures
        )
    }
}
