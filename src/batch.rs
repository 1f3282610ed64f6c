use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A contiguous slice of the input identifiers, fetched and retried as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub items: Vec<String>,
}

impl Batch {
    pub fn new(index: usize, items: Vec<String>) -> Self {
        Self { index, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The first few identifiers, for log lines and failure reports.
    pub fn leading(&self, count: usize) -> Vec<String> {
        self.items.iter().take(count).cloned().collect()
    }
}

/// Splits `items` into consecutive batches of `batch_size`; the last may be shorter.
///
/// A zero `batch_size` is treated as one so the planner stays total.
pub fn plan<S: AsRef<str>>(items: &[S], batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    items
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| {
            Batch::new(
                index,
                chunk.iter().map(|item| item.as_ref().to_string()).collect(),
            )
        })
        .collect()
}
