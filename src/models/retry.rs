/// Backoff settings for in-process retries (broker connection at startup).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u64,
}

/// How many deliveries a message gets before it is quarantined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn is_exhausted(&self, next_attempt: u32) -> bool {
        next_attempt >= self.max_attempts
    }
}

/// One entry of the broker's death history for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathRecord {
    pub queue_name: String,
    pub failure_count: u64,
}

impl DeathRecord {
    pub fn new(queue_name: impl Into<String>, failure_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            failure_count,
        }
    }
}

/// Redelivery history attached to a message by the broker, in broker order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryMetadata {
    records: Vec<DeathRecord>,
}

impl RetryMetadata {
    pub fn new(records: Vec<DeathRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[DeathRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<DeathRecord> for RetryMetadata {
    fn from_iter<I: IntoIterator<Item = DeathRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Number of times a message has already been dead-lettered out of
/// `main_queue_name`. Records for any other queue are ignored, matching
/// records are summed, and missing metadata counts as zero.
pub fn count_attempts(metadata: Option<&RetryMetadata>, main_queue_name: &str) -> u32 {
    let Some(metadata) = metadata else {
        return 0;
    };

    let total: u64 = metadata
        .records
        .iter()
        .filter(|record| record.queue_name == main_queue_name)
        .fold(0u64, |acc, record| acc.saturating_add(record.failure_count));

    u32::try_from(total).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_inclusive() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn oversized_counts_saturate() {
        let metadata = RetryMetadata::new(vec![DeathRecord::new("push", u64::MAX)]);
        assert_eq!(count_attempts(Some(&metadata), "push"), u32::MAX);
    }
}
