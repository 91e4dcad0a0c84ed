/// Stream retention policy, mirroring JetStream's own semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Limits,
    WorkQueue,
    Interest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    File,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    None,
    All,
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    All,
    New,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: RetentionPolicy,
    pub storage: StorageType,
    pub max_age_seconds: Option<u64>,
    pub max_msgs_per_subject: Option<i64>,
    pub duplicate_window_ms: Option<i64>,
}

impl StreamConfig {
    /// One stream per environment, filtered to `env.app.>`, matching the
    /// topology manager's stream contract.
    pub fn for_environment(env: &str, app: &str) -> Self {
        Self {
            name: format!("{env}_{app}"),
            subjects: vec![format!("{env}.{app}.>")],
            retention: RetentionPolicy::Limits,
            storage: StorageType::File,
            max_age_seconds: None,
            max_msgs_per_subject: None,
            duplicate_window_ms: Some(120_000),
        }
    }

    pub fn for_dlq(env: &str, app: &str, suffix: &str) -> Self {
        Self {
            name: format!("{env}_{app}_{suffix}"),
            subjects: vec![format!("{env}.{app}.{suffix}")],
            retention: RetentionPolicy::Limits,
            storage: StorageType::File,
            max_age_seconds: Some(30 * 24 * 3_600),
            max_msgs_per_subject: None,
            duplicate_window_ms: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub durable_name: String,
    pub filter_subject: String,
    pub ack_policy: AckPolicy,
    pub deliver_policy: DeliverPolicy,
    pub max_deliver: i64,
    pub ack_wait_ms: i64,
    pub backoff_ms: Vec<i64>,
}

impl ConsumerConfig {
    /// Canonical form used for reconciliation: durations already in ms,
    /// everything else as-is. Kept as a method rather than a `Hash`/`Eq`
    /// derive because the live side normalizes independently (see
    /// `relay-topology`).
    pub fn canonical(&self) -> (String, AckPolicy, DeliverPolicy, i64, i64, Vec<i64>) {
        (
            self.filter_subject.to_ascii_lowercase(),
            self.ack_policy,
            self.deliver_policy,
            self.max_deliver,
            self.ack_wait_ms,
            self.backoff_ms.clone(),
        )
    }
}

/// Snapshot of a durable consumer's *live* configuration, as reported by the
/// broker's management surface.
#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub durable_name: String,
    pub config: ConsumerConfig,
}
