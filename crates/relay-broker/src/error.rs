#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker operation timed out")]
    Timeout,
    #[error("no broker servers available")]
    NoServers,
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("stream or consumer not found: {0}")]
    NotFound(String),
    #[error("broker returned an error: {0}")]
    Other(String),
}

impl BrokerError {
    /// Transport/timeout/no-servers class named in §4.B step 6 as the fixed
    /// retryable set for publish.
    pub fn is_retryable_transport(&self) -> bool {
        matches!(self, BrokerError::Connection(_) | BrokerError::Timeout | BrokerError::NoServers)
    }

    /// 404-class errors the router and topology manager treat as
    /// recoverable: re-ensure topology and re-subscribe, then continue.
    pub fn is_recoverable_topology_error(&self) -> bool {
        matches!(self, BrokerError::NotFound(_))
    }
}
