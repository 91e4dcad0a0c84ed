//! Consumer pool & router (§4.E): one worker per durable consumer, pulling
//! batches and dispatching decoded messages to every subscriber whose
//! declared pattern matches the concrete subject.

mod context;
mod metrics;
mod pool;
mod subscriber;
mod worker;

pub use context::MessageContext;
pub use metrics::RouterMetrics;
pub use pool::{ConsumerPool, ConsumerPoolConfig, ShutdownHandle};
pub use subscriber::{Subscriber, SubscriberError, SubscriberHandle, SubscriberRegistration};
pub use worker::{Worker, WorkerConfig};
