//! Registry configuration

/// What a listener queue does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Never drop; the queue grows without bound
    #[default]
    Unbounded,
    /// Discard the oldest queued chunk to make room
    DropOldest,
    /// Discard the incoming chunk
    DropNewest,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "unbounded" => Ok(OverflowPolicy::Unbounded),
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

/// Configuration for the stream registry and the channels it creates
///
/// The default queue is unbounded: an attached listener never loses a chunk, at
/// the cost of memory growing with a stalled consumer. `DropOldest` and
/// `DropNewest` bound that memory by `listener_queue_capacity` and drop chunks
/// for that listener only.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum chunks queued per listener (ignored when unbounded)
    pub listener_queue_capacity: usize,

    /// Behaviour of a full listener queue
    pub overflow_policy: OverflowPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listener_queue_capacity: 1024,
            overflow_policy: OverflowPolicy::Unbounded,
        }
    }
}

impl RegistryConfig {
    /// Set the per-listener queue capacity (minimum 1)
    pub fn listener_queue_capacity(mut self, capacity: usize) -> Self {
        self.listener_queue_capacity = capacity.max(1);
        self
    }

    /// Set the overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }
}
