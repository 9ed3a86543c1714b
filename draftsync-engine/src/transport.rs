//! Transport layer abstraction.
//!
//! The wire transport is injected, never implemented here. It must be
//! safe to call repeatedly with different payloads, and it may observe
//! or ignore the cancellation token on the context. Timeouts are the
//! transport's responsibility.

use crate::error::AutosaveResult;
use async_trait::async_trait;
use draftsync_types::{Payload, SaveAck, SaveContext};

/// The injected asynchronous persistence callable.
#[async_trait]
pub trait SaveTransport: Send + Sync {
    /// Persists the payload, returning an acknowledgement on success.
    async fn save(&self, payload: &Payload, ctx: &SaveContext) -> AutosaveResult<SaveAck>;
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use crate::error::AutosaveError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// A scripted transport: plays back queued outcomes and records
    /// every call it receives.
    ///
    /// With an empty script it acknowledges with an empty [`SaveAck`].
    /// An optional delay makes inflight windows observable; while
    /// delayed it honors the context's cancellation token.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        script: Mutex<VecDeque<AutosaveResult<SaveAck>>>,
        calls: Mutex<Vec<RecordedCall>>,
        delay: Mutex<Option<Duration>>,
    }

    /// One observed transport invocation.
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        /// The payload the transport received.
        pub payload: Payload,
        /// The retry count on the attempt's context.
        pub retry_count: u32,
    }

    impl MockTransport {
        /// Creates a transport that always acknowledges.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a transport that fails `failures` times, then
        /// acknowledges.
        #[must_use]
        pub fn failing_times(failures: usize) -> Self {
            let transport = Self::new();
            for _ in 0..failures {
                transport.push_outcome(Err(AutosaveError::transport("scripted failure")));
            }
            transport
        }

        /// Queues the next outcome to play back.
        pub fn push_outcome(&self, outcome: AutosaveResult<SaveAck>) {
            self.script.lock().unwrap().push_back(outcome);
        }

        /// Delays every call, making the inflight window observable.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        /// The calls received so far.
        #[must_use]
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of calls received so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SaveTransport for MockTransport {
        async fn save(&self, payload: &Payload, ctx: &SaveContext) -> AutosaveResult<SaveAck> {
            self.calls.lock().unwrap().push(RecordedCall {
                payload: payload.clone(),
                retry_count: ctx.retry_count,
            });

            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancel.cancelled() => return Err(AutosaveError::Aborted),
                }
            }

            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(SaveAck::new()))
        }
    }
}
