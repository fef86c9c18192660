/// Log callback registration.
/// Holds at most one subscriber that receives a line of text for every state
/// change the service performs. Delivery is synchronous on the calling thread.
use crate::error::{Result, ServiceError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Receiver for service events
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Single-subscriber event sink
#[derive(Default)]
pub struct EventSink {
    subscriber: RwLock<Option<Arc<dyn LogSink>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the subscriber. A second registration is rejected with
    /// `AlreadyRegistered` and leaves the first one in place.
    pub fn register(&self, sink: Arc<dyn LogSink>) -> Result<()> {
        let mut subscriber = self.subscriber.write()?;
        if subscriber.is_some() {
            return Err(ServiceError::AlreadyRegistered);
        }
        *subscriber = Some(sink);
        Ok(())
    }

    /// Drop the current subscriber. Returns whether one was registered.
    pub fn unregister(&self) -> Result<bool> {
        Ok(self.subscriber.write()?.take().is_some())
    }

    #[cfg(test)]
    pub fn is_registered(&self) -> bool {
        self.subscriber
            .read()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Deliver `message` to the subscriber, if any.
    ///
    /// The lock is released before the callback runs, so a subscriber may
    /// call back into the service or unregister itself. A panicking
    /// subscriber loses the event but never unwinds into the caller.
    pub fn emit(&self, message: &str) {
        let sink = match self.subscriber.read() {
            Ok(subscriber) => subscriber.clone(),
            Err(_) => {
                log::error!("Event sink lock poisoned, dropping event: {}", message);
                return;
            }
        };

        match sink {
            Some(sink) => {
                if panic::catch_unwind(AssertUnwindSafe(|| sink.log(message))).is_err() {
                    log::error!("Log callback panicked, dropping event: {}", message);
                }
            }
            None => log::trace!("No log callback registered, event: {}", message),
        }
    }
}
