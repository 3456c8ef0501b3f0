use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::Session;
use crate::store::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A store-wide lifecycle hook.
///
/// A hook that fails, by returning `Err` or by panicking, is logged and
/// otherwise ignored: the store operation that fired it still completes.
pub type SessionCallback = Arc<dyn Fn(&Session) -> Result<(), BoxError> + Send + Sync>;

/// Configuration shared by every session a store creates.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use sesh::StoreConfig;
///
/// let config = StoreConfig::build()
///     .max_idle_time(Duration::from_secs(15 * 60))
///     .max_lifetime(Duration::from_secs(8 * 60 * 60))
///     .on_timeout(|session| {
///         println!("session {} timed out", session.id());
///         Ok(())
///     });
/// ```
#[derive(Clone)]
pub struct StoreConfig {
    pub max_idle_time: Duration,
    pub max_lifetime: Duration,
    /// Upper bound on how many sessions one sweep destroys.
    pub sweep_batch_size: usize,
    on_timeout: Option<SessionCallback>,
    on_destroy: Option<SessionCallback>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_idle_time: Duration::from_secs(30 * 60),
            max_lifetime: Duration::from_secs(24 * 60 * 60),
            sweep_batch_size: 1024,
            on_timeout: None,
            on_destroy: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("max_idle_time", &self.max_idle_time)
            .field("max_lifetime", &self.max_lifetime)
            .field("sweep_batch_size", &self.sweep_batch_size)
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

impl StoreConfig {
    /// Creates a new `StoreConfig` with default values.
    pub fn build() -> Self {
        Self::default()
    }

    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    pub fn max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    pub fn sweep_batch_size(mut self, sweep_batch_size: usize) -> Self {
        self.sweep_batch_size = sweep_batch_size;
        self
    }

    /// Fired when a session is destroyed because it expired, before `on_destroy`.
    pub fn on_timeout<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Session) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(callback));
        self
    }

    /// Fired on every destruction, explicit or by timeout.
    pub fn on_destroy<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Session) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_destroy = Some(Arc::new(callback));
        self
    }

    /// Checks the configuration; stores call this at construction.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_idle_time.is_zero() {
            return Err(Error::Config("max_idle_time must be positive".to_string()));
        }
        if self.max_lifetime.is_zero() {
            return Err(Error::Config("max_lifetime must be positive".to_string()));
        }
        let now = Instant::now();
        if now.checked_add(self.max_idle_time).is_none() {
            return Err(Error::Config("max_idle_time is out of range".to_string()));
        }
        if now.checked_add(self.max_lifetime).is_none() {
            return Err(Error::Config("max_lifetime is out of range".to_string()));
        }
        if self.sweep_batch_size == 0 {
            return Err(Error::Config("sweep_batch_size must be positive".to_string()));
        }
        Ok(())
    }

    pub(crate) fn notify_timeout(&self, session: &Session) {
        if let Some(callback) = &self.on_timeout {
            dispatch("on_timeout", callback, session);
        }
    }

    pub(crate) fn notify_destroy(&self, session: &Session) {
        if let Some(callback) = &self.on_destroy {
            dispatch("on_destroy", callback, session);
        }
    }
}

fn dispatch(hook: &'static str, callback: &SessionCallback, session: &Session) {
    match catch_unwind(AssertUnwindSafe(|| callback(session))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(err = %err, hook, session_id = %session.id(), "session callback failed");
        }
        Err(_) => {
            tracing::error!(hook, session_id = %session.id(), "session callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_durations() {
        assert!(StoreConfig::build().validate().is_ok());

        let err = StoreConfig::build()
            .max_idle_time(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = StoreConfig::build()
            .max_lifetime(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(StoreConfig::build().sweep_batch_size(0).validate().is_err());
    }

    #[test]
    fn test_rejects_unrepresentable_durations() {
        let err = StoreConfig::build()
            .max_lifetime(Duration::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = StoreConfig::build()
            .max_idle_time(Duration::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_hides_callbacks() {
        let config = StoreConfig::build().on_destroy(|_| Ok(()));
        let debug = format!("{config:?}");

        assert!(debug.contains("on_destroy: true"));
        assert!(debug.contains("on_timeout: false"));
    }
}
