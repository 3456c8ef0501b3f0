//! Server-side session state.

use std::collections::HashMap;
use std::result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use http::{Extensions, Request};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::time::Instant;

mod id;
use crate::store::{self, SessionStore, deserialize_value, serialize_value};
pub use id::{Id, IdGenerator, OsIdGenerator, RngIdGenerator};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("no session attached to the request; is the session layer installed?")]
    MissingSessionContext,
    #[error("session has been destroyed")]
    Destroyed,
}

type Result<T> = result::Result<T, Error>;

/// A key-value bag bound to a session id and two expiry clocks.
///
/// `Session` is a cheap handle over shared state: the owning store keeps one
/// clone in its index and each request touching the session gets another.
/// Values are encoded with the crate's codec, so anything implementing
/// `Serialize`/`Deserialize` can be stored.
///
/// Reading or writing data never moves the idle clock. The store calls
/// [`Session::mark_accessed`] once per request instead.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a session owned by `store`, drawing a fresh id and the
    /// configured lifetimes from it.
    pub fn new<S>(store: &S) -> result::Result<Self, store::Error>
    where
        S: SessionStore + ?Sized,
    {
        let id = store.create_session_id()?;
        let config = store.config();
        Ok(Self::with_id(id, config.max_idle_time, config.max_lifetime))
    }

    pub(crate) fn with_id(id: Id, max_idle_time: Duration, max_lifetime: Duration) -> Self {
        let now = Instant::now();
        let inner = Inner {
            id,
            data: RwLock::new(HashMap::new()),
            created: now,
            session_expiry: now + max_lifetime,
            idle_expiry: Mutex::new(now + max_idle_time),
            max_idle_time,
            changed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the session attached to `req` by the session layer.
    pub fn from_request<B>(req: &Request<B>) -> Result<Self> {
        Self::from_extensions(req.extensions())
    }

    /// Returns the session stored in a request's extensions.
    pub fn from_extensions(extensions: &Extensions) -> Result<Self> {
        extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("session not found in the request extensions");
            Error::MissingSessionContext
        })
    }

    pub fn id(&self) -> Id {
        self.inner.id
    }

    /// Retrieves the value stored under `key`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sesh::{Session, StoreConfig};
    /// use sesh::store::memory::MemoryStore;
    ///
    /// let store = MemoryStore::new(StoreConfig::build()).unwrap();
    /// let session = Session::new(&store).unwrap();
    ///
    /// session.set("theme", &"dark").unwrap();
    /// let theme: Option<String> = session.get("theme").unwrap();
    /// assert_eq!(theme.as_deref(), Some("dark"));
    /// ```
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let data = self.inner.data.read();
        match data.get(key) {
            Some(value) => Ok(Some(deserialize_value(value).map_err(|err| {
                tracing::error!(err = %err, key, "failed to decode session value");
                err
            })?)),
            None => Ok(None),
        }
    }

    /// Inserts or overwrites the value stored under `key`.
    ///
    /// Fails with [`Error::Destroyed`] once the session has been destroyed.
    pub fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        if self.is_destroyed() {
            tracing::warn!(session_id = %self.inner.id, key, "write to a destroyed session");
            return Err(Error::Destroyed);
        }

        let encoded = serialize_value(value).map_err(|err| {
            tracing::error!(err = %err, key, "failed to encode session value");
            err
        })?;
        self.inner.data.write().insert(key.to_owned(), encoded);
        self.changed();

        Ok(())
    }

    /// Removes `key`, returning whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        if self.is_destroyed() {
            return false;
        }

        let removed = self.inner.data.write().remove(key).is_some();
        if removed {
            self.changed();
        }
        removed
    }

    pub fn clear(&self) {
        if self.is_destroyed() {
            return;
        }

        let mut data = self.inner.data.write();
        if !data.is_empty() {
            data.clear();
            self.changed();
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.data.read().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    /// Pushes the idle deadline to now plus the store's maximum idle time.
    ///
    /// The absolute deadline is never affected.
    pub fn mark_accessed(&self) {
        *self.inner.idle_expiry.lock() = Instant::now() + self.inner.max_idle_time;
    }

    /// Returns `true` once now is past the earlier of the two deadlines.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at()
    }

    pub fn created(&self) -> Instant {
        self.inner.created
    }

    pub fn session_expiry(&self) -> Instant {
        self.inner.session_expiry
    }

    pub fn idle_expiry(&self) -> Instant {
        *self.inner.idle_expiry.lock()
    }

    /// The effective deadline, `min(session_expiry, idle_expiry)`.
    pub fn expires_at(&self) -> Instant {
        self.inner.session_expiry.min(self.idle_expiry())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Whether data changed since the store last persisted this session.
    pub fn is_changed(&self) -> bool {
        self.inner.changed.load(Ordering::Relaxed)
    }

    /// Returns `true` if both handles point at the same session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Flags the session destroyed. Only the first caller gets `true`.
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.inner.destroyed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_persisted(&self) {
        self.inner.changed.store(false, Ordering::Relaxed);
    }

    fn changed(&self) {
        self.inner.changed.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct Inner {
    id: Id,
    data: RwLock<HashMap<String, Vec<u8>>>,
    created: Instant,
    session_expiry: Instant,
    idle_expiry: Mutex<Instant>,
    max_idle_time: Duration,
    // set when a value is inserted or removed, cleared on save
    changed: AtomicBool,
    // set once, never unset
    destroyed: AtomicBool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Cart {
        items: Vec<String>,
        total: u32,
    }

    fn session(max_idle: Duration, max_lifetime: Duration) -> Session {
        Session::with_id(Id::from_bytes([7; 16]), max_idle, max_lifetime)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_session_is_live() {
        let session = session(Duration::from_secs(1), Duration::from_secs(3600));

        assert!(!session.is_expired());
        assert!(!session.is_destroyed());
        assert!(!session.is_changed());
        assert!(session.is_empty());
        assert_eq!(session.session_expiry(), session.created() + Duration::from_secs(3600));
        assert_eq!(session.idle_expiry(), session.created() + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_extension_scenario() {
        let session = session(Duration::from_secs(1), Duration::from_secs(3600));
        session.set("x", "y").unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        session.mark_accessed();

        tokio::time::advance(Duration::from_millis(700)).await;
        assert!(!session.is_expired());

        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(session.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_accessed_leaves_absolute_expiry() {
        let session = session(Duration::from_secs(10), Duration::from_secs(60));
        let absolute = session.session_expiry();
        let idle = session.idle_expiry();

        tokio::time::advance(Duration::from_secs(3)).await;
        session.mark_accessed();

        assert_eq!(session.session_expiry(), absolute);
        assert!(session.idle_expiry() > idle);
        assert_eq!(session.idle_expiry(), Instant::now() + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_lifetime_wins_over_activity() {
        let session = session(Duration::from_secs(10), Duration::from_secs(15));

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(5)).await;
            session.mark_accessed();
        }

        assert_eq!(session.expires_at(), session.session_expiry());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(session.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_does_not_touch_idle_clock() {
        let session = session(Duration::from_secs(1), Duration::from_secs(3600));
        let idle = session.idle_expiry();

        tokio::time::advance(Duration::from_millis(800)).await;
        session.set("count", &1).unwrap();

        assert_eq!(session.idle_expiry(), idle);
    }

    #[test]
    fn test_data_operations() {
        let session = session(Duration::from_secs(60), Duration::from_secs(60));
        let cart = Cart {
            items: vec!["apple".to_string(), "pear".to_string()],
            total: 420,
        };

        assert_eq!(session.get::<Cart>("cart").unwrap(), None);

        session.set("cart", &cart).unwrap();
        session.set("user", &42_i64).unwrap();
        assert!(session.is_changed());
        assert_eq!(session.get::<Cart>("cart").unwrap(), Some(cart));
        assert!(session.contains_key("user"));

        let mut keys = session.keys();
        keys.sort();
        assert_eq!(keys, vec!["cart".to_string(), "user".to_string()]);

        assert!(session.remove("cart"));
        assert!(!session.remove("cart"));
        assert_eq!(session.get::<Cart>("cart").unwrap(), None);

        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.get::<i64>("user").unwrap(), None);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let session = session(Duration::from_secs(60), Duration::from_secs(60));

        session.set("step", &1_u8).unwrap();
        session.set("step", &2_u8).unwrap();

        assert_eq!(session.get::<u8>("step").unwrap(), Some(2));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_destroyed_session_rejects_writes() {
        let session = session(Duration::from_secs(60), Duration::from_secs(60));
        session.set("a", &1).unwrap();

        assert!(session.mark_destroyed());
        assert!(!session.mark_destroyed());

        assert!(matches!(session.set("b", &2), Err(Error::Destroyed)));
        assert!(!session.remove("a"));
        session.clear();
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_missing_session_context() {
        let req = Request::new(());
        assert!(matches!(
            Session::from_request(&req),
            Err(Error::MissingSessionContext)
        ));

        let mut req = req;
        let session = session(Duration::from_secs(60), Duration::from_secs(60));
        req.extensions_mut().insert(session.clone());
        assert!(Session::from_request(&req).unwrap().ptr_eq(&session));
    }
}
