use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response};
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinHandle;

use crate::transport::SessionIdTransport;
use crate::{Id, Session};

mod config;
pub use config::{BoxError, SessionCallback, StoreConfig};

pub mod memory;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Encoding failed with: {0}")]
    Encode(String),

    #[error("Decoding failed with: {0}")]
    Decode(String),

    #[error("{0}")]
    Backend(String),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("failed to generate a session id: {0}")]
    IdGeneration(String),
}

#[cfg(feature = "bincode")]
pub(crate) fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(feature = "bincode")]
pub(crate) fn deserialize_value<T: DeserializeOwned>(value: &[u8]) -> Result<T, Error> {
    bincode::serde::decode_from_slice(value, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(feature = "messagepack")]
pub(crate) fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    rmp_serde::to_vec(value).map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(feature = "messagepack")]
pub(crate) fn deserialize_value<T: DeserializeOwned>(value: &[u8]) -> Result<T, Error> {
    rmp_serde::from_slice(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Owns session creation, lookup, persistence, expiry and destruction.
///
/// Backends implement the primitives (`load`, `save`, `destroy_session`,
/// `sweep`); the request/response glue in [`SessionStore::load_session`] and
/// [`SessionStore::store_session`] is shared by every backend.
///
/// Backends that talk to a remote service must return their failures from
/// `load` and `save` rather than dropping session data.
pub trait SessionStore: Send + Sync + 'static {
    /// The configuration this store was built with.
    fn config(&self) -> &StoreConfig;

    /// Generates a fresh 128-bit id from the store's random source.
    fn create_session_id(&self) -> Result<Id, Error>;

    /// Resolves the live session for `session_id` and marks it accessed.
    ///
    /// Unknown or expired ids, and a missing id, yield a brand-new session.
    fn load(&self, session_id: Option<&Id>) -> impl Future<Output = Result<Session, Error>> + Send;

    /// Persists the session's current state.
    ///
    /// A destroyed session must not be written back.
    fn save(&self, session: &Session) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes the session, flags it destroyed and fires `on_destroy`.
    ///
    /// Calling it on an already destroyed session is a no-op.
    fn destroy_session(&self, session: &Session) -> impl Future<Output = Result<(), Error>> + Send;

    /// Destroys expired sessions through the timeout path, bounded by the
    /// configured batch size.
    ///
    /// Returns the number of sessions destroyed.
    fn sweep(&self) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Resolves the session for an inbound request and attaches it to the
    /// request extensions, where [`Session::from_request`] finds it.
    fn load_session<B, T>(
        &self,
        mut req: Request<B>,
        transport: &T,
    ) -> impl Future<Output = Result<Request<B>, Error>> + Send
    where
        B: Send,
        T: SessionIdTransport + ?Sized,
    {
        async move {
            let session_id = transport.read(req.headers()).and_then(|value| {
                value
                    .parse::<Id>()
                    .map_err(|err| {
                        tracing::warn!(
                            err = %err,
                            "possibly suspicious activity: malformed session id"
                        )
                    })
                    .ok()
            });

            let session = self.load(session_id.as_ref()).await.map_err(|err| {
                tracing::error!(err = %err, "failed to load session");
                err
            })?;

            req.extensions_mut().insert(session);
            Ok(req)
        }
    }

    /// Persists the request's session and hands its id to the client through
    /// the transport. A destroyed session is cleared from the client instead.
    fn store_session<B, T>(
        &self,
        session: &Session,
        mut res: Response<B>,
        transport: &T,
    ) -> impl Future<Output = Result<Response<B>, Error>> + Send
    where
        B: Send,
        T: SessionIdTransport + ?Sized,
    {
        async move {
            if session.is_destroyed() {
                transport.clear(res.headers_mut());
                return Ok(res);
            }

            self.save(session).await.map_err(|err| {
                tracing::error!(err = %err, session_id = %session.id(), "failed to save session");
                err
            })?;

            transport.write(res.headers_mut(), &session.id());
            Ok(res)
        }
    }
}

/// Runs [`SessionStore::sweep`] on `store` every `period` on the tokio runtime.
///
/// The task only holds a weak reference and exits once the store is dropped.
/// Fails with [`Error::Config`] if `period` is zero.
pub fn spawn_sweeper<S>(store: &Arc<S>, period: Duration) -> Result<JoinHandle<()>, Error>
where
    S: SessionStore,
{
    if period.is_zero() {
        return Err(Error::Config("sweep period must be positive".to_string()));
    }

    let store = Arc::downgrade(store);

    Ok(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let Some(store) = store.upgrade() else {
                tracing::debug!("session store dropped, stopping sweeper");
                break;
            };

            match store.sweep().await {
                Ok(0) => {}
                Ok(swept) => tracing::debug!(swept, "swept expired sessions"),
                Err(err) => tracing::error!(err = %err, "failed to sweep expired sessions"),
            }
        }
    }))
}
