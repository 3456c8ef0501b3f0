//! Session management middleware for tower applications.
//!
//! This module provides [`SessionLayer`] for integrating
//! session management into tower applications.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response, StatusCode};
use tower::{Layer, Service};

use crate::Session;
use crate::store::SessionStore;
use crate::transport::{HeaderTransport, SessionIdTransport};

/// A Tower Middleware to use `Session`.
///
/// Before the inner service runs, the store resolves the request's session
/// and attaches it to the request extensions. Once the inner service has
/// responded, the store persists the session and writes its id back through
/// the transport. A store failure on either side becomes a
/// `500 Internal Server Error` response.
#[derive(Debug)]
pub struct SessionService<S, T, Tr = HeaderTransport> {
    inner: S,
    store: Arc<T>,
    transport: Arc<Tr>,
}

impl<S: Clone, T, Tr> Clone for SessionService<S, T, Tr> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

impl<ReqBody, ResBody, S, T, Tr> Service<Request<ReqBody>> for SessionService<S, T, Tr>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
    T: SessionStore,
    Tr: SessionIdTransport,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);

        // The ready service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let req = match store.load_session(req, transport.as_ref()).await {
                Ok(req) => req,
                Err(_) => return Ok(internal_error()),
            };
            let session = match Session::from_request(&req) {
                Ok(session) => session,
                Err(_) => return Ok(internal_error()),
            };

            let res = inner.call(req).await?;

            match store.store_session(&session, res, transport.as_ref()).await {
                Ok(res) => Ok(res),
                Err(_) => Ok(internal_error()),
            }
        })
    }
}

fn internal_error<B: Default>() -> Response<B> {
    let mut res = Response::new(B::default());
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res
}

/// Layer to apply [`SessionService`] middleware.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use sesh::{SessionLayer, StoreConfig};
/// use sesh::store::memory::MemoryStore;
/// use sesh::transport::{CookieOptions, CookieTransport};
///
/// let cookie_options = CookieOptions::build()
///         .name("test_sess")
///         .http_only(true)
///         .same_site(cookie::SameSite::Lax)
///         .secure(true)
///         .path("/");
///
/// let store = MemoryStore::new(StoreConfig::build()).unwrap();
/// let session_layer = SessionLayer::new(Arc::new(store))
///     .with_transport(CookieTransport::new(cookie_options));
/// ```
#[derive(Debug)]
pub struct SessionLayer<T, Tr = HeaderTransport> {
    store: Arc<T>,
    transport: Arc<Tr>,
}

impl<T, Tr> Clone for SessionLayer<T, Tr> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T> SessionLayer<T>
where
    T: SessionStore,
{
    /// Create a new session manager layer carrying the id in an
    /// `x-session-id` header.
    pub fn new(store: Arc<T>) -> Self {
        Self {
            store,
            transport: Arc::new(HeaderTransport::default()),
        }
    }
}

impl<T, Tr> SessionLayer<T, Tr>
where
    T: SessionStore,
    Tr: SessionIdTransport,
{
    /// Set how the session id travels to and from the client.
    pub fn with_transport<U>(self, transport: U) -> SessionLayer<T, U>
    where
        U: SessionIdTransport,
    {
        SessionLayer {
            store: self.store,
            transport: Arc::new(transport),
        }
    }

    pub fn store(&self) -> &Arc<T> {
        &self.store
    }
}

impl<S, T, Tr> Layer<S> for SessionLayer<T, Tr>
where
    T: SessionStore,
    Tr: SessionIdTransport,
{
    type Service = SessionService<S, T, Tr>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
        }
    }
}
