//! # Sesh: server-side sessions for tower services
//!
//! `sesh` keeps per-client state on the server. Each client holds nothing but
//! an opaque 128-bit id; the data lives in a [`Session`] owned by a
//! [`SessionStore`], which creates sessions, expires them and tells you when
//! they go away.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use sesh::{Session, SessionLayer, StoreConfig};
//! use sesh::store::memory::MemoryStore;
//! use sesh::transport::{CookieOptions, CookieTransport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = StoreConfig::build()
//!         .max_idle_time(Duration::from_secs(30 * 60))
//!         .max_lifetime(Duration::from_secs(12 * 60 * 60));
//!     let store = Arc::new(MemoryStore::new(config).unwrap());
//!
//!     // Destroy expired sessions every minute.
//!     sesh::store::spawn_sweeper(&store, Duration::from_secs(60)).unwrap();
//!
//!     let session_layer = SessionLayer::new(store)
//!         .with_transport(CookieTransport::new(CookieOptions::build().name("session")));
//!
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(session_layer);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//!
//! async fn handler(session: Session) -> String {
//!     let count = session.get::<i32>("count").unwrap().unwrap_or(0) + 1;
//!     session.set("count", &count).unwrap();
//!     format!("You've visited this page {} times", count)
//! }
//! ```
//!
//! # Expiry
//!
//! Every session has two deadlines: an absolute one fixed at creation
//! (`max_lifetime`) and an idle one pushed forward each time a request loads
//! the session (`max_idle_time`). Reading or writing data does not count as
//! an access. A session is expired once either deadline has passed.
//!
//! Expired sessions are destroyed when a client presents their id, in which
//! case the client transparently gets a new session, or by
//! [`SessionStore::sweep`]. The store fires `on_timeout` and then
//! `on_destroy` for expired sessions, and only `on_destroy` for
//! [`SessionStore::destroy_session`].
//!
//! # Transports
//!
//! The store does not care how the id reaches the client. The
//! [`transport::SessionIdTransport`] seam ships with a cookie and a header
//! implementation; [`SessionLayer::new`] defaults to the `x-session-id` header.
//!
//! ## Serialization
//! Session values are encoded with one of two serialization backends:
//!
//! - [`bincode`](https://crates.io/crates/bincode) (default) - Fast, compact binary serialization.
//! - [`rmp-serde`](https://crates.io/crates/rmp-serde) (MessagePack) - Cross-language compatible serialization.
//!
//! ```toml
//! [dependencies]
//! sesh = { version = "0.1", default-features = false, features = ["axum", "messagepack"] }
//! ```

pub use cookie;

#[cfg(feature = "axum")]
mod extract;

mod service;
pub use service::*;

mod session;
pub use session::*;

pub mod store;
pub use store::{SessionStore, StoreConfig};

pub mod transport;
