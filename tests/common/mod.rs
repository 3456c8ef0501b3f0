#![allow(dead_code)]

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sesh::store::memory::MemoryStore;
use sesh::transport::CookieOptions;
use sesh::{Id, StoreConfig};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
}

pub fn create_test_user() -> TestUser {
    TestUser {
        id: 1,
        name: "Test User".to_string(),
    }
}

pub fn build_cookie_options() -> CookieOptions {
    CookieOptions::build()
        .name("test_sess")
        .http_only(true)
        .same_site(cookie::SameSite::Lax)
        .secure(true)
        .max_age(15)
        .path("/")
}

/// Lifecycle events in the order the store fired them.
pub type Events = Arc<Mutex<Vec<(&'static str, Id)>>>;

pub fn recording_config(max_idle: Duration, max_lifetime: Duration) -> (StoreConfig, Events) {
    let events: Events = Arc::default();
    let on_timeout = Arc::clone(&events);
    let on_destroy = Arc::clone(&events);

    let config = StoreConfig::build()
        .max_idle_time(max_idle)
        .max_lifetime(max_lifetime)
        .on_timeout(move |session| {
            on_timeout.lock().push(("timeout", session.id()));
            Ok(())
        })
        .on_destroy(move |session| {
            on_destroy.lock().push(("destroy", session.id()));
            Ok(())
        });

    (config, events)
}

pub fn recording_store(max_idle: Duration, max_lifetime: Duration) -> (MemoryStore, Events) {
    let (config, events) = recording_config(max_idle, max_lifetime);
    (MemoryStore::new(config).unwrap(), events)
}
