//! How a session id travels between client and server.
//!
//! The store never inspects requests or responses directly. It asks a
//! [`SessionIdTransport`] for the presented id and hands it the id to send
//! back, so the same store works behind cookies, headers or anything else.

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};

use crate::Id;

mod cookie;
pub use cookie::{CookieOptions, CookieTransport};

pub trait SessionIdTransport: Send + Sync + 'static {
    /// Returns the raw session id presented by the client, if any.
    fn read(&self, headers: &HeaderMap) -> Option<String>;

    /// Hands `id` to the client on the outgoing response.
    fn write(&self, headers: &mut HeaderMap, id: &Id);

    /// Tells the client to forget its session id.
    fn clear(&self, _headers: &mut HeaderMap) {}
}

/// Carries the session id in a plain header, in both directions.
///
/// # Example
///
/// ```rust
/// use http::HeaderName;
/// use sesh::transport::HeaderTransport;
///
/// let transport = HeaderTransport::new(HeaderName::from_static("x-auth-session"));
/// assert_eq!(transport.name().as_str(), "x-auth-session");
/// ```
#[derive(Clone, Debug)]
pub struct HeaderTransport {
    name: HeaderName,
}

impl Default for HeaderTransport {
    fn default() -> Self {
        Self {
            name: HeaderName::from_static("x-session-id"),
        }
    }
}

impl HeaderTransport {
    /// Uses `name` for the header.
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &HeaderName {
        &self.name
    }
}

impl SessionIdTransport for HeaderTransport {
    fn read(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(&self.name)?;
        match value.to_str() {
            Ok(value) => Some(value.trim().to_owned()),
            Err(err) => {
                tracing::warn!(err = %err, "session header is not valid ascii");
                None
            }
        }
    }

    fn write(&self, headers: &mut HeaderMap, id: &Id) {
        match HeaderValue::from_str(&id.to_string()) {
            Ok(value) => {
                headers.insert(self.name.clone(), value);
            }
            Err(err) => tracing::error!(err = %err, "failed to encode session header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_transport_round_trip() {
        let transport = HeaderTransport::default();
        let id: Id = "00112233445566778899aabbccddeeff".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(transport.read(&headers), None);

        transport.write(&mut headers, &id);
        assert_eq!(
            headers.get("x-session-id").unwrap(),
            "00112233445566778899aabbccddeeff"
        );
        assert_eq!(
            transport.read(&headers).as_deref(),
            Some("00112233445566778899aabbccddeeff")
        );
    }

    #[test]
    fn test_header_transport_with_configured_name() {
        assert!("x session".parse::<HeaderName>().is_err());

        let name: HeaderName = "X-Auth-Session".parse().unwrap();
        let transport = HeaderTransport::new(name);
        assert_eq!(transport.name().as_str(), "x-auth-session");

        let mut headers = HeaderMap::new();
        headers.insert("x-auth-session", HeaderValue::from_static(" abc "));
        assert_eq!(transport.read(&headers).as_deref(), Some("abc"));
        assert_eq!(HeaderTransport::default().read(&headers), None);
    }
}
