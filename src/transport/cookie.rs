use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use http::HeaderMap;
use http::header::{COOKIE, HeaderValue, SET_COOKIE};

use crate::Id;
use crate::transport::SessionIdTransport;

/// Configuration options for session cookies.
///
/// # Example
///
/// ```rust
/// use sesh::transport::CookieOptions;
///
/// let cookie_options = CookieOptions::build()
///         .name("test_sess")
///         .http_only(true)
///         .same_site(cookie::SameSite::Lax)
///         .secure(true)
///         .max_age(1 * 60)
///         .path("/");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct CookieOptions {
    pub http_only: bool,
    pub name: &'static str,
    pub domain: Option<&'static str>,
    pub path: Option<&'static str>,
    pub same_site: SameSite,
    pub secure: bool,
    /// Cookie lifetime in seconds; `None` leaves it a browser-session cookie.
    pub max_age: Option<i64>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            name: "id",
            domain: None,
            path: Some("/"),
            same_site: SameSite::Lax,
            secure: true,
            max_age: None,
        }
    }
}

impl CookieOptions {
    /// Creates a new `CookieOptions` with default values.
    pub fn build() -> Self {
        Self::default()
    }

    /// Sets the name of the cookie.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn domain(mut self, domain: &'static str) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn path(mut self, path: &'static str) -> Self {
        self.path = Some(path);
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }
}

/// Carries the session id in a cookie: read from `Cookie`, written with
/// `Set-Cookie`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CookieTransport {
    options: CookieOptions,
}

impl CookieTransport {
    pub fn new(options: CookieOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    fn build_cookie(&self, value: String) -> Cookie<'static> {
        let options = &self.options;
        let mut cookie_builder = Cookie::build((options.name, value))
            .secure(options.secure)
            .http_only(options.http_only)
            .same_site(options.same_site);

        if let Some(max_age) = options.max_age {
            cookie_builder = cookie_builder.max_age(Duration::seconds(max_age));
        }
        if let Some(domain) = options.domain {
            cookie_builder = cookie_builder.domain(domain);
        }
        if let Some(path) = options.path {
            cookie_builder = cookie_builder.path(path);
        }

        cookie_builder.build()
    }

    fn append(&self, headers: &mut HeaderMap, cookie: Cookie<'static>) {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => tracing::error!(err = %err, "failed to encode session cookie"),
        }
    }
}

impl SessionIdTransport for CookieTransport {
    fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.options.name)
            .map(|cookie| cookie.value().to_owned())
    }

    fn write(&self, headers: &mut HeaderMap, id: &Id) {
        let cookie = self.build_cookie(id.to_string());
        self.append(headers, cookie);
    }

    fn clear(&self, headers: &mut HeaderMap) {
        let mut cookie = self.build_cookie(String::new());
        cookie.make_removal();
        self.append(headers, cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> CookieTransport {
        CookieTransport::new(
            CookieOptions::build()
                .name("test_sess")
                .http_only(true)
                .same_site(SameSite::Strict)
                .secure(true)
                .max_age(60)
                .domain("example.com"),
        )
    }

    #[test]
    fn test_reads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; test_sess=abc"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));

        assert_eq!(transport().read(&headers).as_deref(), Some("abc"));
        assert_eq!(CookieTransport::default().read(&headers), None);
    }

    #[test]
    fn test_writes_cookie_attributes() {
        let id: Id = "00112233445566778899aabbccddeeff".parse().unwrap();
        let mut headers = HeaderMap::new();
        transport().write(&mut headers, &id);

        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("test_sess=00112233445566778899aabbccddeeff"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=60"));
        assert!(cookie.contains("Domain=example.com"));
        assert!(cookie.contains("Path=/"));
    }

    #[test]
    fn test_clear_expires_cookie() {
        let mut headers = HeaderMap::new();
        transport().clear(&mut headers);

        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("test_sess=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
