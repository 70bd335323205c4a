//! Credential cookies.
//!
//! Both cookies are `HttpOnly`, `SameSite=None` and scoped to `/`. The access
//! cookie lives as long as the token; the refresh cookie carries the session's
//! explicit expiry. Clearing sets a negative `Max-Age`.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use time::OffsetDateTime;

use crate::config::AuthConfig;

#[derive(Debug, Clone)]
pub struct CookieSettings {
    access_name: Arc<str>,
    refresh_name: Arc<str>,
    secure: bool,
    access_max_age: time::Duration,
}

impl CookieSettings {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            access_name: Arc::from(config.access_cookie.as_str()),
            refresh_name: Arc::from(config.refresh_cookie.as_str()),
            secure: config.secure_cookies,
            access_max_age: time::Duration::seconds(config.access_ttl_secs as i64),
        }
    }

    pub fn access_name(&self) -> Arc<str> {
        self.access_name.clone()
    }

    pub fn refresh_name(&self) -> Arc<str> {
        self.refresh_name.clone()
    }

    fn base(&self, name: &Arc<str>, value: String) -> Cookie<'static> {
        Cookie::build((name.to_string(), value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::None)
            .path("/")
            .build()
    }

    pub fn access(&self, token: &str) -> Cookie<'static> {
        let mut cookie = self.base(&self.access_name, token.to_string());
        cookie.set_max_age(self.access_max_age);
        cookie
    }

    pub fn refresh(&self, secret: &str, expires_at: DateTime<Utc>) -> Cookie<'static> {
        let mut cookie = self.base(&self.refresh_name, secret.to_string());
        match OffsetDateTime::from_unix_timestamp(expires_at.timestamp()) {
            Ok(at) => cookie.set_expires(at),
            Err(_) => {
                let remaining = (expires_at - Utc::now()).num_seconds().max(0);
                cookie.set_max_age(time::Duration::seconds(remaining));
            }
        }
        cookie
    }

    fn cleared(&self, name: &Arc<str>) -> Cookie<'static> {
        let mut cookie = self.base(name, String::new());
        cookie.set_max_age(time::Duration::seconds(-1));
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        cookie
    }

    /// Add both credential cookies.
    pub fn set_credentials(
        &self,
        jar: CookieJar,
        access_token: &str,
        refresh_secret: &str,
        refresh_expires_at: DateTime<Utc>,
    ) -> CookieJar {
        jar.add(self.access(access_token))
            .add(self.refresh(refresh_secret, refresh_expires_at))
    }

    /// Overwrite both cookies with expired blanks.
    pub fn clear_credentials(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cleared(&self.access_name))
            .add(self.cleared(&self.refresh_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CookieSettings {
        CookieSettings::from_config(&AuthConfig::default())
    }

    #[test]
    fn test_access_cookie_flags() {
        let rendered = settings().access("tok").to_string();
        assert!(rendered.starts_with("nl_access=tok"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=None"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=900"));
    }

    #[test]
    fn test_refresh_cookie_has_explicit_expiry() {
        let expires = DateTime::parse_from_rfc3339("2030-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let cookie = settings().refresh("secret", expires);

        assert_eq!(cookie.name(), "nl_refresh");
        let at = cookie.expires_datetime().unwrap();
        assert_eq!(at.unix_timestamp(), expires.timestamp());
        assert!(cookie.max_age().is_none());
    }

    #[test]
    fn test_clear_sets_negative_max_age() {
        let jar = settings().clear_credentials(CookieJar::new());
        for name in ["nl_access", "nl_refresh"] {
            let cookie = jar.get(name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(time::Duration::seconds(-1)));
        }
    }

    #[test]
    fn test_insecure_cookies_for_local_development() {
        let config = AuthConfig {
            secure_cookies: false,
            ..AuthConfig::default()
        };
        let rendered = CookieSettings::from_config(&config).access("tok").to_string();
        assert!(!rendered.contains("Secure"));
    }
}
