// src/system/sso.rs

//! SSO access tokens, read from the AWS CLI token cache and refreshed with
//! `aws sso login` when none is valid.

use crate::core::interfaces::IdentityProvider;
use crate::errors::SwampError;
use crate::system::executor;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::Deserialize;
use std::{collections::HashMap, fs, path::PathBuf};

/// One token file of `~/.aws/sso/cache`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CachedToken {
    #[serde(default)]
    start_url: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_at: String,
}

/// Parses the expiry formats the AWS CLI has written over time.
pub fn parse_sso_expiry(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SUTC") {
        return Some(t.and_utc());
    }
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn normalize_start_url(value: &str) -> &str {
    value.trim().trim_end_matches('/')
}

/// Finds the unexpired token with the latest expiry.
///
/// Tokens for `preferred_start_url` win; any other unexpired token is only
/// used when none matches.
pub fn find_access_token(
    cache_dir: &std::path::Path,
    preferred_start_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, String> {
    let entries = fs::read_dir(cache_dir)
        .map_err(|e| format!("read SSO cache dir '{}': {}", cache_dir.display(), e))?;

    let tokens: Vec<(CachedToken, DateTime<Utc>)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| fs::read(&path).ok())
        .filter_map(|bytes| serde_json::from_slice::<CachedToken>(&bytes).ok())
        .filter(|token| !token.access_token.trim().is_empty())
        .filter_map(|token| {
            let expiry = parse_sso_expiry(&token.expires_at)?;
            (expiry > now).then_some((token, expiry))
        })
        .collect();

    let preferred = preferred_start_url
        .map(normalize_start_url)
        .filter(|url| !url.is_empty());
    let best = |matching: &dyn Fn(&CachedToken) -> bool| {
        tokens
            .iter()
            .filter(|(token, _)| matching(token))
            .max_by_key(|(_, expiry)| *expiry)
            .map(|(token, _)| token.access_token.clone())
    };

    let found = match preferred {
        Some(url) => best(&|t: &CachedToken| normalize_start_url(&t.start_url) == url)
            .or_else(|| best(&|_: &CachedToken| true)),
        None => best(&|_: &CachedToken| true),
    };
    found.ok_or_else(|| {
        "no valid, unexpired SSO access token found in ~/.aws/sso/cache (run aws sso login)"
            .to_string()
    })
}

/// Produces the SSO bearer token of one profile.
#[derive(Debug, Clone)]
pub struct SsoIdentity {
    profile: String,
    start_url: Option<String>,
    cache_dir: PathBuf,
}

impl SsoIdentity {
    pub fn new(profile: impl Into<String>, start_url: Option<String>, cache_dir: PathBuf) -> Self {
        Self {
            profile: profile.into(),
            start_url,
            cache_dir,
        }
    }

    fn lookup(&self) -> Result<String, String> {
        find_access_token(&self.cache_dir, self.start_url.as_deref(), Utc::now())
    }
}

impl IdentityProvider for SsoIdentity {
    fn access_token(&self) -> Result<String, SwampError> {
        match self.lookup() {
            Ok(token) => return Ok(token),
            Err(reason) => debug!("no cached SSO token: {}", reason),
        }

        let args: Vec<String> = ["sso", "login", "--profile", self.profile.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        executor::run_interactive("aws", &args, &HashMap::new()).map_err(|e| SwampError::Auth {
            profile: self.profile.clone(),
            reason: e.to_string(),
        })?;

        self.lookup().map_err(|reason| SwampError::Auth {
            profile: self.profile.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn write_token(dir: &TempDir, file: &str, start_url: &str, token: &str, expires: &str) {
        let body = serde_json::json!({
            "startUrl": start_url,
            "accessToken": token,
            "expiresAt": expires,
            "region": "eu-west-1",
        });
        fs::write(dir.path().join(file), body.to_string()).unwrap();
    }

    #[test]
    fn test_parses_every_expiry_format() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap();
        assert_eq!(parse_sso_expiry("2025-06-01T13:00:00Z"), Some(expected));
        assert_eq!(parse_sso_expiry("2025-06-01T13:00:00UTC"), Some(expected));
        assert_eq!(parse_sso_expiry("2025-06-01T15:00:00+0200"), Some(expected));
        assert_eq!(parse_sso_expiry("tomorrow"), None);
    }

    #[test]
    fn test_prefers_matching_start_url_then_latest_expiry() {
        let dir = TempDir::new().unwrap();
        write_token(&dir, "a.json", "https://corp.awsapps.com/start", "corp-early", "2025-06-01T13:00:00Z");
        write_token(&dir, "b.json", "https://corp.awsapps.com/start/", "corp-late", "2025-06-01T18:00:00Z");
        write_token(&dir, "c.json", "https://other.awsapps.com/start", "other", "2025-06-02T00:00:00Z");
        write_token(&dir, "d.json", "https://corp.awsapps.com/start", "expired", "2025-06-01T11:00:00Z");
        fs::write(dir.path().join("e.json"), "garbage").unwrap();

        let token = find_access_token(dir.path(), Some("https://corp.awsapps.com/start/"), now());
        assert_eq!(token, Ok("corp-late".to_string()));

        let any = find_access_token(dir.path(), None, now());
        assert_eq!(any, Ok("other".to_string()));
    }

    #[test]
    fn test_falls_back_to_any_token_when_start_url_does_not_match() {
        let dir = TempDir::new().unwrap();
        write_token(&dir, "a.json", "https://other.awsapps.com/start", "other", "2025-06-01T13:00:00Z");

        let token = find_access_token(dir.path(), Some("https://corp.awsapps.com/start"), now());
        assert_eq!(token, Ok("other".to_string()));
    }

    #[test]
    fn test_no_valid_token_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_token(&dir, "a.json", "", "expired", "2025-06-01T11:00:00Z");
        assert!(find_access_token(dir.path(), None, now()).is_err());
        assert!(find_access_token(&dir.path().join("missing"), None, now()).is_err());
    }
}
