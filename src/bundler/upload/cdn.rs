//! CDN cache purge after a successful upload.

use super::UploadError;
use crate::bundler::Result;
use crate::bundler::settings::CdnServer;
use crate::bundler::utils::http;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// `Date` header value, e.g. `Tue, 02 Jan 2024 15:30:00 GMT`.
pub fn rfc1123_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Raw HMAC-SHA1 of `message` under `key`.
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| crate::bundler::Error::GenericError(format!("HMAC key error: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Purges the configured directory URLs from the CDN edge caches.
///
/// The request is a dated JSON `POST` authenticated as
/// `user:base64(hmac_sha1(api_key, date))`.
#[derive(Clone, Debug)]
pub struct CdnPurger {
    server: CdnServer,
    client: reqwest::Client,
}

impl CdnPurger {
    pub fn new(server: CdnServer, timeout: Duration) -> Result<Self> {
        Ok(Self {
            server,
            client: http::client(timeout)?,
        })
    }

    /// Request password for the given `Date` header value.
    pub fn password(&self, date: &str) -> Result<String> {
        Ok(STANDARD.encode(hmac_sha1(self.server.api_key.as_bytes(), date.as_bytes())?))
    }

    pub async fn purge(&self) -> Result<()> {
        if self.server.refresh_urls.is_empty() {
            log::debug!("No CDN refresh URLs configured; skipping purge");
            return Ok(());
        }
        let date = rfc1123_date(Utc::now());
        let body = serde_json::json!({
            "urlAction": "delete",
            "dirs": self.server.refresh_urls,
        });

        log::info!("Purging {} CDN directories", self.server.refresh_urls.len());
        let response = self
            .client
            .post(&self.server.url)
            .basic_auth(&self.server.user_name, Some(self.password(&date)?))
            .header(reqwest::header::DATE, &date)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(UploadError::remote("purge", self.server.url.clone(), format!("{status}: {text}")).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hmac_matches_rfc2202() {
        let mac = hmac_sha1(b"Jefe", b"what do ya want for nothing?").unwrap();
        let hex: String = mac.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79");
    }

    #[test]
    fn date_is_rfc1123() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 15, 30, 0).unwrap();
        assert_eq!(rfc1123_date(at), "Tue, 02 Jan 2024 15:30:00 GMT");
    }
}
