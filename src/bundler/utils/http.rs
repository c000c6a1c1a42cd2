//! HTTP client construction.

use crate::bundler::error::Result;
use std::time::Duration;

/// Builds a reqwest client with a per-request timeout.
///
/// Used by:
/// - [`HttpStore`](crate::bundler::upload::HttpStore)
/// - [`CdnPurger`](crate::bundler::upload::CdnPurger)
/// - [`HttpSource`](crate::bundler::download::HttpSource)
pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    log::debug!("Building HTTP client (timeout {}s)", timeout.as_secs());

    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("kodegen_bundler_assets/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
