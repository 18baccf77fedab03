//! Shared User-Agent strings for transfer and resolver HTTP clients.

const PRODUCT: &str = "linkrelay";

/// Default User-Agent for file transfers.
#[must_use]
pub(crate) fn default_transfer_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (file-transfer)")
}

/// Default User-Agent for metadata requests.
#[must_use]
pub(crate) fn default_resolver_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (metadata-client)")
}
