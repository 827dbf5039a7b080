use super::DecodeError;
use crate::models::{ProxyRecord, ProxyType};

/// Explode a proxy link into a record
///
/// This function detects the type of proxy link and calls the appropriate parser.
/// Links with a scheme we do not decode yield [`DecodeError::UnsupportedScheme`].
pub fn explode(link: &str) -> Result<ProxyRecord, DecodeError> {
    let link = link.trim();

    match ProxyType::from_link(link) {
        Some(ProxyType::VMess) => super::vmess::explode_vmess(link),
        None => Err(DecodeError::UnsupportedScheme),
    }
}
