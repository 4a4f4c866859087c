use crate::ledger::LedgerClient;
use log::debug;

pub const ADDRESS_PREFIX: &str = "TRTL";
pub const ADDRESS_LENGTH: usize = 99;

/// A validated wallet address. Constructing one is the only validation
/// point: the prefix and length are checked here and the daemon confirms
/// the address is live. Fails closed, a liveness lookup error never
/// produces an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub async fn from_text(ledger: &dyn LedgerClient, raw: &str) -> Option<WalletAddress> {
        let raw = raw.trim();
        if !raw.starts_with(ADDRESS_PREFIX) {
            return None;
        }
        if raw.len() != ADDRESS_LENGTH {
            return None;
        }
        match ledger.check_liveness(raw).await {
            Ok(true) => Some(WalletAddress(raw.to_string())),
            Ok(false) => None,
            Err(e) => {
                debug!("liveness check failed for a submitted address: {}", e);
                None
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn unchecked(raw: &str) -> WalletAddress {
        WalletAddress(raw.to_string())
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
