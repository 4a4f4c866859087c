use crate::channel::NotificationChannel;
use crate::error::Result;
use crate::ledger::LedgerClient;
use crate::register::Registrant;
use crate::wallet::WalletAddress;
use log::{info, warn};

/// Fees the distribution must cover, read at the window boundary.
#[derive(Debug, Clone, Copy)]
pub struct FeePolicy {
    pub network_fee: u64,
    pub service_fee: u64,
}

impl FeePolicy {
    pub fn total(&self) -> u64 {
        self.network_fee + self.service_fee
    }
}

/// The equal-split arithmetic. The remainder from flooring is absorbed into
/// the fee actually charged, so `actual_fee >= fee` whenever the balance
/// covers the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub per_wallet: u64,
    pub actual_fee: u64,
}

pub fn split(balance: u64, fee: u64, count: u64) -> Option<Split> {
    if count == 0 {
        return None;
    }
    let available = balance.saturating_sub(fee);
    let per_wallet = available / count;
    let actual_fee = balance - per_wallet * count;
    Some(Split {
        per_wallet,
        actual_fee,
    })
}

/// One completed distribution, for the result announcement and the log.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub balance: u64,
    pub per_wallet: u64,
    pub actual_fee: u64,
    pub payees: usize,
    pub tx_hash: String,
}

/// Amounts are expressed in hundredths of a shell.
pub fn format_amount(amount: u64) -> String {
    format!("{}.{:02}", amount / 100, amount % 100)
}

/// Sends the batched transfer and tells every payee what they got.
/// Returns `Ok(None)` without touching the ledger when nobody is left to
/// pay, which signals the controller to reopen registration.
pub async fn distribute(
    ledger: &dyn LedgerClient,
    channel: &dyn NotificationChannel,
    balance: u64,
    fees: FeePolicy,
    payees: &[Registrant],
) -> Result<Option<Distribution>> {
    let count = payees.len() as u64;
    let Split {
        per_wallet,
        actual_fee,
    } = match split(balance, fees.total(), count) {
        None => return Ok(None),
        Some(split) => split,
    };

    let addresses: Vec<WalletAddress> = payees.iter().map(|p| p.wallet.clone()).collect();
    let tx_hash = ledger.transfer(per_wallet, actual_fee, &addresses).await?;
    info!(
        "rained {} on {} wallets, {} each, fee {}, tx {}",
        format_amount(balance),
        count,
        format_amount(per_wallet),
        format_amount(actual_fee),
        tx_hash
    );

    let notice = format!(
        "{} TRTL rained on your wallet! Transaction: {}",
        format_amount(per_wallet),
        tx_hash
    );
    for payee in payees {
        if let Err(e) = channel.direct_message(payee.user, &notice).await {
            warn!("payout notice to {} failed: {}", payee.user, e);
        }
    }

    Ok(Some(Distribution {
        balance,
        per_wallet,
        actual_fee,
        payees: payees.len(),
        tx_hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MessageRef, UserId};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn splits_like_the_worked_example() {
        let split = split(1500, 12, 3).unwrap();
        assert_eq!(split.per_wallet, 496);
        assert_eq!(split.actual_fee, 12);
    }

    #[test]
    fn flooring_remainder_is_absorbed_into_the_fee() {
        let split = split(1501, 12, 3).unwrap();
        assert_eq!(split.per_wallet, 496);
        assert_eq!(split.actual_fee, 13);
    }

    #[test]
    fn actual_fee_never_undercuts_the_stated_fee() {
        for balance in (1000u64..1100).chain([25_000, 1_000_000]) {
            for fee in [0u64, 1, 12, 99] {
                for count in 1u64..=7 {
                    let split = split(balance, fee, count).unwrap();
                    assert!(
                        split.actual_fee >= fee,
                        "balance={} fee={} count={}",
                        balance,
                        fee,
                        count
                    );
                    assert_eq!(
                        split.per_wallet * count + split.actual_fee,
                        balance,
                        "the split must account for the full balance"
                    );
                }
            }
        }
    }

    #[test]
    fn zero_payees_yield_no_split() {
        assert_eq!(split(1500, 12, 0), None);
    }

    #[test]
    fn amounts_render_in_hundredths() {
        assert_eq!(format_amount(1500), "15.00");
        assert_eq!(format_amount(496), "4.96");
        assert_eq!(format_amount(7), "0.07");
    }

    struct PanickyLedger;

    #[async_trait]
    impl LedgerClient for PanickyLedger {
        async fn check_liveness(&self, _address: &str) -> Result<bool> {
            unreachable!()
        }

        async fn primary_address(&self) -> Result<String> {
            unreachable!()
        }

        async fn balance(&self, _address: &WalletAddress) -> Result<u64> {
            unreachable!()
        }

        async fn transfer(
            &self,
            _per_wallet: u64,
            _fee: u64,
            _addresses: &[WalletAddress],
        ) -> Result<String> {
            panic!("the ledger must not be called with zero payees");
        }
    }

    struct SilentChannel {
        dms: Mutex<Vec<(UserId, String)>>,
    }

    #[async_trait]
    impl NotificationChannel for SilentChannel {
        async fn post(&self, _channel_id: u64, _content: &str) -> Result<MessageRef> {
            unreachable!()
        }

        async fn edit(&self, _message: &MessageRef, _content: &str) -> Result<()> {
            unreachable!()
        }

        async fn add_reaction(&self, _message: &MessageRef, _symbol: &str) -> Result<()> {
            unreachable!()
        }

        async fn reaction_symbols(&self, _message: &MessageRef) -> Result<Vec<String>> {
            unreachable!()
        }

        async fn reaction_users(
            &self,
            _message: &MessageRef,
            _symbol: &str,
            _limit: usize,
        ) -> Result<Vec<UserId>> {
            unreachable!()
        }

        async fn direct_message(&self, user: UserId, content: &str) -> Result<()> {
            self.dms.lock().unwrap().push((user, content.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_distribution_never_reaches_the_ledger() {
        let channel = SilentChannel {
            dms: Mutex::new(Vec::new()),
        };
        let outcome = distribute(&PanickyLedger, &channel, 1500, FeePolicy { network_fee: 10, service_fee: 2 }, &[])
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(channel.dms.lock().unwrap().is_empty());
    }
}
