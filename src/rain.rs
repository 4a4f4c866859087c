use crate::channel::{MembershipDirectory, NotificationChannel, UserId};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::ledger::LedgerClient;
use crate::payout::{self, format_amount, Distribution, FeePolicy};
use crate::register::{Collector, Registry, Rejection};
use crate::state::{RainState, StateCell};
use crate::validate;
use crate::wallet::WalletAddress;
use log::{error, info, warn};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Orchestrates the giveaway: polls the pool balance, runs the announce /
/// register / validate / payout sequence and returns to polling. Exactly
/// one event is in flight at a time; the loop lives in a single background
/// task owned by this service.
pub struct RainService {
    worker: Arc<EventLoop>,
    ledger: Arc<dyn LedgerClient>,
    collector: Collector,
    pool_wallet: RwLock<Option<WalletAddress>>,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

/// Everything the background task needs, shared with the service handle.
struct EventLoop {
    channel: Arc<dyn NotificationChannel>,
    ledger: Arc<dyn LedgerClient>,
    settings: Arc<Settings>,
    state: Arc<StateCell>,
    registry: Arc<Registry>,
    channel_id: u64,
}

impl RainService {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        ledger: Arc<dyn LedgerClient>,
        directory: Arc<dyn MembershipDirectory>,
        settings: Arc<Settings>,
        channel_id: u64,
    ) -> Self {
        let state = Arc::new(StateCell::new());
        let registry = Arc::new(Registry::new());
        let collector = Collector::new(state.clone(), registry.clone(), ledger.clone(), directory);
        let worker = Arc::new(EventLoop {
            channel,
            ledger: ledger.clone(),
            settings,
            state,
            registry,
            channel_id,
        });
        RainService {
            worker,
            ledger,
            collector,
            pool_wallet: RwLock::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RainState {
        self.worker.state.get()
    }

    pub fn pool_wallet(&self) -> Option<WalletAddress> {
        self.pool_wallet.read().unwrap().clone()
    }

    /// Starts the balance check loop. No-op unless the service is stopped.
    /// A setup failure is logged and leaves the service stopped; nothing
    /// propagates to the caller.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if self.worker.state.get() != RainState::Stopped {
            return;
        }

        let wallet = match self.resolve_pool_wallet().await {
            Ok(wallet) => wallet,
            Err(e) => {
                error!("rain service failed to start: {}", e);
                self.worker.state.set(RainState::Stopped);
                return;
            }
        };
        info!("rain service started, pool wallet {}", wallet);
        *self.pool_wallet.write().unwrap() = Some(wallet.clone());

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.worker.state.set(RainState::CheckingBalance);
        let worker = self.worker.clone();
        let handle = tokio::spawn(async move { worker.run(wallet, cancel_rx).await });
        *task = Some((cancel_tx, handle));
    }

    /// Signals the loop and waits for it to wind down. No-op unless the
    /// loop is in its balance checking phase.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if self.worker.state.get() != RainState::CheckingBalance {
            return;
        }
        if let Some((cancel, handle)) = task.take() {
            let _ = cancel.send(true);
            if let Err(e) = handle.await {
                error!("check loop task failed: {}", e);
            }
        }
    }

    /// Entry point for the chat routing layer: one free-form direct
    /// message, interpreted as a wallet address submission. Every outcome
    /// is answered with a direct message.
    pub async fn handle_direct_message(&self, user: UserId, text: &str) {
        let reply = match self.submit(user, text).await {
            Ok(token) => format!(
                "Your wallet is ready to catch shells in the upcoming rain! \
                 React to the announcement with {} - one reaction, no more.",
                token
            ),
            Err(Rejection::NotOpen { too_early: true }) => {
                "Patience, little turtle, it is not raining yet.".to_string()
            }
            Err(Rejection::NotOpen { too_early: false }) => {
                "Huh, it doesn't look like it is raining soon...".to_string()
            }
            Err(Rejection::Excluded) => {
                "Sorry, little turtle, this rain is not for you.".to_string()
            }
            Err(Rejection::AlreadyRegistered) => {
                "You are already registered, little turtle.".to_string()
            }
            Err(Rejection::MalformedAddress) => {
                "Your wallet address is malformed, little turtle.".to_string()
            }
        };
        if let Err(e) = self.worker.channel.direct_message(user, &reply).await {
            warn!("registration reply to {} failed: {}", user, e);
        }
    }

    /// The raw submission contract, for routing layers that format their
    /// own replies. Returns the proof token on success.
    pub async fn submit(&self, user: UserId, text: &str) -> std::result::Result<String, Rejection> {
        self.collector.submit(user, text).await
    }

    async fn resolve_pool_wallet(&self) -> Result<WalletAddress> {
        let primary = self.ledger.primary_address().await?;
        WalletAddress::from_text(&*self.ledger, &primary)
            .await
            .ok_or_else(|| Error::Setup("pool address failed validation".to_string()))
    }
}

impl EventLoop {
    /// Cancellable wait. Returns false when the run was cancelled, which is
    /// the only place the cancel signal is observed.
    async fn pause(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = cancel.changed() => false,
        }
    }

    async fn run(self: Arc<Self>, wallet: WalletAddress, mut cancel: watch::Receiver<bool>) {
        info!("balance check loop running");
        loop {
            if *cancel.borrow() {
                break;
            }

            // Live configuration is only read at loop boundaries; a change
            // never alters an event already in progress.
            let threshold = self.settings.balance_threshold.get();
            let interval = Duration::from_secs(self.settings.check_interval_s.get());

            let balance = match self.ledger.balance(&wallet).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!("balance query failed, retrying next tick: {}", e);
                    0
                }
            };

            if balance >= threshold {
                info!("balance {} exceeds threshold {}", balance, threshold);
                match self.run_event(&wallet, balance, &mut cancel).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        error!("distribution iteration aborted: {}", e);
                        self.registry.clear();
                        self.state.set(RainState::CheckingBalance);
                    }
                }
            }

            if !Self::pause(interval, &mut cancel).await {
                break;
            }
        }

        self.registry.clear();
        self.state.set(RainState::Stopped);
        info!("balance check loop stopped");
    }

    /// One full giveaway: teaser, then registration windows until at least
    /// one validated payee got paid, then the result announcement.
    /// `Ok(false)` means the run was cancelled mid-event.
    async fn run_event(
        &self,
        wallet: &WalletAddress,
        balance: u64,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        self.state.set(RainState::BalanceExceeded);
        let announce_delay = Duration::from_secs(self.settings.announce_delay_s.get());
        self.channel.post(self.channel_id, TEASER).await?;
        if !Self::pause(announce_delay, cancel).await {
            return Ok(false);
        }

        let distribution = loop {
            self.registry.rebuild_pool();
            let register_delay = self.settings.register_delay_s.get();
            let fees = FeePolicy {
                network_fee: self.settings.network_fee.get(),
                service_fee: self.settings.service_fee.get(),
            };

            self.state.set(RainState::AcceptingRegistrations);
            let content = registration_text(register_delay, &self.registry.pool());
            let announcement = self.channel.post(self.channel_id, &content).await?;
            for symbol in self.registry.pool() {
                if let Err(e) = self.channel.add_reaction(&announcement, &symbol).await {
                    warn!("could not seed reaction {}: {}", symbol, e);
                }
            }

            if !Self::pause(Duration::from_secs(register_delay), cancel).await {
                return Ok(false);
            }

            self.state.set(RainState::Raining);
            if let Err(e) = self.channel.edit(&announcement, CLOSED).await {
                warn!("could not close the registration announcement: {}", e);
            }

            validate::filter_registrants(&*self.channel, &announcement, &self.registry).await?;
            let payees = self.registry.snapshot();
            match payout::distribute(&*self.ledger, &*self.channel, balance, fees, &payees).await? {
                Some(distribution) => break distribution,
                None => {
                    info!("nobody made it through the window, opening a new one");
                    self.registry.clear();
                }
            }
        };

        self.registry.clear();
        self.channel
            .post(self.channel_id, &result_text(&distribution, wallet))
            .await?;
        self.state.set(RainState::CheckingBalance);
        Ok(true)
    }
}

const TEASER: &str = "TUT TUT, IT LOOKS LIKE RAIN...";

const CLOSED: &str = "THE RAIN HAS PASSED - registration is closed.";

fn registration_text(window_s: u64, pool: &[String]) -> String {
    format!(
        "IT BEGINS TO RAIN!\n\
         You have {} seconds to send me your wallet address in a direct message. \
         I will answer with one of {} - react to this message with your symbol, \
         once, to catch the rain!",
        window_s,
        pool.join(" ")
    )
}

fn result_text(distribution: &Distribution, wallet: &WalletAddress) -> String {
    format!(
        "{} TRTL WAS GIVEN TO {} TURTLES\n\
         Donate TRTL to make it rain again! {}",
        format_amount(distribution.balance),
        distribution.payees,
        wallet
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_text_names_the_window_and_the_pool() {
        let pool = vec!["🐢".to_string(), "🌊".to_string()];
        let text = registration_text(600, &pool);
        assert!(text.contains("600 seconds"));
        assert!(text.contains("🐢 🌊"));
    }

    #[test]
    fn result_text_reports_the_full_snapshot_amount() {
        let distribution = Distribution {
            balance: 1500,
            per_wallet: 496,
            actual_fee: 12,
            payees: 3,
            tx_hash: "ab12".to_string(),
        };
        let wallet = WalletAddress::unchecked("TRTLdonate");
        let text = result_text(&distribution, &wallet);
        assert!(text.contains("15.00 TRTL"));
        assert!(text.contains("3 TURTLES"));
        assert!(text.contains("TRTLdonate"));
    }
}
