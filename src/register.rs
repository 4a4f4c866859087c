use crate::channel::{MembershipDirectory, UserId};
use crate::ledger::LedgerClient;
use crate::state::{RainState, StateCell};
use crate::wallet::WalletAddress;
use log::warn;
use rand::seq::SliceRandom;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Symbols a window's proof tokens are sampled from.
pub const TOKEN_CANDIDATES: [&str; 20] = [
    "🐢", "🌧", "☔", "🌊", "🐚", "🌦", "⛈", "💧", "🌪", "🍀",
    "🌈", "⚡", "🐸", "🦀", "🐙", "🌵", "🍄", "🌻", "🪣", "🫧",
];

/// Pool size per registration window.
pub const POOL_SIZE: usize = 10;

/// Reactor fetches are bounded, a symbol with more reactors than this is
/// only partially visible to the validator.
pub const MAX_REACTORS: usize = 500;

#[derive(Debug, Clone)]
pub struct Registrant {
    pub user: UserId,
    pub wallet: WalletAddress,
    pub token: String,
}

/// Why a submission was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Registration window is not open; `too_early` when the teaser is out
    /// but the window has not started yet.
    NotOpen { too_early: bool },
    Excluded,
    AlreadyRegistered,
    MalformedAddress,
}

/// Shared per-window state: the registrant map and the active token pool.
/// Submission handlers insert concurrently; the controller only reads and
/// clears after the window has closed.
pub struct Registry {
    wallets: Mutex<HashMap<UserId, Registrant>>,
    pool: RwLock<Vec<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            wallets: Mutex::new(HashMap::new()),
            pool: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the pool wholesale with a fresh sample of the candidates.
    /// Readers never observe a partially built pool.
    pub fn rebuild_pool(&self) {
        let mut rng = rand::thread_rng();
        let fresh: Vec<String> = TOKEN_CANDIDATES
            .choose_multiple(&mut rng, POOL_SIZE)
            .map(|s| s.to_string())
            .collect();
        *self.pool.write().unwrap() = fresh;
    }

    pub fn pool(&self) -> Vec<String> {
        self.pool.read().unwrap().clone()
    }

    /// Draws one token at random, with replacement: two registrants may end
    /// up with the same symbol within a window.
    pub fn draw_token(&self) -> String {
        let pool = self.pool.read().unwrap();
        let mut rng = rand::thread_rng();
        pool.choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| TOKEN_CANDIDATES[0].to_string())
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.wallets.lock().unwrap().contains_key(&user)
    }

    /// Atomic check-and-insert. Returns false when the user already holds a
    /// slot; the existing registration is left untouched.
    pub fn try_insert(&self, registrant: Registrant) -> bool {
        let mut wallets = self.wallets.lock().unwrap();
        match wallets.entry(registrant.user) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(registrant);
                true
            }
        }
    }

    pub fn remove(&self, user: UserId) -> Option<Registrant> {
        self.wallets.lock().unwrap().remove(&user)
    }

    pub fn len(&self) -> usize {
        self.wallets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Registrant> {
        self.wallets.lock().unwrap().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.wallets.lock().unwrap().clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts one address submission per participant during the window.
pub struct Collector {
    state: Arc<StateCell>,
    registry: Arc<Registry>,
    ledger: Arc<dyn LedgerClient>,
    directory: Arc<dyn MembershipDirectory>,
}

impl Collector {
    pub fn new(
        state: Arc<StateCell>,
        registry: Arc<Registry>,
        ledger: Arc<dyn LedgerClient>,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Self {
        Collector {
            state,
            registry,
            ledger,
            directory,
        }
    }

    /// Handles one raw address submission. On success the registrant is in
    /// the registry and the returned token is the symbol they must react
    /// with.
    pub async fn submit(&self, user: UserId, text: &str) -> Result<String, Rejection> {
        match self.state.get() {
            RainState::AcceptingRegistrations => {}
            RainState::BalanceExceeded => return Err(Rejection::NotOpen { too_early: true }),
            _ => return Err(Rejection::NotOpen { too_early: false }),
        }

        match self.directory.is_excluded(user).await {
            Ok(false) => {}
            Ok(true) => return Err(Rejection::Excluded),
            Err(e) => {
                // Membership lookup failures count as excluded.
                warn!("membership lookup failed for {}: {}", user, e);
                return Err(Rejection::Excluded);
            }
        }

        if self.registry.contains(user) {
            return Err(Rejection::AlreadyRegistered);
        }

        let wallet = match WalletAddress::from_text(&*self.ledger, text).await {
            Some(wallet) => wallet,
            None => return Err(Rejection::MalformedAddress),
        };

        let token = self.registry.draw_token();
        let registrant = Registrant {
            user,
            wallet,
            token: token.clone(),
        };
        if !self.registry.try_insert(registrant) {
            // Lost the race against a concurrent submission from the same user.
            return Err(Rejection::AlreadyRegistered);
        }
        Ok(token)
    }
}
