use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the rain service. Exactly one cell per service instance,
/// written only by the controller, read by the submission handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RainState {
    Stopped = 0,
    CheckingBalance = 1,
    BalanceExceeded = 2,
    AcceptingRegistrations = 3,
    Raining = 4,
}

impl RainState {
    fn from_u8(v: u8) -> RainState {
        match v {
            1 => RainState::CheckingBalance,
            2 => RainState::BalanceExceeded,
            3 => RainState::AcceptingRegistrations,
            4 => RainState::Raining,
            _ => RainState::Stopped,
        }
    }
}

impl std::fmt::Display for RainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RainState::Stopped => "stopped",
            RainState::CheckingBalance => "checking balance",
            RainState::BalanceExceeded => "balance exceeded",
            RainState::AcceptingRegistrations => "accepting registrations",
            RainState::Raining => "raining",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        StateCell(AtomicU8::new(RainState::Stopped as u8))
    }

    pub fn get(&self) -> RainState {
        RainState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: RainState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), RainState::Stopped);
    }

    #[test]
    fn set_and_get_round_trip() {
        let cell = StateCell::new();
        for state in [
            RainState::CheckingBalance,
            RainState::BalanceExceeded,
            RainState::AcceptingRegistrations,
            RainState::Raining,
            RainState::Stopped,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn unknown_discriminants_fall_back_to_stopped() {
        assert_eq!(RainState::from_u8(250), RainState::Stopped);
    }
}
