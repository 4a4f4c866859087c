use crate::channel::{MessageRef, NotificationChannel, UserId};
use crate::error::Result;
use crate::register::{Registry, MAX_REACTORS};
use log::{info, warn};
use std::collections::HashMap;

/// Why a registrant failed proof validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCause {
    NoReaction,
    WrongReaction,
    TooManyReactions,
}

/// Verdict for a single registrant given the symbols they reacted with.
/// `None` means the registrant is a valid payee.
///
/// The order is load-bearing: a single wrong symbol is a `WrongReaction`,
/// but as soon as the assigned symbol is present the *total* reaction count
/// decides, matching symbol included.
pub fn judge(token: &str, reactions: Option<&[String]>) -> Option<RejectCause> {
    let reactions = match reactions {
        None => return Some(RejectCause::NoReaction),
        Some(reactions) => reactions,
    };
    if !reactions.iter().any(|symbol| symbol == token) {
        return Some(RejectCause::WrongReaction);
    }
    if reactions.len() > 1 {
        return Some(RejectCause::TooManyReactions);
    }
    None
}

fn rejection_notice(cause: RejectCause, token: &str) -> String {
    match cause {
        RejectCause::NoReaction => format!(
            "You never reacted to the announcement, little turtle. Your symbol was {} - better luck next rain!",
            token
        ),
        RejectCause::WrongReaction => format!(
            "You reacted with the wrong symbol, little turtle. Yours was {} - better luck next rain!",
            token
        ),
        RejectCause::TooManyReactions => format!(
            "Greedy turtle! One reaction with {} was all it took. The rain passed you by.",
            token
        ),
    }
}

/// Cross-references the reactions on the announcement against the assigned
/// tokens and drops every registrant who cannot prove their registration.
/// Runs only after the window has closed, so the registry has no live
/// writers. Returns the number of validated payees left in the registry.
pub async fn filter_registrants(
    channel: &dyn NotificationChannel,
    announcement: &MessageRef,
    registry: &Registry,
) -> Result<usize> {
    let mut reactions_by_user: HashMap<UserId, Vec<String>> = HashMap::new();
    for symbol in channel.reaction_symbols(announcement).await? {
        let users = channel.reaction_users(announcement, &symbol, MAX_REACTORS).await?;
        for user in users {
            reactions_by_user.entry(user).or_default().push(symbol.clone());
        }
    }

    let mut rejected = 0;
    for registrant in registry.snapshot() {
        let reactions = reactions_by_user.get(&registrant.user).map(Vec::as_slice);
        let cause = match judge(&registrant.token, reactions) {
            None => continue,
            Some(cause) => cause,
        };

        registry.remove(registrant.user);
        rejected += 1;
        let notice = rejection_notice(cause, &registrant.token);
        if let Err(e) = channel.direct_message(registrant.user, &notice).await {
            warn!("could not notify {} about {:?}: {}", registrant.user, cause, e);
        }
    }

    let validated = registry.len();
    info!("proof validation done: {} valid, {} rejected", validated, rejected);
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::register::Registrant;
    use crate::wallet::WalletAddress;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn judge_matches_the_truth_table() {
        assert_eq!(judge("A", None), Some(RejectCause::NoReaction));
        assert_eq!(
            judge("A", Some(&symbols(&["B"]))),
            Some(RejectCause::WrongReaction)
        );
        assert_eq!(
            judge("A", Some(&symbols(&["A", "B"]))),
            Some(RejectCause::TooManyReactions)
        );
        assert_eq!(judge("A", Some(&symbols(&["A"]))), None);
    }

    #[test]
    fn several_wrong_symbols_stay_a_wrong_reaction() {
        // The matching symbol is absent, so the count rule never applies.
        assert_eq!(
            judge("A", Some(&symbols(&["B", "C", "D"]))),
            Some(RejectCause::WrongReaction)
        );
    }

    struct ReactionBoard {
        reactions: Vec<(String, Vec<UserId>)>,
        dms: Mutex<Vec<(UserId, String)>>,
    }

    #[async_trait]
    impl NotificationChannel for ReactionBoard {
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
            Ok(self.reactions.iter().map(|(s, _)| s.clone()).collect())
        }

        async fn reaction_users(
            &self,
            _message: &MessageRef,
            symbol: &str,
            _limit: usize,
        ) -> Result<Vec<UserId>> {
            Ok(self
                .reactions
                .iter()
                .find(|(s, _)| s == symbol)
                .map(|(_, users)| users.clone())
                .unwrap_or_default())
        }

        async fn direct_message(&self, user: UserId, content: &str) -> Result<()> {
            self.dms.lock().unwrap().push((user, content.to_string()));
            Ok(())
        }
    }

    fn registrant(user: UserId, token: &str) -> Registrant {
        Registrant {
            user,
            wallet: WalletAddress::unchecked(&format!("TRTLwallet{}", user)),
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn keeps_valid_payees_and_notifies_the_rest() {
        let registry = Registry::new();
        registry.try_insert(registrant(1, "🐢")); // reacts 🐢 only -> valid
        registry.try_insert(registrant(2, "🌊")); // no reaction
        registry.try_insert(registrant(3, "☔")); // reacts 🐢 -> wrong
        registry.try_insert(registrant(4, "💧")); // reacts 💧 and 🐢 -> too many

        let board = ReactionBoard {
            reactions: vec![
                ("🐢".to_string(), vec![1, 3, 4]),
                ("💧".to_string(), vec![4]),
            ],
            dms: Mutex::new(Vec::new()),
        };
        let announcement = MessageRef {
            channel_id: 10,
            message_id: 20,
        };

        let validated = filter_registrants(&board, &announcement, &registry).await.unwrap();
        assert_eq!(validated, 1);
        assert!(registry.contains(1));
        assert!(!registry.contains(2));
        assert!(!registry.contains(3));
        assert!(!registry.contains(4));

        let dms = board.dms.lock().unwrap();
        assert_eq!(dms.len(), 3);
        // Rejection notices name the assigned token.
        let to_user_2 = &dms.iter().find(|(u, _)| *u == 2).unwrap().1;
        assert!(to_user_2.contains("🌊"));
    }
}
