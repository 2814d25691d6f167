use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{AppError, Result};
use crate::models::{Session, Turn};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// In-memory handle on one session while it is being displayed and extended.
///
/// A follow-up goes through three states: `begin_follow_up` records a
/// provisional user turn and hands back a [`PendingFollowUp`]; that token is
/// then consumed by either `commit` or `roll_back`. Only one follow-up can be
/// pending at a time.
#[derive(Debug, Clone)]
pub struct Conversation {
    session: Session,
    pending: Option<Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    token: u64,
    index: usize,
}

/// A follow-up question whose answer has not arrived yet.
#[must_use = "a pending follow-up must be committed or rolled back"]
#[derive(Debug)]
pub struct PendingFollowUp {
    session_id: String,
    token: u64,
    index: usize,
    question: String,
    timestamp: i64,
    history: Vec<Turn>,
}

impl PendingFollowUp {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Process-unique; two follow-ups never share a token, even on a
    /// reopened copy of the same session.
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Turns before the provisional one; this is what goes upstream.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

impl Conversation {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            pending: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether `pending` was begun on this conversation and is still open.
    pub fn owns(&self, pending: &PendingFollowUp) -> bool {
        self.pending.is_some_and(|slot| slot.token == pending.token)
    }

    pub(crate) fn set_last_updated_at(&mut self, stamp: i64) {
        self.session.last_updated_at = stamp;
    }

    /// Appends a provisional user turn. Fails with `Busy` while another
    /// follow-up is pending.
    pub fn begin_follow_up(
        &mut self,
        question: impl Into<String>,
        timestamp: i64,
    ) -> Result<PendingFollowUp> {
        if self.pending.is_some() {
            return Err(AppError::Busy);
        }

        let question = question.into();
        let history = self.session.turns.clone();
        let index = self.session.turns.len();
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.session.turns.push(Turn::user(question.clone(), timestamp));
        self.pending = Some(Slot { token, index });

        Ok(PendingFollowUp {
            session_id: self.session.id.clone(),
            token,
            index,
            question,
            timestamp,
            history,
        })
    }

    /// Finalizes the provisional turn (keeping its original timestamp) and
    /// appends the model's answer.
    pub fn commit(
        &mut self,
        pending: PendingFollowUp,
        answer: String,
        answered_at: i64,
    ) -> Result<()> {
        self.check_token(&pending)?;

        self.session.turns.truncate(pending.index);
        self.session
            .turns
            .push(Turn::user(pending.question, pending.timestamp));
        self.session.turns.push(Turn::model(answer, answered_at));
        self.pending = None;
        Ok(())
    }

    /// Drops the provisional turn, restoring the turns from before
    /// `begin_follow_up`.
    pub fn roll_back(&mut self, pending: PendingFollowUp) -> Result<()> {
        self.check_token(&pending)?;

        self.session.turns.truncate(pending.index);
        self.pending = None;
        Ok(())
    }

    /// Rolls back the follow-up holding `token` if it is still pending here.
    /// Used when the pending token itself is gone, e.g. a dropped request.
    pub fn abandon(&mut self, token: u64) -> bool {
        match self.pending {
            Some(slot) if slot.token == token => {
                self.session.turns.truncate(slot.index);
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    fn check_token(&self, pending: &PendingFollowUp) -> Result<()> {
        if !self.owns(pending) {
            return Err(AppError::SessionClosed(pending.session_id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn conversation() -> Conversation {
        Conversation::new(Session {
            id: "s1".into(),
            original_url: "https://x".into(),
            original_title: Some("X".into()),
            created_at: 1,
            last_updated_at: 2,
            turns: vec![Turn::user("prompt", 1), Turn::model("# Explanation", 1)],
        })
    }

    #[test]
    fn begin_shows_provisional_turn() {
        let mut conv = conversation();
        let pending = conv.begin_follow_up("why?", 10).unwrap();

        assert!(conv.is_pending());
        assert_eq!(conv.session().turns.len(), 3);
        assert_eq!(conv.session().turns[2].text(), "why?");
        assert_eq!(pending.history().len(), 2);
        assert_eq!(pending.question(), "why?");
        assert_eq!(pending.session_id(), "s1");
        conv.roll_back(pending).unwrap();
    }

    #[test]
    fn commit_adds_exactly_two_turns() {
        let mut conv = conversation();
        let before = conv.session().turns.len();

        let pending = conv.begin_follow_up("why?", 10).unwrap();
        conv.commit(pending, "because".into(), 20).unwrap();

        let turns = &conv.session().turns;
        assert_eq!(turns.len(), before + 2);
        assert_eq!(turns[before].role, Role::User);
        assert_eq!(turns[before].timestamp, Some(10));
        assert_eq!(turns[before + 1].role, Role::Model);
        assert_eq!(turns[before + 1].text(), "because");
        assert!(!conv.is_pending());
    }

    #[test]
    fn roll_back_restores_previous_turns() {
        let mut conv = conversation();
        let before = conv.session().clone();

        let pending = conv.begin_follow_up("why?", 10).unwrap();
        conv.roll_back(pending).unwrap();

        assert_eq!(conv.session(), &before);
        assert!(!conv.is_pending());
    }

    #[test]
    fn second_begin_is_busy() {
        let mut conv = conversation();
        let pending = conv.begin_follow_up("one", 10).unwrap();

        assert!(matches!(
            conv.begin_follow_up("two", 11),
            Err(AppError::Busy)
        ));
        assert_eq!(conv.session().turns.len(), 3);

        conv.commit(pending, "answer".into(), 12).unwrap();
        let again = conv.begin_follow_up("two", 13).unwrap();
        conv.roll_back(again).unwrap();
        assert_eq!(conv.session().turns.len(), 4);
    }

    #[test]
    fn token_from_another_conversation_is_rejected() {
        let mut a = conversation();
        let mut b = conversation();
        b.session.id = "s2".into();

        let pending_b = b.begin_follow_up("q", 1).unwrap();
        let pending_a = a.begin_follow_up("q", 1).unwrap();
        assert!(matches!(
            a.commit(pending_b, "x".into(), 2),
            Err(AppError::SessionClosed(_))
        ));
        assert!(a.is_pending());
        a.roll_back(pending_a).unwrap();
    }

    #[test]
    fn reopened_copy_rejects_earlier_token() {
        let mut first = conversation();
        let stale = first.begin_follow_up("q", 1).unwrap();

        // same session id and same turn index, different follow-up
        let mut reopened = conversation();
        let fresh = reopened.begin_follow_up("q", 2).unwrap();
        assert_ne!(stale.token(), fresh.token());
        assert!(!reopened.owns(&stale));

        assert!(matches!(
            reopened.commit(stale, "late".into(), 3),
            Err(AppError::SessionClosed(id)) if id == "s1"
        ));
        assert_eq!(reopened.session().turns.len(), 3);
        reopened.commit(fresh, "answer".into(), 4).unwrap();
        assert_eq!(reopened.session().turns[3].text(), "answer");
    }

    #[test]
    fn abandon_only_matches_its_own_token() {
        let mut conv = conversation();
        let before = conv.session().clone();
        let pending = conv.begin_follow_up("why?", 10).unwrap();

        assert!(!conv.abandon(pending.token() + 1_000_000));
        assert!(conv.is_pending());

        assert!(conv.abandon(pending.token()));
        assert_eq!(conv.session(), &before);
        assert!(!conv.is_pending());
        assert!(matches!(conv.roll_back(pending), Err(AppError::SessionClosed(_))));
    }
}
