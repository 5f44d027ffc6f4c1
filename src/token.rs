use uuid::Uuid;

use crate::model::GraduationStatus;

/// What a status change means for the student's access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    Generate,
    Clear,
    Keep,
}

/// Transition table for the token lifecycle. Only runs when an update payload
/// explicitly carries a status value; partial updates without one never touch
/// the token.
///
/// Invariant: after the action is applied, a token exists iff the new status
/// is `Passed`.
pub fn transition(
    old: GraduationStatus,
    new: GraduationStatus,
    has_token: bool,
) -> TokenAction {
    use GraduationStatus::Passed;
    match (old == Passed, new == Passed) {
        (false, true) => TokenAction::Generate,
        // Self-heal records that passed earlier but lost their token.
        (true, true) if !has_token => TokenAction::Generate,
        (true, true) => TokenAction::Keep,
        (true, false) => TokenAction::Clear,
        (false, false) => TokenAction::Keep,
    }
}

/// Mint a fresh opaque token. v4 UUIDs come from the OS CSPRNG; the partial
/// unique index on the students table is the collision backstop.
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GraduationStatus::*;

    #[test]
    fn entering_passed_generates() {
        for old in [Pending, InProgress, Failed] {
            assert_eq!(transition(old, Passed, false), TokenAction::Generate);
            // A stale token on a non-passed record is replaced, not kept.
            assert_eq!(transition(old, Passed, true), TokenAction::Generate);
        }
    }

    #[test]
    fn leaving_passed_clears() {
        for new in [Pending, InProgress, Failed] {
            assert_eq!(transition(Passed, new, true), TokenAction::Clear);
            assert_eq!(transition(Passed, new, false), TokenAction::Clear);
        }
    }

    #[test]
    fn passed_to_passed_keeps_existing_token() {
        assert_eq!(transition(Passed, Passed, true), TokenAction::Keep);
    }

    #[test]
    fn passed_to_passed_heals_missing_token() {
        assert_eq!(transition(Passed, Passed, false), TokenAction::Generate);
    }

    #[test]
    fn transitions_between_non_passed_states_are_noops() {
        for old in [Pending, InProgress, Failed] {
            for new in [Pending, InProgress, Failed] {
                assert_eq!(transition(old, new, false), TokenAction::Keep);
            }
        }
    }

    #[test]
    fn tokens_are_unique_and_opaque() {
        let a = new_token();
        let b = new_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
