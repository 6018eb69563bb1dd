//! Policy Gate — pure pre-dispatch predicate (spec.md §4.5).
//!
//! Kept free of IO, same philosophy as the teacher's `Machine` trait
//! ("machines are pure... state is internal"): the caller (`dispatch-scheduler`)
//! gathers the inputs from the external session/admin/queue collaborators
//! and this module only decides.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Healthy,
    Expiring,
    Expired,
    ChallengeRequired,
    Error,
}

impl SessionStatus {
    fn is_dispatchable(self) -> bool {
        matches!(self, SessionStatus::Healthy | SessionStatus::Expiring)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminStatus {
    Approved,
    NeedsReview,
    Suspended,
    Banned,
}

/// Everything the Policy Gate needs to decide, gathered by the caller.
#[derive(Debug, Clone)]
pub struct PolicyInput {
    pub session_status: SessionStatus,
    pub admin_status: AdminStatus,
    pub user_enabled: bool,
    pub executed_posts_today: u32,
    pub max_posts_per_day: u32,
    pub duplicate_create_post_exists: bool,
}

/// The closed set of block codes (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyBlock {
    UserDisabled,
    AdminNotApproved,
    AdminSuspended,
    AdminBanned,
    SessionExpired,
    SessionChallenge,
    SessionError,
    DailyLimit,
    Duplicate,
}

impl PolicyBlock {
    pub fn code(self) -> &'static str {
        match self {
            PolicyBlock::UserDisabled => "USER_DISABLED",
            PolicyBlock::AdminNotApproved => "ADMIN_NOT_APPROVED",
            PolicyBlock::AdminSuspended => "ADMIN_SUSPENDED",
            PolicyBlock::AdminBanned => "ADMIN_BANNED",
            PolicyBlock::SessionExpired => "SESSION_EXPIRED",
            PolicyBlock::SessionChallenge => "SESSION_CHALLENGE",
            PolicyBlock::SessionError => "SESSION_ERROR",
            PolicyBlock::DailyLimit => "DAILY_LIMIT",
            PolicyBlock::Duplicate => "DUPLICATE",
        }
    }
}

/// A Schedule is dispatchable iff all of spec.md §4.5's conditions hold;
/// checks run in the order listed there so the first failing condition is
/// the one surfaced.
pub fn evaluate_policy(input: &PolicyInput) -> Result<(), PolicyBlock> {
    if !input.user_enabled {
        return Err(PolicyBlock::UserDisabled);
    }
    match input.admin_status {
        AdminStatus::NeedsReview => return Err(PolicyBlock::AdminNotApproved),
        AdminStatus::Suspended => return Err(PolicyBlock::AdminSuspended),
        AdminStatus::Banned => return Err(PolicyBlock::AdminBanned),
        AdminStatus::Approved => {}
    }
    if !input.session_status.is_dispatchable() {
        return Err(match input.session_status {
            SessionStatus::Expired => PolicyBlock::SessionExpired,
            SessionStatus::ChallengeRequired => PolicyBlock::SessionChallenge,
            SessionStatus::Error => PolicyBlock::SessionError,
            _ => unreachable!("dispatchable statuses handled above"),
        });
    }
    if input.executed_posts_today >= input.max_posts_per_day {
        return Err(PolicyBlock::DailyLimit);
    }
    if input.duplicate_create_post_exists {
        return Err(PolicyBlock::Duplicate);
    }
    Ok(())
}

/// Default auto-suspend threshold (spec.md §4.5).
pub const DEFAULT_AUTO_SUSPEND_THRESHOLD: u32 = 5;

/// Whether consecutive failures have crossed the auto-suspend threshold.
pub fn should_auto_suspend(consecutive_failures: u32, threshold: u32) -> bool {
    consecutive_failures >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> PolicyInput {
        PolicyInput {
            session_status: SessionStatus::Healthy,
            admin_status: AdminStatus::Approved,
            user_enabled: true,
            executed_posts_today: 0,
            max_posts_per_day: 10,
            duplicate_create_post_exists: false,
        }
    }

    #[test]
    fn healthy_input_dispatches() {
        assert_eq!(evaluate_policy(&base_input()), Ok(()));
    }

    #[test]
    fn expiring_session_still_dispatches() {
        let mut input = base_input();
        input.session_status = SessionStatus::Expiring;
        assert_eq!(evaluate_policy(&input), Ok(()));
    }

    #[test]
    fn each_block_code_fires() {
        let mut input = base_input();
        input.user_enabled = false;
        assert_eq!(evaluate_policy(&input), Err(PolicyBlock::UserDisabled));

        let mut input = base_input();
        input.admin_status = AdminStatus::Suspended;
        assert_eq!(evaluate_policy(&input), Err(PolicyBlock::AdminSuspended));

        let mut input = base_input();
        input.session_status = SessionStatus::Expired;
        assert_eq!(evaluate_policy(&input), Err(PolicyBlock::SessionExpired));

        let mut input = base_input();
        input.executed_posts_today = 10;
        assert_eq!(evaluate_policy(&input), Err(PolicyBlock::DailyLimit));

        let mut input = base_input();
        input.duplicate_create_post_exists = true;
        assert_eq!(evaluate_policy(&input), Err(PolicyBlock::Duplicate));
    }

    #[test]
    fn auto_suspend_threshold() {
        assert!(!should_auto_suspend(4, DEFAULT_AUTO_SUSPEND_THRESHOLD));
        assert!(should_auto_suspend(5, DEFAULT_AUTO_SUSPEND_THRESHOLD));
    }
}
