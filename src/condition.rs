//! Opening-condition evaluation
//!
//! Pure dispatch over the capsule's condition type. Only TIME conditions
//! have a concrete strategy; MULTISIG, ORACLE and COMPOUND are unimplemented
//! extension points that report [`ConditionCheck::Unsupported`] and can
//! therefore never satisfy. No side effects: the result is a function of the
//! capsule and the supplied instant only.

use chrono::{DateTime, Utc};

use crate::model::{Capsule, ConditionType};

/// Outcome of evaluating a capsule's opening condition at an instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCheck {
    /// The condition holds; opening is permitted
    Satisfied,
    /// A TIME condition whose open date has not been reached yet
    NotYetDue,
    /// The condition type has no evaluation strategy
    Unsupported,
}

/// Evaluate a capsule's opening condition at `now`
pub fn evaluate(capsule: &Capsule, now: DateTime<Utc>) -> ConditionCheck {
    match capsule.condition_type {
        ConditionType::Time => match capsule.open_date {
            Some(open_date) if open_date <= now => ConditionCheck::Satisfied,
            // A TIME capsule without an open date can never mature
            _ => ConditionCheck::NotYetDue,
        },
        ConditionType::Multisig | ConditionType::Oracle | ConditionType::Compound => {
            ConditionCheck::Unsupported
        }
    }
}

/// True iff the capsule's condition is satisfied at `now`
pub fn is_satisfied(capsule: &Capsule, now: DateTime<Utc>) -> bool {
    evaluate(capsule, now) == ConditionCheck::Satisfied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CapsuleStatus;
    use chrono::Duration;

    fn time_capsule(open_date: Option<DateTime<Utc>>) -> Capsule {
        capsule_with(ConditionType::Time, open_date)
    }

    fn capsule_with(condition_type: ConditionType, open_date: Option<DateTime<Utc>>) -> Capsule {
        Capsule {
            id: 1,
            title: "test".into(),
            description: None,
            ledger_id: Some("mock_1".into()),
            creator_address: "0xcreator".into(),
            recipient_address: Some("0xrecipient".into()),
            content_hash: None,
            status: CapsuleStatus::Sealed,
            created_at: Utc::now(),
            open_date,
            opened_at: None,
            condition_type,
            condition_data: None,
            view_count: 0,
            share_count: 0,
            subscription_count: 0,
            featured: false,
            assets: vec![],
        }
    }

    #[test]
    fn test_time_condition_before_open_date() {
        let now = Utc::now();
        let capsule = time_capsule(Some(now + Duration::hours(1)));
        assert_eq!(evaluate(&capsule, now), ConditionCheck::NotYetDue);
        assert!(!is_satisfied(&capsule, now));
    }

    #[test]
    fn test_time_condition_at_exact_open_date() {
        let now = Utc::now();
        let capsule = time_capsule(Some(now));
        assert_eq!(evaluate(&capsule, now), ConditionCheck::Satisfied);
    }

    #[test]
    fn test_time_condition_after_open_date() {
        let now = Utc::now();
        let capsule = time_capsule(Some(now - Duration::seconds(1)));
        assert!(is_satisfied(&capsule, now));
    }

    #[test]
    fn test_time_condition_without_open_date_never_satisfies() {
        let capsule = time_capsule(None);
        assert_eq!(evaluate(&capsule, Utc::now()), ConditionCheck::NotYetDue);
    }

    #[test]
    fn test_unimplemented_condition_types_never_satisfy() {
        let long_ago = Some(Utc::now() - Duration::days(365));
        for ct in [
            ConditionType::Multisig,
            ConditionType::Oracle,
            ConditionType::Compound,
        ] {
            let capsule = capsule_with(ct, long_ago);
            assert_eq!(evaluate(&capsule, Utc::now()), ConditionCheck::Unsupported);
            assert!(!is_satisfied(&capsule, Utc::now()));
        }
    }
}
