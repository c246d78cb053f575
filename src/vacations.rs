use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::dates;
use crate::error::{EscalaError, EscalaResult};
use crate::models::{User, VacationRequest, VacationStatus};

/// Inclusive number of days between `start` and `end`.
pub fn total_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

pub fn overlaps(request: &VacationRequest, start: NaiveDate, end: NaiveDate) -> bool {
    request.start_date <= end && start <= request.end_date
}

/// Builds a pending request, refusing ranges that collide with `existing`
/// pending or approved requests of the same operator.
pub fn create(
    operator: &str,
    start: NaiveDate,
    end: NaiveDate,
    reason: Option<String>,
    existing: &[VacationRequest],
) -> EscalaResult<VacationRequest> {
    if start > end {
        return Err(EscalaError::InvertedRange {
            start: dates::format_date(start),
            end: dates::format_date(end),
        });
    }

    if let Some(conflict) = existing.iter().find(|r| {
        r.operator_name == operator && r.status != VacationStatus::Rejected && overlaps(r, start, end)
    }) {
        return Err(EscalaError::OverlappingVacation {
            start: dates::format_date(conflict.start_date),
            end: dates::format_date(conflict.end_date),
        });
    }

    Ok(VacationRequest {
        id: Uuid::new_v4(),
        operator_name: operator.to_string(),
        start_date: start,
        end_date: end,
        total_days: total_days(start, end),
        status: VacationStatus::Pending,
        reason: reason.filter(|r| !r.trim().is_empty()),
        created_at: Utc::now(),
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
    })
}

pub fn review(
    request: &mut VacationRequest,
    approver: &User,
    approve: bool,
    reason: Option<String>,
) -> EscalaResult<()> {
    if !approver.role.is_admin() || !approver.is_active() {
        return Err(EscalaError::NotAuthorized(approver.name.clone()));
    }
    let to = if approve {
        VacationStatus::Approved
    } else {
        VacationStatus::Rejected
    };
    if request.status != VacationStatus::Pending {
        return Err(EscalaError::InvalidVacationTransition {
            from: request.status,
            to,
        });
    }

    request.status = to;
    request.approved_by = Some(approver.name.clone());
    request.approved_at = Some(Utc::now());
    if !approve {
        request.rejection_reason = reason;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, UserStatus};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn admin() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Carlos".to_string(),
            password_hash: String::new(),
            role: Role::Administrador,
            status: UserStatus::Ativo,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_days_inclusively() {
        let request = create("Ana", date(7, 1), date(7, 15), None, &[]).unwrap();
        assert_eq!(request.total_days, 15);
        assert_eq!(request.status, VacationStatus::Pending);
        assert_eq!(total_days(date(2, 28), date(3, 1)), 2);
    }

    #[test]
    fn rejects_inverted_ranges() {
        let err = create("Ana", date(7, 10), date(7, 1), None, &[]).unwrap_err();
        assert!(matches!(err, EscalaError::InvertedRange { .. }));
    }

    #[test]
    fn overlap_ignores_rejected_and_other_operators() {
        let mut first = create("Ana", date(7, 1), date(7, 10), None, &[]).unwrap();
        let err = create("Ana", date(7, 10), date(7, 20), None, &[first.clone()]).unwrap_err();
        assert_eq!(
            err,
            EscalaError::OverlappingVacation {
                start: "01/07/2025".to_string(),
                end: "10/07/2025".to_string()
            }
        );
        assert!(create("Bruno", date(7, 5), date(7, 6), None, &[first.clone()]).is_ok());

        first.status = VacationStatus::Rejected;
        assert!(create("Ana", date(7, 5), date(7, 6), None, &[first]).is_ok());
    }

    #[test]
    fn review_is_admin_only_and_once() {
        let mut request = create("Ana", date(8, 1), date(8, 5), None, &[]).unwrap();
        let mut operator = admin();
        operator.role = Role::Operador;
        assert!(review(&mut request, &operator, true, None).is_err());

        review(&mut request, &admin(), false, Some("férias coletivas".to_string())).unwrap();
        assert_eq!(request.status, VacationStatus::Rejected);
        assert_eq!(request.rejection_reason.as_deref(), Some("férias coletivas"));

        let err = review(&mut request, &admin(), true, None).unwrap_err();
        assert_eq!(
            err,
            EscalaError::InvalidVacationTransition {
                from: VacationStatus::Rejected,
                to: VacationStatus::Approved
            }
        );
    }
}
