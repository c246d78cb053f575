//! Shift swap workflow.
//!
//! A request moves `pending -> accepted -> approved`, and may be rejected by
//! the target while pending or by an administrator once accepted. Approved
//! and rejected are terminal.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::dates;
use crate::error::{EscalaError, EscalaResult};
use crate::models::{MonthSchedule, Shift, SwapRequest, SwapStatus, User};

pub fn can_transition(from: SwapStatus, to: SwapStatus) -> bool {
    matches!(
        (from, to),
        (SwapStatus::Pending, SwapStatus::Accepted)
            | (SwapStatus::Pending, SwapStatus::Rejected)
            | (SwapStatus::Accepted, SwapStatus::Approved)
            | (SwapStatus::Accepted, SwapStatus::Rejected)
    )
}

fn transition(request: &mut SwapRequest, to: SwapStatus) -> EscalaResult<()> {
    if !can_transition(request.status, to) {
        return Err(EscalaError::InvalidSwapTransition {
            from: request.status,
            to,
        });
    }
    request.status = to;
    Ok(())
}

fn ensure_holds(
    schedule: &MonthSchedule,
    name: &str,
    date: NaiveDate,
    shift: Shift,
) -> EscalaResult<()> {
    let slot = schedule
        .slot(date, shift)
        .ok_or_else(|| EscalaError::DateOutsideSchedule(dates::format_date(date)))?;
    if slot != name {
        return Err(EscalaError::SlotMismatch {
            name: name.to_string(),
            date: dates::format_date(date),
            shift,
        });
    }
    Ok(())
}

/// Opens a request for `requester` to trade their slot with `target`'s slot.
/// Both slots must currently be held as described in `schedule`.
pub fn create(
    schedule: &MonthSchedule,
    requester: &str,
    target: &str,
    original: (NaiveDate, Shift),
    wanted: (NaiveDate, Shift),
    reason: Option<String>,
) -> EscalaResult<SwapRequest> {
    if requester == target {
        return Err(EscalaError::SelfSwap);
    }
    ensure_holds(schedule, requester, original.0, original.1)?;
    ensure_holds(schedule, target, wanted.0, wanted.1)?;

    Ok(SwapRequest {
        id: Uuid::new_v4(),
        requester_name: requester.to_string(),
        target_name: target.to_string(),
        original_date: original.0,
        original_shift: original.1,
        target_date: wanted.0,
        target_shift: wanted.1,
        reason: reason.filter(|r| !r.trim().is_empty()),
        status: SwapStatus::Pending,
        created_at: Utc::now(),
        responded_at: None,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
    })
}

/// The target operator accepts or declines a pending request.
pub fn respond(request: &mut SwapRequest, responder: &str, accept: bool) -> EscalaResult<()> {
    if responder != request.target_name {
        return Err(EscalaError::NotAuthorized(responder.to_string()));
    }
    let to = if accept {
        SwapStatus::Accepted
    } else {
        SwapStatus::Rejected
    };
    transition(request, to)?;
    request.responded_at = Some(Utc::now());
    Ok(())
}

/// Administrator decision on an accepted request.
pub fn review(
    request: &mut SwapRequest,
    approver: &User,
    approve: bool,
    reason: Option<String>,
) -> EscalaResult<()> {
    if !approver.role.is_admin() || !approver.is_active() {
        return Err(EscalaError::NotAuthorized(approver.name.clone()));
    }
    if request.status != SwapStatus::Accepted {
        let to = if approve {
            SwapStatus::Approved
        } else {
            SwapStatus::Rejected
        };
        return Err(EscalaError::InvalidSwapTransition {
            from: request.status,
            to,
        });
    }

    if approve {
        transition(request, SwapStatus::Approved)?;
        request.approved_by = Some(approver.name.clone());
        request.approved_at = Some(Utc::now());
    } else {
        transition(request, SwapStatus::Rejected)?;
        request.approved_by = Some(approver.name.clone());
        request.approved_at = Some(Utc::now());
        request.rejection_reason = reason;
    }
    Ok(())
}

/// Exchanges the two operators in `schedule` for an approved request.
pub fn apply(request: &SwapRequest, schedule: &mut MonthSchedule) -> EscalaResult<()> {
    if request.status != SwapStatus::Approved {
        return Err(EscalaError::InvalidSwapTransition {
            from: request.status,
            to: SwapStatus::Approved,
        });
    }
    ensure_holds(
        schedule,
        &request.requester_name,
        request.original_date,
        request.original_shift,
    )?;
    ensure_holds(
        schedule,
        &request.target_name,
        request.target_date,
        request.target_shift,
    )?;

    let swap = [
        (
            request.original_date,
            request.original_shift,
            &request.target_name,
        ),
        (
            request.target_date,
            request.target_shift,
            &request.requester_name,
        ),
    ];
    for (date, shift, name) in swap {
        let entry = schedule
            .entry_mut(date)
            .ok_or_else(|| EscalaError::DateOutsideSchedule(dates::format_date(date)))?;
        *entry.slot_mut(shift) = name.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, ScheduleEntry, UserStatus};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn schedule() -> MonthSchedule {
        let entries = dates::month_dates(3, 2025)
            .unwrap()
            .into_iter()
            .map(|date| {
                let mut entry = ScheduleEntry::empty(date);
                entry.meio_periodo = "Ana".to_string();
                entry.fechamento = "Bruno".to_string();
                entry
            })
            .collect();
        MonthSchedule::new(3, 2025, entries, "Admin")
    }

    fn user(name: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            password_hash: String::new(),
            role,
            status: UserStatus::Ativo,
            created_at: Utc::now(),
        }
    }

    fn pending() -> SwapRequest {
        create(
            &schedule(),
            "Ana",
            "Bruno",
            (day(3), Shift::MeioPeriodo),
            (day(4), Shift::Fechamento),
            Some("consulta médica".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn create_checks_slot_ownership() {
        let schedule = schedule();
        let err = create(
            &schedule,
            "Ana",
            "Bruno",
            (day(3), Shift::Fechamento),
            (day(4), Shift::Fechamento),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EscalaError::SlotMismatch { .. }));

        let outside = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let err = create(
            &schedule,
            "Ana",
            "Bruno",
            (day(3), Shift::MeioPeriodo),
            (outside, Shift::Fechamento),
            None,
        )
        .unwrap_err();
        assert_eq!(err, EscalaError::DateOutsideSchedule("01/04/2025".to_string()));

        let err = create(
            &schedule,
            "Ana",
            "Ana",
            (day(3), Shift::MeioPeriodo),
            (day(4), Shift::MeioPeriodo),
            None,
        )
        .unwrap_err();
        assert_eq!(err, EscalaError::SelfSwap);
    }

    #[test]
    fn accept_moves_pending_to_accepted_only() {
        let mut request = pending();
        respond(&mut request, "Bruno", true).unwrap();
        assert_eq!(request.status, SwapStatus::Accepted);
        assert!(request.responded_at.is_some());

        let err = respond(&mut request, "Bruno", true).unwrap_err();
        assert_eq!(
            err,
            EscalaError::InvalidSwapTransition {
                from: SwapStatus::Accepted,
                to: SwapStatus::Accepted
            }
        );
        assert_eq!(request.status, SwapStatus::Accepted);

        for terminal in [SwapStatus::Approved, SwapStatus::Rejected] {
            let mut request = pending();
            request.status = terminal;
            assert!(respond(&mut request, "Bruno", true).is_err());
            assert_eq!(request.status, terminal);
        }
    }

    #[test]
    fn only_target_responds() {
        let mut request = pending();
        let err = respond(&mut request, "Ana", true).unwrap_err();
        assert_eq!(err, EscalaError::NotAuthorized("Ana".to_string()));
        assert_eq!(request.status, SwapStatus::Pending);
    }

    #[test]
    fn decline_rejects_pending() {
        let mut request = pending();
        respond(&mut request, "Bruno", false).unwrap();
        assert_eq!(request.status, SwapStatus::Rejected);
    }

    #[test]
    fn review_requires_admin_and_accepted() {
        let admin = user("Carlos", Role::Administrador);
        let operator = user("Dani", Role::Operador);

        let mut request = pending();
        assert!(review(&mut request, &admin, true, None).is_err());

        respond(&mut request, "Bruno", true).unwrap();
        assert_eq!(
            review(&mut request, &operator, true, None),
            Err(EscalaError::NotAuthorized("Dani".to_string()))
        );

        review(&mut request, &admin, true, None).unwrap();
        assert_eq!(request.status, SwapStatus::Approved);
        assert_eq!(request.approved_by.as_deref(), Some("Carlos"));
    }

    #[test]
    fn admin_rejection_keeps_reason() {
        let admin = user("Eva", Role::SuperAdmin);
        let mut request = pending();
        respond(&mut request, "Bruno", true).unwrap();
        review(&mut request, &admin, false, Some("equipe reduzida".to_string())).unwrap();
        assert_eq!(request.status, SwapStatus::Rejected);
        assert_eq!(request.rejection_reason.as_deref(), Some("equipe reduzida"));
    }

    #[test]
    fn apply_exchanges_names() {
        let admin = user("Carlos", Role::Administrador);
        let mut schedule = schedule();
        let mut request = pending();
        assert!(apply(&request, &mut schedule).is_err());

        respond(&mut request, "Bruno", true).unwrap();
        review(&mut request, &admin, true, None).unwrap();
        apply(&request, &mut schedule).unwrap();

        assert_eq!(schedule.slot(day(3), Shift::MeioPeriodo), Some("Bruno"));
        assert_eq!(schedule.slot(day(4), Shift::Fechamento), Some("Ana"));
        assert_eq!(schedule.slot(day(4), Shift::MeioPeriodo), Some("Ana"));

        // A second application finds the slots already changed.
        assert!(matches!(
            apply(&request, &mut schedule),
            Err(EscalaError::SlotMismatch { .. })
        ));
    }
}
