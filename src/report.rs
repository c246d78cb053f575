use std::collections::BTreeMap;
use std::fmt::Write;

use crate::dates;
use crate::models::{MonthSchedule, OperatorLoad, Shift, SwapRequest, VacationRequest};

pub fn summarize_by_operator(schedule: &MonthSchedule) -> Vec<OperatorLoad> {
    let mut map: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for entry in &schedule.entries {
        if !entry.meio_periodo.is_empty() {
            map.entry(entry.meio_periodo.as_str()).or_insert((0, 0)).0 += 1;
        }
        if !entry.fechamento.is_empty() {
            map.entry(entry.fechamento.as_str()).or_insert((0, 0)).1 += 1;
        }
    }

    let mut loads: Vec<OperatorLoad> = map
        .into_iter()
        .map(|(name, (meio_periodo, fechamento))| OperatorLoad {
            operator_name: name.to_string(),
            meio_periodo,
            fechamento,
        })
        .collect();

    loads.sort_by(|a, b| b.total().cmp(&a.total()));
    loads
}

/// Unfilled (date, shift) slots, in calendar order.
pub fn open_slots(schedule: &MonthSchedule) -> Vec<(String, Shift)> {
    schedule
        .entries
        .iter()
        .flat_map(|entry| {
            Shift::ALL
                .into_iter()
                .filter(|shift| entry.slot(*shift).is_empty())
                .map(|shift| (dates::format_date(entry.date), shift))
        })
        .collect()
}

pub fn build_report(
    schedule: &MonthSchedule,
    pending_swaps: &[SwapRequest],
    vacations: &[VacationRequest],
) -> String {
    let loads = summarize_by_operator(schedule);
    let open = open_slots(schedule);

    let mut output = String::new();

    let _ = writeln!(output, "# Escala {}", schedule.label());
    let _ = writeln!(
        output,
        "Imported by {} on {}",
        schedule.imported_by,
        schedule.imported_at.format("%d/%m/%Y %H:%M")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| Data | Dia | Meio Período | Fechamento |");
    let _ = writeln!(output, "|------|-----|--------------|------------|");
    for entry in &schedule.entries {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            dates::format_date(entry.date),
            entry.day_of_week,
            or_dash(&entry.meio_periodo),
            or_dash(&entry.fechamento)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Shifts per Operator");

    if loads.is_empty() {
        let _ = writeln!(output, "No shifts assigned this month.");
    } else {
        for load in loads.iter() {
            let _ = writeln!(
                output,
                "- {}: {} shifts ({} meio período, {} fechamento)",
                load.operator_name,
                load.total(),
                load.meio_periodo,
                load.fechamento
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Slots");

    if open.is_empty() {
        let _ = writeln!(output, "Every slot is covered.");
    } else {
        for (date, shift) in open.iter() {
            let _ = writeln!(output, "- {} {}", date, shift.posto_label());
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Pending Swaps");

    if pending_swaps.is_empty() {
        let _ = writeln!(output, "No swaps awaiting a decision.");
    } else {
        for swap in pending_swaps.iter() {
            let _ = writeln!(
                output,
                "- {} ({} {}) with {} ({} {}): {}",
                swap.requester_name,
                dates::format_date(swap.original_date),
                swap.original_shift.posto_label(),
                swap.target_name,
                dates::format_date(swap.target_date),
                swap.target_shift.posto_label(),
                swap.status
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Vacations");

    if vacations.is_empty() {
        let _ = writeln!(output, "No vacation requests in this month.");
    } else {
        for vacation in vacations.iter() {
            let _ = writeln!(
                output,
                "- {}: {} to {} ({} days, {})",
                vacation.operator_name,
                dates::format_date(vacation.start_date),
                dates::format_date(vacation.end_date),
                vacation.total_days,
                vacation.status
            );
        }
    }

    output
}

fn or_dash(name: &str) -> &str {
    if name.is_empty() {
        "-"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleEntry;

    fn schedule() -> MonthSchedule {
        let entries = dates::month_dates(2, 2025)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(index, date)| {
                let mut entry = ScheduleEntry::empty(date);
                entry.meio_periodo = if index % 2 == 0 { "Ana" } else { "Bruno" }.to_string();
                if index > 0 {
                    entry.fechamento = "Bruno".to_string();
                }
                entry
            })
            .collect();
        MonthSchedule::new(2, 2025, entries, "Ricardo")
    }

    #[test]
    fn counts_shifts_per_operator() {
        let loads = summarize_by_operator(&schedule());
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].operator_name, "Bruno");
        assert_eq!(loads[0].meio_periodo, 14);
        assert_eq!(loads[0].fechamento, 27);
        assert_eq!(loads[1].operator_name, "Ana");
        assert_eq!(loads[1].total(), 14);
    }

    #[test]
    fn lists_open_slots() {
        let open = open_slots(&schedule());
        assert_eq!(open, vec![("01/02/2025".to_string(), Shift::Fechamento)]);
    }

    #[test]
    fn report_has_all_sections() {
        let report = build_report(&schedule(), &[], &[]);
        assert!(report.starts_with("# Escala 02/2025"));
        assert!(report.contains("| 01/02/2025 | Sábado | Ana | - |"));
        assert!(report.contains("- Bruno: 41 shifts (14 meio período, 27 fechamento)"));
        assert!(report.contains("- 01/02/2025 FECHAMENTO"));
        assert!(report.contains("No swaps awaiting a decision."));
        assert!(report.contains("No vacation requests in this month."));
    }
}
