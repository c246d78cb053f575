use anyhow::{bail, Context};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dates;
use crate::models::{
    AuditLogEntry, MonthSchedule, Role, ScheduleEntry, Shift, SwapRequest, SwapStatus, User,
    UserStatus, VacationRequest, VacationStatus,
};
use crate::{swaps, users, vacations};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Demo team with a filled roster for the current month.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let team = [
        ("Marina Costa", "super_admin", Role::SuperAdmin),
        ("Ricardo Alves", "admin123", Role::Administrador),
        ("Ana Souza", "ana123", Role::Operador),
        ("Bruno Lima", "bruno123", Role::Operador),
        ("Carla Dias", "carla123", Role::Operador),
        ("Diego Rocha", "diego123", Role::Operador),
    ];

    for (name, password, role) in team {
        if find_user(pool, name).await?.is_some() {
            continue;
        }
        create_user(pool, name, password, role).await?;
    }

    let today = Utc::now().date_naive();
    let (month, year) = (today.month(), today.year());
    let mut conn = pool.acquire().await?;
    if fetch_active_schedule(&mut conn, month, year).await?.is_some() {
        return Ok(());
    }

    let operators = ["Ana Souza", "Bruno Lima", "Carla Dias", "Diego Rocha"];
    let entries = dates::month_dates(month, year)?
        .into_iter()
        .enumerate()
        .map(|(index, date)| {
            let mut entry = ScheduleEntry::empty(date);
            entry.meio_periodo = operators[index % operators.len()].to_string();
            entry.fechamento = operators[(index + 2) % operators.len()].to_string();
            entry
        })
        .collect();
    save_schedule(pool, &MonthSchedule::new(month, year, entries, "Marina Costa")).await?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        password_hash: row.get("password_hash"),
        role: row.get::<String, _>("role").parse()?,
        status: row.get::<String, _>("status").parse()?,
        created_at: row.get("created_at"),
    })
}

pub async fn find_user(pool: &PgPool, name: &str) -> anyhow::Result<Option<User>> {
    debug!("Finding user {}", name);
    let row = sqlx::query(
        "SELECT id, name, password_hash, role, status, created_at FROM escalas.users WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn require_user(pool: &PgPool, name: &str) -> anyhow::Result<User> {
    find_user(pool, name)
        .await?
        .with_context(|| format!("user '{name}' does not exist"))
}

pub async fn list_users(pool: &PgPool) -> anyhow::Result<Vec<User>> {
    let rows = sqlx::query(
        "SELECT id, name, password_hash, role, status, created_at FROM escalas.users ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(user_from_row).collect()
}

pub async fn create_user(
    pool: &PgPool,
    name: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<User> {
    info!("Creating user {} ({})", name, role);
    let password_hash = users::hash_password(password)?;
    let mut tx = pool.begin().await?;

    // Serializes account creation so the name check below sees every insert.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('escalas.users'))")
        .execute(&mut *tx)
        .await?;

    let existing: Vec<String> = sqlx::query("SELECT name FROM escalas.users")
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.get("name"))
        .collect();
    users::ensure_unique_name(name, existing.iter().map(String::as_str))?;

    let row = sqlx::query(
        r#"
        INSERT INTO escalas.users (id, name, password_hash, role, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, password_hash, role, status, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name.trim())
    .bind(password_hash)
    .bind(role.as_str())
    .bind(UserStatus::Ativo.as_str())
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("failed to create user '{name}'"))?;

    let user = user_from_row(&row)?;
    tx.commit().await?;
    Ok(user)
}

pub async fn update_user(
    pool: &PgPool,
    name: &str,
    role: Role,
    status: UserStatus,
) -> anyhow::Result<()> {
    info!("Updating user {}: role {}, status {}", name, role, status);
    let result = sqlx::query("UPDATE escalas.users SET role = $2, status = $3 WHERE name = $1")
        .bind(name)
        .bind(role.as_str())
        .bind(status.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        bail!("user '{name}' does not exist");
    }
    Ok(())
}

/// Names accepted in roster files: every active account.
pub async fn roster_names(pool: &PgPool) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query("SELECT name FROM escalas.users WHERE status = 'ativo' ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|row| row.get("name")).collect())
}

/// Stores a schedule as the active one for its month, retiring any previous
/// active schedule for the same month.
pub async fn save_schedule(pool: &PgPool, schedule: &MonthSchedule) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let retired = sqlx::query(
        r#"
        UPDATE escalas.month_schedules SET is_active = FALSE
        WHERE month = $1 AND year = $2 AND is_active
        "#,
    )
    .bind(schedule.month as i32)
    .bind(schedule.year)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        r#"
        INSERT INTO escalas.month_schedules (id, month, year, is_active, imported_by, imported_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(schedule.id)
    .bind(schedule.month as i32)
    .bind(schedule.year)
    .bind(schedule.is_active)
    .bind(&schedule.imported_by)
    .bind(schedule.imported_at)
    .execute(&mut *tx)
    .await?;

    for entry in &schedule.entries {
        sqlx::query(
            r#"
            INSERT INTO escalas.schedule_entries
            (schedule_id, date, day_of_week, meio_periodo, fechamento)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(schedule.id)
        .bind(entry.date)
        .bind(&entry.day_of_week)
        .bind(&entry.meio_periodo)
        .bind(&entry.fechamento)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        "Stored schedule {} with {} entries ({} previous retired)",
        schedule.label(),
        schedule.entries.len(),
        retired
    );
    Ok(())
}

pub async fn fetch_active_schedule(
    conn: &mut PgConnection,
    month: u32,
    year: i32,
) -> anyhow::Result<Option<MonthSchedule>> {
    let Some(row) = sqlx::query(
        r#"
        SELECT id, month, year, is_active, imported_by, imported_at
        FROM escalas.month_schedules
        WHERE month = $1 AND year = $2 AND is_active
        "#,
    )
    .bind(month as i32)
    .bind(year)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let id: Uuid = row.get("id");
    let entry_rows = sqlx::query(
        r#"
        SELECT date, day_of_week, meio_periodo, fechamento
        FROM escalas.schedule_entries
        WHERE schedule_id = $1
        ORDER BY date
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let entries = entry_rows
        .iter()
        .map(|entry| ScheduleEntry {
            date: entry.get("date"),
            day_of_week: entry.get("day_of_week"),
            meio_periodo: entry.get("meio_periodo"),
            fechamento: entry.get("fechamento"),
        })
        .collect();

    Ok(Some(MonthSchedule {
        id,
        month: row.get::<i32, _>("month") as u32,
        year: row.get("year"),
        entries,
        is_active: row.get("is_active"),
        imported_by: row.get("imported_by"),
        imported_at: row.get("imported_at"),
    }))
}

pub async fn require_active_schedule(
    conn: &mut PgConnection,
    month: u32,
    year: i32,
) -> anyhow::Result<MonthSchedule> {
    fetch_active_schedule(conn, month, year)
        .await?
        .with_context(|| format!("no active schedule for {month:02}/{year}"))
}

async fn update_slot(
    conn: &mut PgConnection,
    schedule_id: Uuid,
    date: NaiveDate,
    shift: Shift,
    name: &str,
) -> anyhow::Result<()> {
    let column = match shift {
        Shift::MeioPeriodo => "meio_periodo",
        Shift::Fechamento => "fechamento",
    };
    sqlx::query(&format!(
        "UPDATE escalas.schedule_entries SET {column} = $3 WHERE schedule_id = $1 AND date = $2"
    ))
    .bind(schedule_id)
    .bind(date)
    .bind(name)
    .execute(conn)
    .await?;
    Ok(())
}

const SWAP_COLUMNS: &str = "id, requester_name, target_name, original_date, original_shift, \
     target_date, target_shift, reason, status, created_at, responded_at, approved_by, \
     approved_at, rejection_reason";

fn shift_from_row(row: &PgRow, column: &str) -> anyhow::Result<Shift> {
    Ok(row.get::<String, _>(column).parse()?)
}

fn swap_from_row(row: &PgRow) -> anyhow::Result<SwapRequest> {
    Ok(SwapRequest {
        id: row.get("id"),
        requester_name: row.get("requester_name"),
        target_name: row.get("target_name"),
        original_date: row.get("original_date"),
        original_shift: shift_from_row(row, "original_shift")?,
        target_date: row.get("target_date"),
        target_shift: shift_from_row(row, "target_shift")?,
        reason: row.get("reason"),
        status: row.get::<String, _>("status").parse()?,
        created_at: row.get("created_at"),
        responded_at: row.get("responded_at"),
        approved_by: row.get("approved_by"),
        approved_at: row.get("approved_at"),
        rejection_reason: row.get("rejection_reason"),
    })
}

async fn lock_swap(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<SwapRequest> {
    let row = sqlx::query(&format!(
        "SELECT {SWAP_COLUMNS} FROM escalas.swap_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .with_context(|| format!("swap request {id} does not exist"))?;

    swap_from_row(&row)
}

async fn store_swap_decision(conn: &mut PgConnection, request: &SwapRequest) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE escalas.swap_requests
        SET status = $2, responded_at = $3, approved_by = $4, approved_at = $5,
            rejection_reason = $6
        WHERE id = $1
        "#,
    )
    .bind(request.id)
    .bind(request.status.as_str())
    .bind(request.responded_at)
    .bind(&request.approved_by)
    .bind(request.approved_at)
    .bind(&request.rejection_reason)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn create_swap(
    pool: &PgPool,
    requester: &str,
    target: &str,
    original: (NaiveDate, Shift),
    wanted: (NaiveDate, Shift),
    reason: Option<String>,
) -> anyhow::Result<SwapRequest> {
    if (original.0.month(), original.0.year()) != (wanted.0.month(), wanted.0.year()) {
        bail!("both dates of a swap must fall in the same month");
    }
    let mut conn = pool.acquire().await?;
    let schedule =
        require_active_schedule(&mut conn, original.0.month(), original.0.year()).await?;
    let request = swaps::create(&schedule, requester, target, original, wanted, reason)?;

    sqlx::query(
        r#"
        INSERT INTO escalas.swap_requests
        (id, requester_name, target_name, original_date, original_shift, target_date,
         target_shift, reason, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(request.id)
    .bind(&request.requester_name)
    .bind(&request.target_name)
    .bind(request.original_date)
    .bind(request.original_shift.as_str())
    .bind(request.target_date)
    .bind(request.target_shift.as_str())
    .bind(&request.reason)
    .bind(request.status.as_str())
    .bind(request.created_at)
    .execute(&mut *conn)
    .await?;

    info!("Swap request {} opened by {}", request.id, requester);
    Ok(request)
}

/// The target's answer. The row stays locked until the decision is stored,
/// so concurrent answers apply one after the other.
pub async fn respond_to_swap(
    pool: &PgPool,
    id: Uuid,
    responder: &str,
    accept: bool,
) -> anyhow::Result<SwapRequest> {
    let mut tx = pool.begin().await?;
    let mut request = lock_swap(&mut tx, id).await?;
    swaps::respond(&mut request, responder, accept)?;
    store_swap_decision(&mut tx, &request).await?;
    tx.commit().await?;

    info!("Swap request {} is now {}", id, request.status);
    Ok(request)
}

/// Administrator review; an approval rewrites both slots in the schedule in
/// the same transaction.
pub async fn review_swap(
    pool: &PgPool,
    id: Uuid,
    approver: &User,
    approve: bool,
    reason: Option<String>,
) -> anyhow::Result<SwapRequest> {
    let mut tx = pool.begin().await?;
    let mut request = lock_swap(&mut tx, id).await?;
    swaps::review(&mut request, approver, approve, reason)?;

    if request.status == SwapStatus::Approved {
        let date = request.original_date;
        let mut schedule = require_active_schedule(&mut tx, date.month(), date.year()).await?;
        swaps::apply(&request, &mut schedule)?;
        for (date, shift) in [
            (request.original_date, request.original_shift),
            (request.target_date, request.target_shift),
        ] {
            let name = schedule.slot(date, shift).unwrap_or_default().to_string();
            update_slot(&mut tx, schedule.id, date, shift, &name).await?;
        }
    }

    store_swap_decision(&mut tx, &request).await?;
    tx.commit().await?;

    info!("Swap request {} {} by {}", id, request.status, approver.name);
    Ok(request)
}

pub async fn list_swaps(
    pool: &PgPool,
    status: Option<SwapStatus>,
) -> anyhow::Result<Vec<SwapRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {SWAP_COLUMNS} FROM escalas.swap_requests \
         WHERE $1::text IS NULL OR status = $1 ORDER BY created_at DESC"
    ))
    .bind(status.map(SwapStatus::as_str))
    .fetch_all(pool)
    .await?;

    rows.iter().map(swap_from_row).collect()
}

const VACATION_COLUMNS: &str = "id, operator_name, start_date, end_date, total_days, status, \
     reason, created_at, approved_by, approved_at, rejection_reason";

fn vacation_from_row(row: &PgRow) -> anyhow::Result<VacationRequest> {
    Ok(VacationRequest {
        id: row.get("id"),
        operator_name: row.get("operator_name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        total_days: i64::from(row.get::<i32, _>("total_days")),
        status: row.get::<String, _>("status").parse::<VacationStatus>()?,
        reason: row.get("reason"),
        created_at: row.get("created_at"),
        approved_by: row.get("approved_by"),
        approved_at: row.get("approved_at"),
        rejection_reason: row.get("rejection_reason"),
    })
}

pub async fn create_vacation(
    pool: &PgPool,
    operator: &str,
    start: NaiveDate,
    end: NaiveDate,
    reason: Option<String>,
) -> anyhow::Result<VacationRequest> {
    let mut tx = pool.begin().await?;

    // Serializes overlap checks for the same operator.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(operator)
        .execute(&mut *tx)
        .await?;

    let existing = sqlx::query(&format!(
        "SELECT {VACATION_COLUMNS} FROM escalas.vacation_requests \
         WHERE operator_name = $1 AND status <> 'rejected'"
    ))
    .bind(operator)
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(vacation_from_row)
    .collect::<anyhow::Result<Vec<_>>>()?;

    let request = vacations::create(operator, start, end, reason, &existing)?;

    sqlx::query(
        r#"
        INSERT INTO escalas.vacation_requests
        (id, operator_name, start_date, end_date, total_days, status, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(request.id)
    .bind(&request.operator_name)
    .bind(request.start_date)
    .bind(request.end_date)
    .bind(request.total_days as i32)
    .bind(request.status.as_str())
    .bind(&request.reason)
    .bind(request.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "Vacation request {} for {} ({} days)",
        request.id, operator, request.total_days
    );
    Ok(request)
}

pub async fn review_vacation(
    pool: &PgPool,
    id: Uuid,
    approver: &User,
    approve: bool,
    reason: Option<String>,
) -> anyhow::Result<VacationRequest> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "SELECT {VACATION_COLUMNS} FROM escalas.vacation_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .with_context(|| format!("vacation request {id} does not exist"))?;

    let mut request = vacation_from_row(&row)?;
    vacations::review(&mut request, approver, approve, reason)?;

    sqlx::query(
        r#"
        UPDATE escalas.vacation_requests
        SET status = $2, approved_by = $3, approved_at = $4, rejection_reason = $5
        WHERE id = $1
        "#,
    )
    .bind(request.id)
    .bind(request.status.as_str())
    .bind(&request.approved_by)
    .bind(request.approved_at)
    .bind(&request.rejection_reason)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Vacation request {} {} by {}", id, request.status, approver.name);
    Ok(request)
}

pub async fn list_vacations(
    pool: &PgPool,
    status: Option<VacationStatus>,
    operator: Option<&str>,
) -> anyhow::Result<Vec<VacationRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {VACATION_COLUMNS} FROM escalas.vacation_requests \
         WHERE ($1::text IS NULL OR status = $1) AND ($2::text IS NULL OR operator_name = $2) \
         ORDER BY start_date"
    ))
    .bind(status.map(VacationStatus::as_str))
    .bind(operator)
    .fetch_all(pool)
    .await?;

    rows.iter().map(vacation_from_row).collect()
}

pub async fn record_audit(pool: &PgPool, entry: &AuditLogEntry) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO escalas.audit_logs (id, user_name, action, details, success, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.user_name)
    .bind(&entry.action)
    .bind(&entry.details)
    .bind(entry.success)
    .bind(entry.timestamp)
    .execute(pool)
    .await
    .context("failed to write audit log")?;
    Ok(())
}

pub async fn fetch_audit(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<AuditLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_name, action, details, success, created_at
        FROM escalas.audit_logs
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AuditLogEntry {
            id: row.get("id"),
            user_name: row.get("user_name"),
            action: row.get("action"),
            details: row.get("details"),
            timestamp: row.get::<DateTime<Utc>, _>("created_at"),
            success: row.get("success"),
        })
        .collect())
}
