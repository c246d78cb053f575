use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates;
use crate::error::EscalaError;

/// The two daily duty slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    MeioPeriodo,
    Fechamento,
}

impl Shift {
    pub const ALL: [Shift; 2] = [Shift::MeioPeriodo, Shift::Fechamento];

    pub fn as_str(self) -> &'static str {
        match self {
            Shift::MeioPeriodo => "meio_periodo",
            Shift::Fechamento => "fechamento",
        }
    }

    /// Label used in the `posto` column of roster CSV files.
    pub fn posto_label(self) -> &'static str {
        match self {
            Shift::MeioPeriodo => "MEIO PERIODO",
            Shift::Fechamento => "FECHAMENTO",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shift {
    type Err = EscalaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = dates::fold_accents(s.trim())
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        match key.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "meio periodo" | "meioperiodo" | "mp" | "meio" => Ok(Shift::MeioPeriodo),
            "fechamento" | "fech" | "f" => Ok(Shift::Fechamento),
            _ => Err(EscalaError::UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub day_of_week: String,
    pub meio_periodo: String,
    pub fechamento: String,
}

impl ScheduleEntry {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            day_of_week: dates::weekday_name(date).to_string(),
            meio_periodo: String::new(),
            fechamento: String::new(),
        }
    }

    pub fn slot(&self, shift: Shift) -> &str {
        match shift {
            Shift::MeioPeriodo => &self.meio_periodo,
            Shift::Fechamento => &self.fechamento,
        }
    }

    pub fn slot_mut(&mut self, shift: Shift) -> &mut String {
        match shift {
            Shift::MeioPeriodo => &mut self.meio_periodo,
            Shift::Fechamento => &mut self.fechamento,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthSchedule {
    pub id: Uuid,
    pub month: u32,
    pub year: i32,
    pub entries: Vec<ScheduleEntry>,
    pub is_active: bool,
    pub imported_by: String,
    pub imported_at: DateTime<Utc>,
}

impl MonthSchedule {
    pub fn new(month: u32, year: i32, entries: Vec<ScheduleEntry>, imported_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            month,
            year,
            entries,
            is_active: true,
            imported_by: imported_by.to_string(),
            imported_at: Utc::now(),
        }
    }

    pub fn entry(&self, date: NaiveDate) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.date == date)
    }

    pub fn entry_mut(&mut self, date: NaiveDate) -> Option<&mut ScheduleEntry> {
        self.entries.iter_mut().find(|entry| entry.date == date)
    }

    pub fn slot(&self, date: NaiveDate, shift: Shift) -> Option<&str> {
        self.entry(date).map(|entry| entry.slot(shift))
    }

    pub fn label(&self) -> String {
        format!("{:02}/{}", self.month, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operador,
    Administrador,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Operador => "operador",
            Role::Administrador => "administrador",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Administrador | Role::SuperAdmin)
    }

    /// Whether a user with this role may create or modify an account holding `other`.
    pub fn can_manage(self, other: Role) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Administrador => other == Role::Operador,
            Role::Operador => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EscalaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "operador" => Ok(Role::Operador),
            "administrador" | "admin" => Ok(Role::Administrador),
            "super_admin" | "superadmin" | "super-admin" => Ok(Role::SuperAdmin),
            _ => Err(EscalaError::UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Ativo,
    Inativo,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Ativo => "ativo",
            UserStatus::Inativo => "inativo",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = EscalaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ativo" => Ok(UserStatus::Ativo),
            "inativo" => Ok(UserStatus::Inativo),
            _ => Err(EscalaError::UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Ativo
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Approved,
    Rejected,
}

impl SwapStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Accepted => "accepted",
            SwapStatus::Approved => "approved",
            SwapStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = EscalaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SwapStatus::Pending),
            "accepted" => Ok(SwapStatus::Accepted),
            "approved" => Ok(SwapStatus::Approved),
            "rejected" => Ok(SwapStatus::Rejected),
            _ => Err(EscalaError::UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: Uuid,
    pub requester_name: String,
    pub target_name: String,
    pub original_date: NaiveDate,
    pub original_shift: Shift,
    pub target_date: NaiveDate,
    pub target_shift: Shift,
    pub reason: Option<String>,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VacationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VacationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VacationStatus::Pending => "pending",
            VacationStatus::Approved => "approved",
            VacationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VacationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VacationStatus {
    type Err = EscalaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VacationStatus::Pending),
            "approved" => Ok(VacationStatus::Approved),
            "rejected" => Ok(VacationStatus::Rejected),
            _ => Err(EscalaError::UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacationRequest {
    pub id: Uuid,
    pub operator_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i64,
    pub status: VacationStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_name: String,
    pub action: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct OperatorLoad {
    pub operator_name: String,
    pub meio_periodo: usize,
    pub fechamento: usize,
}

impl OperatorLoad {
    pub fn total(&self) -> usize {
        self.meio_periodo + self.fechamento
    }
}
