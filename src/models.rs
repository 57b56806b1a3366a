use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{NaiveDate, DateTime, Utc};

/// One menstrual cycle. `end_date == None` means the period is still ongoing.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Cycle {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub period_length: Option<i32>,
    pub cycle_length: Option<i32>,
    pub is_period_normal: Option<bool>,
    pub is_cycle_normal: Option<bool>,
    pub long_period_notified: bool,
    pub late_period_notified: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Cycle {
    pub fn new(user_id: Uuid, start_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            start_date,
            end_date: None,
            period_length: None,
            cycle_length: None,
            is_period_normal: None,
            is_cycle_normal: None,
            long_period_notified: false,
            late_period_notified: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

/// The slice of an account this service reads. Accounts themselves are
/// owned by the auth service.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub notification_token: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "symptom_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SymptomType {
    Basic,
    Options,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Symptom {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub symptom_type: SymptomType,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SymptomOption {
    pub id: Uuid,
    pub symptom_id: Uuid,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymptomWithOptions {
    #[serde(flatten)]
    pub symptom: Symptom,
    pub options: Vec<SymptomOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SymptomLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub log_date: NaiveDate,
    pub logged_at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SymptomLogDetail {
    pub id: Uuid,
    pub symptom_log_id: Uuid,
    pub symptom_id: Uuid,
    pub symptom_option_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymptomLogEntry {
    #[serde(flatten)]
    pub log: SymptomLog,
    pub details: Vec<SymptomLogDetail>,
}

/// One observed symptom in a log request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SymptomEntry {
    pub symptom_id: Uuid,
    pub option_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CycleSummary {
    pub cycle_day: i64,
    pub is_period_ongoing: bool,
    pub in_fertile_window: bool,
    pub period_expected_in_days: i64,
    pub start_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct CycleStat {
    pub cycle_number: i32,
    pub start_date: NaiveDate,
    pub period_length: Option<i32>,
    pub cycle_length: Option<i32>,
    pub is_period_normal: Option<bool>,
    pub is_cycle_normal: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CycleStatsResponse {
    pub average_period_length: Option<f64>,
    pub average_cycle_length: Option<f64>,
    pub cycle_stats: Vec<CycleStat>,
}
