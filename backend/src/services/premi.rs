//! Supervisor premi: daily premi documents and the monthly afdeling/estate lines

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use validator::Validate;

use shared::{
    afdeling_premi, estate_premi, AfdelingPremiInput, AfdelingPremiLine, DailySupervisorPremi,
    DateRange, PremiDocumentState, PremiSource, QualityRule, SupervisorRole, RECORD_NOT_FOUND,
};

use crate::error::{AppError, AppResult};
use crate::services::harvest::operations_of_day;

/// Premi service
#[derive(Clone)]
pub struct PremiService {
    db: PgPool,
}

/// Query of a daily premi preview, also the body of a stored document
#[derive(Debug, Deserialize, Validate)]
pub struct DailyPremiInput {
    pub employee_id: i64,
    pub date: NaiveDate,
    pub role: SupervisorRole,
    #[validate(custom = "validate_multiplier")]
    pub multiplier: Decimal,
    #[serde(default)]
    pub additional_premi: Decimal,
}

#[derive(Debug, Serialize)]
pub struct StoredPremi {
    pub id: i64,
    #[serde(flatten)]
    pub premi: DailySupervisorPremi,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MonthlyPremiInput {
    pub period: DateRange,
    #[serde(default)]
    pub rules: Vec<QualityRule>,
    #[validate(length(min = 1))]
    pub lines: Vec<AfdelingPremiInput>,
    #[validate(custom = "validate_multiplier")]
    pub estate_multiplier: Decimal,
}

#[derive(Debug, Serialize)]
pub struct MonthlyPremi {
    pub lines: Vec<AfdelingPremiLine>,
    pub estate_premi: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct PremiRow {
    id: i64,
    employee_id: i64,
    date: NaiveDate,
    role: String,
    multiplier: Decimal,
    additional_premi: Decimal,
    penalty_deduction: Decimal,
    sources: Json<Vec<PremiSource>>,
    premi_total: Decimal,
    state: String,
}

impl TryFrom<PremiRow> for StoredPremi {
    type Error = AppError;

    fn try_from(row: PremiRow) -> AppResult<Self> {
        let role = SupervisorRole::parse(&row.role).ok_or_else(|| {
            AppError::CorruptRecord(format!("premi {} has role '{}'", row.id, row.role))
        })?;
        let state = PremiDocumentState::parse(&row.state).ok_or_else(|| {
            AppError::CorruptRecord(format!("premi {} has state '{}'", row.id, row.state))
        })?;
        Ok(StoredPremi {
            id: row.id,
            premi: DailySupervisorPremi {
                employee_id: row.employee_id,
                date: row.date,
                role,
                multiplier: row.multiplier,
                additional_premi: row.additional_premi,
                penalty_deduction: row.penalty_deduction,
                sources: row.sources.0,
                premi_total: row.premi_total,
                state,
            },
        })
    }
}

fn validate_multiplier(value: &Decimal) -> Result<(), validator::ValidationError> {
    if value.is_sign_negative() {
        return Err(validator::ValidationError::new("negative_multiplier"));
    }
    Ok(())
}

impl PremiService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Compute a supervisor's premi for a day without storing it
    pub async fn preview_daily(
        &self,
        company_id: Option<i64>,
        input: &DailyPremiInput,
    ) -> AppResult<DailySupervisorPremi> {
        input.validate()?;
        let mut conn = self.db.acquire().await?;
        let (operations, records) = operations_of_day(&mut conn, company_id, input.date).await?;

        let mut premi = DailySupervisorPremi::collect(
            input.employee_id,
            input.date,
            input.role,
            input.multiplier,
            &operations,
            &records,
        );
        premi.additional_premi = input.additional_premi;
        premi.recompute();
        Ok(premi)
    }

    /// Store a draft daily premi document
    pub async fn store_daily(
        &self,
        company_id: Option<i64>,
        input: &DailyPremiInput,
    ) -> AppResult<StoredPremi> {
        let premi = self.preview_daily(company_id, input).await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO supervisor_premis (
                company_id, employee_id, date, role, multiplier, additional_premi,
                penalty_deduction, sources, premi_total, state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(company_id)
        .bind(premi.employee_id)
        .bind(premi.date)
        .bind(premi.role.as_str())
        .bind(premi.multiplier)
        .bind(premi.additional_premi)
        .bind(premi.penalty_deduction)
        .bind(Json(&premi.sources))
        .bind(premi.premi_total)
        .bind(premi.state.as_str())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(premi_id = id, employee_id = premi.employee_id, role = premi.role.as_str(), "daily premi stored");
        Ok(StoredPremi { id, premi })
    }

    pub async fn post_daily(&self, id: i64) -> AppResult<StoredPremi> {
        let mut stored = self.get_daily(id).await?;
        if stored.premi.state != PremiDocumentState::Draft {
            return Err(AppError::InvalidStateTransition(
                "Only draft premi can be posted".to_string(),
            ));
        }
        stored.premi.state = PremiDocumentState::Posted;

        sqlx::query("UPDATE supervisor_premis SET state = $2 WHERE id = $1")
            .bind(id)
            .bind(stored.premi.state.as_str())
            .execute(&self.db)
            .await?;

        tracing::info!(premi_id = id, "daily premi posted");
        Ok(stored)
    }

    pub async fn delete_daily(&self, id: i64) -> AppResult<()> {
        let stored = self.get_daily(id).await?;
        stored.premi.ensure_deletable()?;

        sqlx::query("DELETE FROM supervisor_premis WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!(premi_id = id, "daily premi deleted");
        Ok(())
    }

    async fn get_daily(&self, id: i64) -> AppResult<StoredPremi> {
        let row = sqlx::query_as::<_, PremiRow>(
            r#"
            SELECT id, employee_id, date, role, multiplier, additional_premi,
                   penalty_deduction, sources, premi_total, state
            FROM supervisor_premis
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(RECORD_NOT_FOUND.to_string()))?;

        StoredPremi::try_from(row)
    }
}

/// Afdeling lines for a period and the estate manager premi over them
pub fn monthly_premi(input: &MonthlyPremiInput) -> AppResult<MonthlyPremi> {
    input.validate()?;
    if input.period.start > input.period.end {
        return Err(AppError::ValidationError(
            "Period start must not be after its end".to_string(),
        ));
    }

    let lines: Vec<AfdelingPremiLine> = input
        .lines
        .iter()
        .map(|line| afdeling_premi(line, &input.rules, &input.period))
        .collect();
    let totals: Vec<Decimal> = lines.iter().map(|l| l.employee_premi).collect();

    Ok(MonthlyPremi {
        estate_premi: estate_premi(&totals, input.estate_multiplier),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monthly(body: serde_json::Value) -> MonthlyPremiInput {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn estate_premi_averages_afdeling_lines() {
        let input = monthly(json!({
            "period": {"start": "2024-04-01", "end": "2024-04-30"},
            "rules": [],
            "estate_multiplier": 150,
            "lines": [
                {
                    "employee_id": 1, "employee_start": null,
                    "actual_harvest": 100, "planned_optimal": 100, "planned_maximum": 120,
                    "premi_optimal": 1000, "premi_maximum": 1500, "harvest_quality": 0,
                    "multiplier": 100
                },
                {
                    "employee_id": 2, "employee_start": null,
                    "actual_harvest": 50, "planned_optimal": 100, "planned_maximum": 120,
                    "premi_optimal": 1000, "premi_maximum": 1500, "harvest_quality": 0,
                    "multiplier": 100
                }
            ]
        }));
        let result = monthly_premi(&input).unwrap();
        assert_eq!(result.lines[0].employee_premi, Decimal::from(1000));
        assert_eq!(result.lines[1].employee_premi, Decimal::from(500));
        assert_eq!(result.estate_premi, Decimal::from(1125));
    }

    #[test]
    fn inverted_period_is_rejected() {
        let input = monthly(json!({
            "period": {"start": "2024-05-01", "end": "2024-04-30"},
            "estate_multiplier": 100,
            "lines": [{
                "employee_id": 1, "employee_start": null,
                "actual_harvest": 1, "planned_optimal": 1, "planned_maximum": 1,
                "premi_optimal": 1, "premi_maximum": 1, "harvest_quality": 0, "multiplier": 100
            }]
        }));
        assert!(monthly_premi(&input).is_err());
    }

    #[test]
    fn negative_multiplier_fails_validation() {
        let input: DailyPremiInput = serde_json::from_value(json!({
            "employee_id": 3,
            "date": "2024-04-02",
            "role": "foreman",
            "multiplier": -5
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }
}
