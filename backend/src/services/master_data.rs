//! Master data: weighbridges, partners, quality types and company settings

use serde::Serialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};

use shared::{
    duplicate_partner_message, duplicate_weighbridge_message, validate_weighbridge_code,
    BatchOutcome, ItemResult, QualityCategory, RefId, RECORD_CREATED,
};

use crate::config::OperationSettings;
use crate::error::{AppError, AppResult};
use crate::services::unit_of_work::{begin_item, settle_item, ItemOutcome};

/// Master data service
#[derive(Clone)]
pub struct MasterDataService {
    db: PgPool,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct WeighbridgeItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub company_id: Option<i64>,
    pub partner_id: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PartnerItem {
    pub id: i64,
    pub active: bool,
    pub customer: bool,
    pub vendor: bool,
    pub name: String,
    pub contact_type: String,
    pub street: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Quality type as listed to mobile clients
#[derive(Debug, Serialize)]
pub struct QualityTypeItem {
    pub id: i64,
    pub name: String,
    pub categories: String,
    /// `%`, `kg` or `unit`
    pub calculation_type: String,
    pub remark: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct QualityTypeRow {
    id: i64,
    name: String,
    category: String,
    calculation_type: String,
    remark: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    auto_post_scale_ticket: bool,
    allow_update_scale_ticket: bool,
    scale_sequence_prefix: String,
}

/// Which quality types a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTypeFilter {
    Penalty,
    Return,
    Fraction,
}

impl QualityTypeFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "penalty" => Some(QualityTypeFilter::Penalty),
            "return" => Some(QualityTypeFilter::Return),
            "fraction" => Some(QualityTypeFilter::Fraction),
            _ => None,
        }
    }

    /// Penalty lists both quality and deduction categories
    pub fn categories(&self) -> Vec<&'static str> {
        match self {
            QualityTypeFilter::Penalty => vec![
                QualityCategory::Quality.as_str(),
                QualityCategory::Deduction.as_str(),
            ],
            QualityTypeFilter::Return => vec![QualityCategory::Return.as_str()],
            QualityTypeFilter::Fraction => vec![QualityCategory::Fraction.as_str()],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityTypeFilter::Penalty => "Penalty",
            QualityTypeFilter::Return => "Return",
            QualityTypeFilter::Fraction => "Fraction",
        }
    }
}

impl MasterDataService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Weighbridges shared by every company or owned by `company_id`
    pub async fn list_weighbridges(&self, company_id: Option<i64>) -> AppResult<Vec<WeighbridgeItem>> {
        let items = sqlx::query_as::<_, WeighbridgeItem>(
            r#"
            SELECT id, name, code, company_id, partner_id
            FROM weighbridges
            WHERE $1::BIGINT IS NULL OR company_id IS NULL OR company_id = $1
            ORDER BY id
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Partners, archived ones included
    pub async fn list_partners(&self, company_id: Option<i64>) -> AppResult<Vec<PartnerItem>> {
        let items = sqlx::query_as::<_, PartnerItem>(
            r#"
            SELECT id, active, is_customer AS customer, is_vendor AS vendor,
                   name, contact_type, street, phone, email
            FROM partners
            WHERE $1::BIGINT IS NULL OR company_id IS NULL OR company_id = $1
            ORDER BY id
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    pub async fn list_quality_types(&self, filter: QualityTypeFilter) -> AppResult<Vec<QualityTypeItem>> {
        let categories: Vec<String> = filter.categories().into_iter().map(String::from).collect();
        let rows = sqlx::query_as::<_, QualityTypeRow>(
            r#"
            SELECT id, name, category, calculation_type, remark
            FROM quality_types
            WHERE category = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&categories)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let calculation = shared::CalculationType::parse(&row.calculation_type)
                    .ok_or_else(|| {
                        AppError::CorruptRecord(format!(
                            "quality type {} has calculation type '{}'",
                            row.id, row.calculation_type
                        ))
                    })?;
                Ok(QualityTypeItem {
                    id: row.id,
                    name: row.name,
                    categories: row.category,
                    calculation_type: calculation.unit_label().to_string(),
                    remark: row.remark,
                })
            })
            .collect()
    }

    /// Operation switches of a company, falling back to the configured defaults
    pub async fn operation_settings(
        &self,
        company_id: Option<i64>,
        defaults: &OperationSettings,
    ) -> AppResult<OperationSettings> {
        let Some(company_id) = company_id else {
            return Ok(defaults.clone());
        };

        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT auto_post_scale_ticket, allow_update_scale_ticket, scale_sequence_prefix
            FROM company_settings
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(match row {
            Some(row) => OperationSettings {
                auto_post_scale_ticket: row.auto_post_scale_ticket,
                allow_update_scale_ticket: row.allow_update_scale_ticket,
                scale_sequence_prefix: row.scale_sequence_prefix,
            },
            None => defaults.clone(),
        })
    }

    /// Create weighbridges; a known code is reported with the existing id
    pub async fn create_weighbridges(
        &self,
        items: Vec<Value>,
        company_id: Option<i64>,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let name = text(item, "name");
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = create_weighbridge(&mut item_tx, item, company_id).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "weighbridge batch processed");
        Ok(())
    }

    /// Create partners; a known phone number is reported with the existing id
    pub async fn create_partners(
        &self,
        items: Vec<Value>,
        company_id: Option<i64>,
        batch: &mut BatchOutcome,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        for item in &items {
            let ref_id = RefId::from_json(item);
            let name = text(item, "name");
            let mut item_tx = begin_item(&mut tx).await?;
            let outcome = create_partner(&mut item_tx, item, company_id).await;
            settle_item(item_tx, outcome, batch, |message| {
                ItemResult::failed(None, name, ref_id, message)
            })
            .await?;
        }

        tx.commit().await?;
        tracing::info!(items = items.len(), status = batch.status(), "partner batch processed");
        Ok(())
    }
}

async fn create_weighbridge(
    conn: &mut PgConnection,
    item: &Value,
    company_id: Option<i64>,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let code = text(item, "code").unwrap_or_default();

    let existing = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, name FROM weighbridges WHERE code = $1 ORDER BY id LIMIT 1",
    )
    .bind(&code)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some((id, name)) = existing {
        return Ok(ItemOutcome::Rejected(ItemResult::failed(
            Some(id.into()),
            Some(name),
            ref_id,
            duplicate_weighbridge_message(&code, id),
        )));
    }

    validate_weighbridge_code(&code).map_err(|m| AppError::Validation {
        field: "code".to_string(),
        message: m.to_string(),
        message_id: "Kode jembatan timbang tidak valid".to_string(),
    })?;

    let name = text(item, "name").unwrap_or_default();
    let location_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO stock_locations (name) VALUES ($1) RETURNING id",
    )
    .bind(format!("WB/{}", code))
    .fetch_one(&mut *conn)
    .await?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO weighbridges (ref_id, name, code, company_id, partner_id, stock_location_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(ref_id.as_ref().map(RefId::to_string))
    .bind(&name)
    .bind(&code)
    .bind(company_id)
    .bind(item.get("partner_id").and_then(Value::as_i64))
    .bind(location_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ItemOutcome::Done(ItemResult::success(id, name, ref_id, RECORD_CREATED)))
}

async fn create_partner(
    conn: &mut PgConnection,
    item: &Value,
    company_id: Option<i64>,
) -> AppResult<ItemOutcome> {
    let ref_id = RefId::from_json(item);
    let phone = text(item, "phone");

    if let Some(phone) = phone.as_deref() {
        let existing = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, name FROM partners WHERE phone = $1 ORDER BY id LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some((id, name)) = existing {
            return Ok(ItemOutcome::Rejected(ItemResult::failed(
                Some(id.into()),
                Some(name),
                ref_id,
                duplicate_partner_message(phone, id),
            )));
        }
    }

    let name = text(item, "name").unwrap_or_default();
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO partners
            (ref_id, name, email, phone, contact_type, is_customer, is_vendor, street, company_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(ref_id.as_ref().map(RefId::to_string))
    .bind(&name)
    .bind(text(item, "email"))
    .bind(phone)
    .bind(text(item, "contact_type").unwrap_or_else(|| "external".to_string()))
    .bind(flag(item, "customer"))
    .bind(flag(item, "vendor"))
    .bind(text(item, "street"))
    .bind(company_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ItemOutcome::Done(ItemResult::success(id, name, ref_id, RECORD_CREATED)))
}

/// Non-empty string field
pub(crate) fn text(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn flag(item: &Value, key: &str) -> bool {
    item.get(key).and_then(Value::as_bool).unwrap_or(false)
}
