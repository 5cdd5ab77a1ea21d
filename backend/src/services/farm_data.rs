//! Farm master data and planned operations listed to the mobile app
//!
//! Every listing is paginated and limited to active rows of the caller's
//! company, or rows shared by all companies where the table allows it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use shared::{HarvestLabourRecord, OperationState, Pagination, UpkeepLabourRecord};

use crate::error::AppResult;

#[derive(Clone)]
pub struct FarmDataService {
    db: PgPool,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EmployeeItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub employee_type: String,
    pub position: String,
    pub department: i64,
    pub company_id: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct FarmPartnerItem {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EstateItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub company_id: i64,
    pub partner_id: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AfdelingItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub estate_id: i64,
    pub partner_id: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BlockItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub afdeling_id: i64,
    pub harvest_uom: String,
    pub other_uom: String,
    pub planting_state: String,
    pub planting_year: String,
}

#[derive(Debug, Serialize)]
pub struct ProductCategoryItem {
    pub category_id: i64,
    pub parent_category_id: String,
    pub original_category_name: String,
    pub display_category_name: String,
    pub has_child: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductCategoryRow {
    id: i64,
    name: String,
    parent_name: Option<String>,
    has_child: bool,
}

impl From<ProductCategoryRow> for ProductCategoryItem {
    fn from(row: ProductCategoryRow) -> Self {
        let display_category_name = match &row.parent_name {
            Some(parent) => format!("{} / {}", parent, row.name),
            None => row.name.clone(),
        };
        ProductCategoryItem {
            category_id: row.id,
            parent_category_id: row.parent_name.unwrap_or_default(),
            original_category_name: row.name,
            display_category_name,
            has_child: row.has_child,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ProductItem {
    pub item_id: i64,
    pub item_code: String,
    pub item_name: String,
    pub item_display_name: String,
    pub category_id: i64,
    pub description: String,
    pub uom: String,
    pub saleable: bool,
    pub purchaseable: bool,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PenaltyItem {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ActivityItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub operation_type_id: i64,
    pub operation_type_name: String,
    pub uom_name: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TeamItem {
    pub id: i64,
    pub name: String,
    pub manager_id: i64,
    pub foreman_id: i64,
    pub clerk_id: i64,
    pub assistant_id: i64,
    pub recorder_id: i64,
    pub labour_ids: Vec<i64>,
}

/// Mobile user; credentials are never listed
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserItem {
    pub id: i64,
    pub name: String,
    pub login: String,
    pub email: String,
    pub allowed_menu: Vec<String>,
    pub employee_id: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OperationTypeItem {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub type_operation: String,
}

/// Which planned operations a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningKind {
    Harvest,
    Upkeep,
}

/// A confirmed plan assigned to the caller, with the workers it expects
#[derive(Debug, Serialize)]
pub struct PlannedOperation {
    pub id: i64,
    pub name: String,
    pub operation_date: String,
    pub planning_date: String,
    pub state: String,
    pub type_id: i64,
    pub afdeling_id: i64,
    pub activity_id: i64,
    pub team_id: i64,
    pub foreman_id: i64,
    pub foreman_extra_id: i64,
    pub clerk_id: i64,
    pub assistant_id: i64,
    pub recorder_id: i64,
    pub assigned_to: Vec<i64>,
    pub member_ids: Vec<PlannedMember>,
}

#[derive(Debug, Serialize)]
pub struct PlannedMember {
    pub id: i64,
    pub name: String,
    pub member_id: i64,
    pub block_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tph_code: Option<String>,
    pub planning_qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workday: Option<Decimal>,
}

#[derive(Debug, sqlx::FromRow)]
struct PlannedRow {
    id: i64,
    name: String,
    operation_date: NaiveDate,
    planning_date: Option<NaiveDate>,
    state: String,
    operation_type_id: i64,
    afdeling_id: i64,
    activity_id: Option<i64>,
    team_id: Option<i64>,
    foreman_id: Option<i64>,
    foreman_extra_id: Option<i64>,
    clerk_id: Option<i64>,
    assistant_id: Option<i64>,
    recorder_id: Option<i64>,
    assigned_to: Vec<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct PlannedMemberRow {
    id: i64,
    operation_id: i64,
    worker_id: i64,
    block_id: i64,
    operation_date: NaiveDate,
    tph_code: Option<String>,
    planning_qty: Decimal,
    num_of_days: Option<Decimal>,
    code: Option<String>,
    block_code: String,
}

/// Plan dates as the mobile app shows them
pub fn planning_day(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

impl PlannedMemberRow {
    fn into_member(self, kind: PlanningKind) -> PlannedMember {
        match kind {
            PlanningKind::Harvest => {
                let record = HarvestLabourRecord::new(
                    self.id,
                    self.operation_id,
                    self.worker_id,
                    self.block_id,
                    self.operation_date,
                    0,
                );
                PlannedMember {
                    id: self.id,
                    name: record.display_name(self.code.as_deref(), &self.block_code),
                    member_id: self.worker_id,
                    block_id: self.block_id,
                    tph_code: Some(self.tph_code.unwrap_or_default()),
                    planning_qty: self.planning_qty,
                    workday: None,
                }
            }
            PlanningKind::Upkeep => {
                let record = UpkeepLabourRecord::new(
                    self.id,
                    self.operation_id,
                    self.worker_id,
                    self.block_id,
                    0,
                    self.operation_date,
                );
                let workday = self
                    .num_of_days
                    .filter(|d| !d.is_zero())
                    .unwrap_or(Decimal::ONE);
                PlannedMember {
                    id: self.id,
                    name: record.display_name(self.code.as_deref(), Some(&self.block_code)),
                    member_id: self.worker_id,
                    block_id: self.block_id,
                    tph_code: None,
                    planning_qty: self.planning_qty,
                    workday: Some(workday),
                }
            }
        }
    }
}

impl PlannedRow {
    fn into_operation(self, member_ids: Vec<PlannedMember>) -> PlannedOperation {
        let state = OperationState::parse(&self.state)
            .map(|s| s.label().to_string())
            .unwrap_or(self.state);
        PlannedOperation {
            id: self.id,
            name: self.name,
            operation_date: planning_day(self.operation_date),
            planning_date: self.planning_date.map(planning_day).unwrap_or_default(),
            state,
            type_id: self.operation_type_id,
            afdeling_id: self.afdeling_id,
            activity_id: self.activity_id.unwrap_or(0),
            team_id: self.team_id.unwrap_or(0),
            foreman_id: self.foreman_id.unwrap_or(0),
            foreman_extra_id: self.foreman_extra_id.unwrap_or(0),
            clerk_id: self.clerk_id.unwrap_or(0),
            assistant_id: self.assistant_id.unwrap_or(0),
            recorder_id: self.recorder_id.unwrap_or(0),
            assigned_to: self.assigned_to,
            member_ids,
        }
    }
}

const HARVEST_PLANS: &str = r#"
    SELECT id, name, operation_date, planning_date, state, operation_type_id, afdeling_id,
           NULL::BIGINT AS activity_id, team_id, foreman_id, foreman_extra_id, clerk_id,
           assistant_id, recorder_id, assigned_to
    FROM harvest_operations
"#;

const UPKEEP_PLANS: &str = r#"
    SELECT id, name, operation_date, planning_date, state, operation_type_id, afdeling_id,
           activity_id, team_id, foreman_id, foreman_extra_id, NULL::BIGINT AS clerk_id,
           assistant_id, recorder_id, assigned_to
    FROM upkeep_operations
"#;

const HARVEST_MEMBERS: &str = r#"
    SELECT r.id, r.operation_id, r.worker_id, r.block_id, r.operation_date, r.tph_code,
           r.planning_qty, NULL::NUMERIC AS num_of_days, p.code, b.code AS block_code
    FROM harvest_records r
    JOIN blocks b ON b.id = r.block_id
    JOIN harvest_operations o ON o.id = r.operation_id
    LEFT JOIN products p ON p.id = o.product_id
    WHERE r.operation_id = ANY($1) AND r.active
    ORDER BY r.id
"#;

const UPKEEP_MEMBERS: &str = r#"
    SELECT r.id, r.operation_id, r.worker_id, r.block_id, r.operation_date,
           NULL::TEXT AS tph_code, r.planning_qty, r.num_of_days, a.code,
           b.code AS block_code
    FROM upkeep_records r
    JOIN blocks b ON b.id = r.block_id
    LEFT JOIN activities a ON a.id = r.activity_id
    WHERE r.operation_id = ANY($1)
    ORDER BY r.id
"#;

impl FarmDataService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active field workers
    pub async fn employees(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<EmployeeItem>> {
        let items = sqlx::query_as::<_, EmployeeItem>(
            r#"
            SELECT id, name, COALESCE(code, '') AS code, employee_type,
                   COALESCE(position, '') AS position, COALESCE(department_id, 0) AS department,
                   company_id
            FROM workers
            WHERE active AND ($1::BIGINT IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    /// Partners flagged for farm use
    pub async fn partners(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<FarmPartnerItem>> {
        let items = sqlx::query_as::<_, FarmPartnerItem>(
            r#"
            SELECT id, name
            FROM partners
            WHERE farm_data AND active
              AND ($1::BIGINT IS NULL OR company_id IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn estates(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<EstateItem>> {
        let items = sqlx::query_as::<_, EstateItem>(
            r#"
            SELECT id, name, code, COALESCE(company_id, 0) AS company_id,
                   COALESCE(partner_id, 0) AS partner_id
            FROM estates
            WHERE location_type = 'estate' AND active
              AND ($1::BIGINT IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn afdelings(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<AfdelingItem>> {
        let items = sqlx::query_as::<_, AfdelingItem>(
            r#"
            SELECT a.id, COALESCE(e.name || ' / ', '') || a.name AS name, a.code,
                   COALESCE(a.parent_id, 0) AS estate_id, COALESCE(a.partner_id, 0) AS partner_id
            FROM estates a
            LEFT JOIN estates e ON e.id = a.parent_id
            WHERE a.location_type = 'afdeling' AND a.active
              AND ($1::BIGINT IS NULL OR a.company_id = $1)
            ORDER BY a.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    /// Blocks with the harvest units of their afdeling
    pub async fn blocks(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<BlockItem>> {
        let items = sqlx::query_as::<_, BlockItem>(
            r#"
            SELECT b.id, b.name, b.code, COALESCE(b.afdeling_id, 0) AS afdeling_id,
                   COALESCE(e.harvest_uom, '') AS harvest_uom,
                   COALESCE(e.other_uom, '') AS other_uom,
                   COALESCE(b.planting_state, '') AS planting_state,
                   COALESCE(b.planting_year::TEXT, '') AS planting_year
            FROM blocks b
            LEFT JOIN estates e ON e.id = b.afdeling_id
            WHERE b.active AND ($1::BIGINT IS NULL OR b.company_id = $1)
            ORDER BY b.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    /// Farm product categories; categories are shared by every company
    pub async fn product_categories(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Vec<ProductCategoryItem>> {
        let rows = sqlx::query_as::<_, ProductCategoryRow>(
            r#"
            SELECT c.id, c.name, p.name AS parent_name,
                   EXISTS (SELECT 1 FROM product_categories k WHERE k.parent_id = c.id) AS has_child
            FROM product_categories c
            LEFT JOIN product_categories p ON p.id = c.parent_id
            WHERE c.farm_data
            ORDER BY c.id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(ProductCategoryItem::from).collect())
    }

    pub async fn products(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<ProductItem>> {
        let items = sqlx::query_as::<_, ProductItem>(
            r#"
            SELECT id AS item_id, COALESCE(code, '') AS item_code, name AS item_name,
                   CASE WHEN code IS NULL THEN name ELSE '[' || code || '] ' || name END
                       AS item_display_name,
                   COALESCE(category_id, 0) AS category_id,
                   COALESCE(description, '') AS description, COALESCE(uom, '') AS uom,
                   sale_ok AS saleable, purchase_ok AS purchaseable
            FROM products
            WHERE farm_data AND active
              AND ($1::BIGINT IS NULL OR company_id IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn penalties(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<PenaltyItem>> {
        let items = sqlx::query_as::<_, PenaltyItem>(
            r#"
            SELECT id, name, COALESCE(code, '') AS code
            FROM penalty_types
            WHERE active AND ($1::BIGINT IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn activities(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<ActivityItem>> {
        let items = sqlx::query_as::<_, ActivityItem>(
            r#"
            SELECT a.id, a.name, COALESCE(a.code, '') AS code,
                   COALESCE(a.operation_type_id, 0) AS operation_type_id,
                   COALESCE(t.name, '') AS operation_type_name,
                   COALESCE(a.uom, '') AS uom_name
            FROM activities a
            LEFT JOIN operation_types t ON t.id = a.operation_type_id
            WHERE a.active AND ($1::BIGINT IS NULL OR a.company_id = $1)
            ORDER BY a.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn teams(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<TeamItem>> {
        let items = sqlx::query_as::<_, TeamItem>(
            r#"
            SELECT id, name, COALESCE(manager_id, 0) AS manager_id,
                   COALESCE(foreman_id, 0) AS foreman_id, COALESCE(clerk_id, 0) AS clerk_id,
                   COALESCE(assistant_id, 0) AS assistant_id,
                   COALESCE(recorder_id, 0) AS recorder_id, labour_ids
            FROM harvest_teams
            WHERE active AND ($1::BIGINT IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    pub async fn users(
        &self,
        company_id: Option<i64>,
        pagination: &Pagination,
    ) -> AppResult<Vec<UserItem>> {
        let items = sqlx::query_as::<_, UserItem>(
            r#"
            SELECT id, name, login, COALESCE(email, '') AS email, allowed_menu,
                   COALESCE(employee_id, 0) AS employee_id
            FROM mobile_users
            WHERE active AND ($1::BIGINT IS NULL OR company_id IS NULL OR company_id = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(company_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    /// Operation types are shared by every company
    pub async fn operation_types(
        &self,
        pagination: &Pagination,
    ) -> AppResult<Vec<OperationTypeItem>> {
        let items = sqlx::query_as::<_, OperationTypeItem>(
            r#"
            SELECT id, name, code, type_operation
            FROM operation_types
            WHERE active
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    /// Confirmed draft plans assigned to `assignee`, with their planned workers
    pub async fn planned_operations(
        &self,
        kind: PlanningKind,
        company_id: Option<i64>,
        assignee: i64,
        pagination: &Pagination,
    ) -> AppResult<Vec<PlannedOperation>> {
        let (plans, members) = match kind {
            PlanningKind::Harvest => (HARVEST_PLANS, HARVEST_MEMBERS),
            PlanningKind::Upkeep => (UPKEEP_PLANS, UPKEEP_MEMBERS),
        };

        let rows = sqlx::query_as::<_, PlannedRow>(&format!(
            r#"
            {}
            WHERE state = 'draft' AND is_planned AND planning_state = 'confirm'
              AND ($1::BIGINT IS NULL OR company_id = $1)
              AND $2 = ANY(assigned_to)
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
            plans
        ))
        .bind(company_id)
        .bind(assignee)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let member_rows = sqlx::query_as::<_, PlannedMemberRow>(members)
            .bind(&ids)
            .fetch_all(&self.db)
            .await?;

        let mut by_operation: BTreeMap<i64, Vec<PlannedMember>> = BTreeMap::new();
        for member in member_rows {
            by_operation
                .entry(member.operation_id)
                .or_default()
                .push(member.into_member(kind));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let member_ids = by_operation.remove(&row.id).unwrap_or_default();
                row.into_operation(member_ids)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_row(num_of_days: Option<Decimal>) -> PlannedMemberRow {
        PlannedMemberRow {
            id: 9,
            operation_id: 3,
            worker_id: 4,
            block_id: 2,
            operation_date: NaiveDate::from_ymd_opt(2024, 8, 9).unwrap(),
            tph_code: None,
            planning_qty: Decimal::from(40),
            num_of_days,
            code: Some("SPR".into()),
            block_code: "A01".into(),
        }
    }

    #[test]
    fn category_display_name_includes_parent() {
        let item = ProductCategoryItem::from(ProductCategoryRow {
            id: 5,
            name: "Pupuk".into(),
            parent_name: Some("Material".into()),
            has_child: false,
        });
        assert_eq!(item.display_category_name, "Material / Pupuk");
        assert_eq!(item.parent_category_id, "Material");

        let root = ProductCategoryItem::from(ProductCategoryRow {
            id: 1,
            name: "Material".into(),
            parent_name: None,
            has_child: true,
        });
        assert_eq!(root.display_category_name, "Material");
        assert_eq!(root.parent_category_id, "");
    }

    #[test]
    fn upkeep_members_default_to_one_workday() {
        let member = member_row(Some(Decimal::ZERO)).into_member(PlanningKind::Upkeep);
        assert_eq!(member.workday, Some(Decimal::ONE));
        assert_eq!(member.name, "SPR/A01/2024/08/09/9");
        assert!(member.tph_code.is_none());

        let json = serde_json::to_value(&member).unwrap();
        assert!(json.get("tph_code").is_none());
    }

    #[test]
    fn harvest_members_carry_collection_point() {
        let member = member_row(None).into_member(PlanningKind::Harvest);
        assert_eq!(member.tph_code.as_deref(), Some(""));
        assert!(member.workday.is_none());
        assert_eq!(member.planning_qty, Decimal::from(40));
    }

    #[test]
    fn plan_dates_use_slashes() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 9).unwrap();
        assert_eq!(planning_day(date), "2024/08/09");
    }

    #[test]
    fn users_never_carry_a_password() {
        let user = UserItem {
            id: 1,
            name: "Mandor".into(),
            login: "mandor1".into(),
            email: String::new(),
            allowed_menu: vec!["harvest".into()],
            employee_id: 4,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["allowed_menu"][0], "harvest");
    }
}
