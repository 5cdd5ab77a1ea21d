//! Estate block models

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A planted block inside an afdeling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstateBlock {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub afdeling_id: Option<i64>,
    pub company_id: Option<i64>,
}

/// Average bunch weight sample for a block (BJR).
///
/// One entry per weighing of harvested units; the weight per unit is the
/// ratio between the weighed quantity and the unit count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AverageWeight {
    pub id: i64,
    pub block_id: i64,
    pub harvesting_date: NaiveDate,
    pub harvest_qty: Decimal,
    pub harvest_uom_qty: Decimal,
}

impl AverageWeight {
    /// Weight per harvested unit; zero when no units were counted
    pub fn weight_per_unit(&self) -> Decimal {
        if self.harvest_qty.is_zero() {
            Decimal::ZERO
        } else {
            self.harvest_uom_qty / self.harvest_qty
        }
    }
}

/// Most recent average weight for `block_id` sampled in `year`.
///
/// Returns zero when the block has no sample for that year.
pub fn block_average_weight(samples: &[AverageWeight], block_id: i64, year: i32) -> Decimal {
    samples
        .iter()
        .filter(|s| s.block_id == block_id && s.harvesting_date.year() == year)
        .max_by(|a, b| {
            a.harvesting_date
                .cmp(&b.harvesting_date)
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(AverageWeight::weight_per_unit)
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64, date: (i32, u32, u32), qty: i64, uom: i64) -> AverageWeight {
        AverageWeight {
            id,
            block_id: 7,
            harvesting_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            harvest_qty: Decimal::from(qty),
            harvest_uom_qty: Decimal::from(uom),
        }
    }

    #[test]
    fn picks_latest_sample_of_the_year() {
        let samples = vec![
            sample(1, (2024, 1, 10), 10, 150),
            sample(2, (2024, 6, 1), 10, 200),
            sample(3, (2025, 1, 1), 10, 300),
        ];
        assert_eq!(block_average_weight(&samples, 7, 2024), Decimal::from(20));
        assert_eq!(block_average_weight(&samples, 7, 2025), Decimal::from(30));
        assert_eq!(block_average_weight(&samples, 7, 2023), Decimal::ZERO);
    }

    #[test]
    fn zero_units_yield_zero_weight() {
        let s = sample(1, (2024, 1, 1), 0, 100);
        assert_eq!(s.weight_per_unit(), Decimal::ZERO);
    }
}
