//! Typed lookups over the scheduling catalog.

use serde_json::{json, Value};

use roster_core::catalog::{
    IDENTIFIERS, IDENTIFIER_EMPLOYEE_SHIFT, SCHEDULES, SCHEDULE_DATE_EMPLOYEE, SHIFT_ORDERS,
    SHIFT_ORDER_POSITION_SHIFT_DEPARTMENT,
};
use roster_core::{shift_orders_collection, Record};

use crate::error::StoreError;
use crate::handle::Store;

/// The first record of a lookup through a unique index.
fn single(mut records: Vec<Record>) -> Option<Record> {
    if records.is_empty() {
        None
    } else {
        Some(records.swap_remove(0))
    }
}

impl Store {
    /// The eligibility row for one employee/shift pair, if any.
    pub async fn identifier_for(
        &self,
        employee_id: i64,
        shift_id: i64,
    ) -> Result<Option<Record>, StoreError> {
        let records = self
            .get_by_index(IDENTIFIERS, IDENTIFIER_EMPLOYEE_SHIFT, &json!([employee_id, shift_id]))
            .await?;
        Ok(single(records))
    }

    /// Every eligibility row of the given employees, each row once.
    pub async fn identifiers_for_employees(
        &self,
        employee_ids: &[i64],
    ) -> Result<Vec<Record>, StoreError> {
        let values: Vec<Value> = employee_ids.iter().map(|id| json!(id)).collect();
        self.get_many_by_index(IDENTIFIERS, "employeeId", &values).await
    }

    pub async fn identifiers_for_shift(&self, shift_id: i64) -> Result<Vec<Record>, StoreError> {
        self.get_by_index(IDENTIFIERS, "shiftId", &json!(shift_id))
            .await
    }

    /// The schedule entry of one employee on one day (`YYYY-MM-DD`).
    pub async fn schedule_for(
        &self,
        date: &str,
        employee_id: i64,
    ) -> Result<Option<Record>, StoreError> {
        let records = self
            .get_by_index(SCHEDULES, SCHEDULE_DATE_EMPLOYEE, &json!([date, employee_id]))
            .await?;
        Ok(single(records))
    }

    /// Creates the shift-order collection if it does not exist yet.
    pub async fn ensure_shift_orders(&self) -> Result<bool, StoreError> {
        let created = self.ensure_collection(&shift_orders_collection()).await?;
        if created {
            tracing::info!(collection = SHIFT_ORDERS, "created on demand");
        }
        Ok(created)
    }

    pub async fn shift_order_for(
        &self,
        position: &str,
        shift_code: &str,
        department: &str,
    ) -> Result<Option<Record>, StoreError> {
        let records = self
            .get_by_index(
                SHIFT_ORDERS,
                SHIFT_ORDER_POSITION_SHIFT_DEPARTMENT,
                &json!([position, shift_code, department]),
            )
            .await?;
        Ok(single(records))
    }
}
