//! The scheduling catalog: the collections the roster application stores.

use crate::keypath::KeyPath;
use crate::schema::{CollectionDef, IndexDef, SchemaDef};

/// Version of [`scheduling_schema`].
pub const SCHEDULING_SCHEMA_VERSION: u32 = 5;

pub const ORGANIZATIONS: &str = "organizations";
pub const EMPLOYEES: &str = "employees";
pub const SHIFTS: &str = "shifts";
pub const IDENTIFIERS: &str = "identifiers";
pub const SCHEDULES: &str = "schedules";
pub const SHIFT_ORDERS: &str = "shiftOrders";

/// At most one eligibility row per employee/shift pair.
pub const IDENTIFIER_EMPLOYEE_SHIFT: &str = "employeeId_shiftId";
/// At most one schedule entry per employee per day.
pub const SCHEDULE_DATE_EMPLOYEE: &str = "date_employeeId";
/// At most one ordering per position/shift/department.
pub const SHIFT_ORDER_POSITION_SHIFT_DEPARTMENT: &str = "position_shiftCode_department";

/// The five collections declared at open time.
pub fn scheduling_schema() -> SchemaDef {
    SchemaDef::new(SCHEDULING_SCHEMA_VERSION)
        .with_collection(
            CollectionDef::new(ORGANIZATIONS)
                .with_index(IndexDef::unique_on("name"))
                .with_index(IndexDef::unique_on("code"))
                .with_index(IndexDef::on("status")),
        )
        .with_collection(
            CollectionDef::new(EMPLOYEES)
                .with_index(IndexDef::unique_on("number"))
                .with_index(IndexDef::on("name"))
                .with_index(IndexDef::on("organizationId"))
                .with_index(IndexDef::on("deptId"))
                .with_index(IndexDef::on("status")),
        )
        .with_collection(
            CollectionDef::new(SHIFTS)
                .with_index(IndexDef::unique_on("code"))
                .with_index(IndexDef::on("name"))
                .with_index(IndexDef::on("status")),
        )
        .with_collection(
            CollectionDef::new(IDENTIFIERS)
                .with_index(IndexDef::on("employeeId"))
                .with_index(IndexDef::on("shiftId"))
                .with_index(IndexDef::unique(
                    IDENTIFIER_EMPLOYEE_SHIFT,
                    KeyPath::composite(["employeeId", "shiftId"]),
                )),
        )
        .with_collection(
            CollectionDef::new(SCHEDULES)
                .with_index(IndexDef::on("date"))
                .with_index(IndexDef::on("employeeId"))
                .with_index(IndexDef::on("shiftId"))
                .with_index(IndexDef::on("status"))
                .with_index(IndexDef::unique(
                    SCHEDULE_DATE_EMPLOYEE,
                    KeyPath::composite(["date", "employeeId"]),
                )),
        )
}

/// The shift-order collection, created on demand rather than at open time.
pub fn shift_orders_collection() -> CollectionDef {
    CollectionDef::new(SHIFT_ORDERS)
        .with_index(IndexDef::on("position"))
        .with_index(IndexDef::on("shiftCode"))
        .with_index(IndexDef::unique(
            SHIFT_ORDER_POSITION_SHIFT_DEPARTMENT,
            KeyPath::composite(["position", "shiftCode", "department"]),
        ))
}
