//! Shared fixtures for the behavior tests: a two-day landing set and helpers
//! that extract, clean and load it.

use std::fs;
use std::path::Path;

use ledgerlake_core::registry::{DEPOSIT, EVENT, USER_ID, USER_LEVEL, WITHDRAWAL};
use ledgerlake_core::{Cleaner, LoadReport, Loader, RecordSet, Registry, TableStore, Value};
use ledgerlake_warehouse::{replicate_daily, split_by_event_date, DateRange, LakeStore};
use time::macros::date;
use time::Date;

pub const DAY_ONE: Date = date!(2023 - 01 - 01);
pub const DAY_TWO: Date = date!(2023 - 01 - 02);

pub const USER_ID_LANDING: &str = "user_id\nu1\nu2\nu3\n";

pub const DEPOSIT_LANDING: &str = "\
id,event_timestamp,user_id,amount,currency,tx_status
1,2023-01-01 09:00:00,u1,100.0,USD,complete
2,2023-01-01 10:00:00,u2,50.0,USD,complete
3,2023-01-02 09:30:00,u1,25.0,USD,complete
3,2023-01-02 09:30:00,u1,25.0,USD,complete
4,2023-01-02 12:00:00,,10.0,USD,complete
";

pub const WITHDRAWAL_LANDING: &str = "\
id,event_timestamp,user_id,amount,interface,currency,tx_status
1,2023-01-02 15:00:00,u2,20.0,web,USD,complete
";

pub const EVENT_LANDING: &str = "\
id,event_timestamp,user_id,event_name
1,2023-01-01 08:00:00,u1,login
2,2023-01-01 08:30:00,u3,2falogin
3,2023-01-02 07:00:00,u1,login
4,2023-01-02 07:05:00,u2,login_api
";

pub const USER_LEVEL_LANDING: &str = "\
user_id,jurisdiction,level,event_timestamp
u1,us,1,2023-01-01 00:00:00
u2,us,2,2023-01-01 00:00:00
u1,us,2,2023-01-02 06:00:00
";

/// Write the landing files under `landing_dir` and extract them into `lake`
/// for both fixture days.
pub fn extract_fixture(landing_dir: &Path, lake: &LakeStore) {
    fs::create_dir_all(landing_dir).expect("landing dir");
    for (table, body) in [
        (DEPOSIT, DEPOSIT_LANDING),
        (WITHDRAWAL, WITHDRAWAL_LANDING),
        (EVENT, EVENT_LANDING),
        (USER_LEVEL, USER_LEVEL_LANDING),
    ] {
        let path = landing_dir.join(format!("{table}.csv"));
        fs::write(&path, body).expect("write landing");
        split_by_event_date(&path, table, DateRange::default(), lake).expect("split landing");
    }

    let users = landing_dir.join("user_id.csv");
    fs::write(&users, USER_ID_LANDING).expect("write landing");
    replicate_daily(&users, USER_ID, DAY_ONE, DAY_TWO, lake).expect("replicate users");
}

/// Clean every source table for `date` and load it into `tables`.
pub fn clean_and_load(
    lake: &LakeStore,
    tables: &dyn TableStore,
    registry: &Registry,
    date: Date,
) -> LoadReport {
    Cleaner::new(lake, registry)
        .clean_all(date)
        .expect("clean day");
    Loader::new(lake, tables, registry)
        .load(date)
        .expect("load day")
}

/// Read a cumulative table that must exist.
pub fn cumulative(tables: &dyn TableStore, registry: &Registry, name: &str) -> RecordSet {
    let spec = registry.get(name).expect("known table");
    tables
        .read(spec)
        .expect("read cumulative table")
        .unwrap_or_else(|| panic!("{name} was never written"))
}

/// Every row of `records` rendered as canonical cell text.
pub fn rendered(records: &RecordSet) -> Vec<Vec<String>> {
    records
        .rows()
        .iter()
        .map(|row| row.iter().map(Value::render).collect())
        .collect()
}

/// Like [`rendered`], sorted so assertions do not depend on merge order.
pub fn rendered_sorted(records: &RecordSet) -> Vec<Vec<String>> {
    let mut rows = rendered(records);
    rows.sort();
    rows
}

pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|cell| (*cell).to_owned()).collect()
}
