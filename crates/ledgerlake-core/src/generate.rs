//! Generators that shape one day of trusted partitions into cumulative-table rows.

use std::collections::{BTreeMap, HashMap, HashSet};

use time::{Date, PrimitiveDateTime};
use tracing::debug;

use crate::dedupe::{dedupe, DuplicatePolicy};
use crate::error::PipelineError;
use crate::record::{KeyValue, RecordSet, Value};
use crate::registry::{DEPOSIT, EVENT, FACT_USER_LEVEL, USER_ID, WITHDRAWAL};
use crate::schema::Schema;
use crate::timestamp::format_date;

/// Event names counted as logins by the daily snapshot.
pub const LOGIN_EVENTS: [&str; 3] = ["login", "2falogin", "login_api"];

/// Event name that advances a user's `last_login`.
pub const DIMENSION_LOGIN_EVENT: &str = "login";

/// Trusted partitions of every source table for one date. `None` marks an
/// absent partition, which generators treat as empty.
#[derive(Debug, Clone, Default)]
pub struct DailyPartitions {
    pub user_id: Option<RecordSet>,
    pub deposit: Option<RecordSet>,
    pub withdrawal: Option<RecordSet>,
    pub event: Option<RecordSet>,
    pub user_level: Option<RecordSet>,
}

/// Latest `login` per user present in the day's user partition.
/// Users without a login that day produce no row.
pub fn dim_user(partitions: &DailyPartitions) -> Result<RecordSet, PipelineError> {
    let mut output = RecordSet::new(["user_id", "last_login"]);
    let Some(users) = &partitions.user_id else {
        return Ok(output);
    };
    let user_index = users.require_column(USER_ID, "user_id")?;

    let mut latest: HashMap<KeyValue, PrimitiveDateTime> = HashMap::new();
    if let Some(events) = &partitions.event {
        let event_user = events.require_column(EVENT, "user_id")?;
        let event_name = events.require_column(EVENT, "event_name")?;
        let event_at = events.require_column(EVENT, "event_timestamp")?;

        for row in events.rows() {
            if row[event_name].as_str() != Some(DIMENSION_LOGIN_EVENT) {
                continue;
            }
            let Some(at) = row[event_at].as_timestamp() else {
                continue;
            };
            latest
                .entry(row[event_user].to_key())
                .and_modify(|current| *current = (*current).max(at))
                .or_insert(at);
        }
    }

    let mut seen = HashSet::new();
    for row in users.rows() {
        let key = row[user_index].to_key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if let Some(at) = latest.get(&key) {
            output.push_row(vec![row[user_index].clone(), Value::Timestamp(*at)])?;
        }
    }

    Ok(output)
}

/// The day's trusted partition shaped to `schema`, or an empty table.
pub fn passthrough(trusted: Option<&RecordSet>, schema: &Schema) -> RecordSet {
    let columns: Vec<&str> = schema.names().collect();
    match trusted {
        Some(records) => records.project(&columns),
        None => RecordSet::empty(schema),
    }
}

/// Most recent level per `(user_id, jurisdiction)`; the later row wins equal timestamps.
pub fn latest_user_levels(
    partitions: &DailyPartitions,
    schema: &Schema,
) -> Result<RecordSet, PipelineError> {
    let Some(levels) = &partitions.user_level else {
        return Ok(RecordSet::empty(schema));
    };

    let columns: Vec<&str> = schema.names().collect();
    dedupe(
        levels.project(&columns),
        &["user_id", "jurisdiction"],
        &DuplicatePolicy::KeepGreatest("event_timestamp".to_owned()),
    )
}

/// Per-user counts of deposits, withdrawals and logins on `date`.
///
/// The user base is the day's user partition. Users with no activity at all
/// are dropped unless `retain_idle` is set.
pub fn daily_snapshot(
    date: Date,
    partitions: &DailyPartitions,
    retain_idle: bool,
) -> Result<RecordSet, PipelineError> {
    let mut output = RecordSet::new([
        "user_id",
        "date",
        "qty_deposits",
        "qty_withdrawals",
        "qty_logins",
        "is_active",
    ]);
    let Some(users) = &partitions.user_id else {
        return Ok(output);
    };
    let user_index = users.require_column(USER_ID, "user_id")?;

    let deposits = count_by_user(partitions.deposit.as_ref(), DEPOSIT, date, |_| true)?;
    let withdrawals = count_by_user(partitions.withdrawal.as_ref(), WITHDRAWAL, date, |_| true)?;
    let logins = match &partitions.event {
        Some(events) => {
            let name_index = events.require_column(EVENT, "event_name")?;
            count_by_user(Some(events), EVENT, date, |row| {
                row[name_index]
                    .as_str()
                    .is_some_and(|name| LOGIN_EVENTS.iter().any(|login| *login == name))
            })?
        }
        None => HashMap::new(),
    };

    let snapshot_date = Value::Timestamp(date.midnight());
    let mut seen = HashSet::new();
    let mut idle = 0_usize;
    for row in users.rows() {
        let key = row[user_index].to_key();
        if !seen.insert(key.clone()) {
            continue;
        }

        let qty_deposits = deposits.get(&key).copied().unwrap_or(0);
        let qty_withdrawals = withdrawals.get(&key).copied().unwrap_or(0);
        let qty_logins = logins.get(&key).copied().unwrap_or(0);
        if qty_deposits == 0 && qty_withdrawals == 0 && qty_logins == 0 && !retain_idle {
            idle += 1;
            continue;
        }

        output.push_row(vec![
            row[user_index].clone(),
            snapshot_date.clone(),
            Value::Integer(qty_deposits),
            Value::Integer(qty_withdrawals),
            Value::Integer(qty_logins),
            Value::Boolean(qty_deposits > 0 || qty_withdrawals > 0),
        ])?;
    }

    debug!(
        date = %format_date(date),
        emitted = output.len(),
        idle_dropped = idle,
        "daily snapshot generated"
    );
    Ok(output)
}

#[derive(Debug)]
struct StatsBucket {
    level: Value,
    jurisdiction: Value,
    currency: Value,
    deposit_amount: f64,
    withdrawal_amount: f64,
    deposit_users: HashSet<KeyValue>,
    withdrawal_users: HashSet<KeyValue>,
}

/// Deposit and withdrawal rollup per `(level, jurisdiction, currency)` on `date`.
///
/// `levels` is the full cumulative user-level table. Each user's level per
/// jurisdiction is the most recent observation at or before `date`; activity
/// by users with no known level is not counted.
pub fn daily_stats(
    date: Date,
    levels: Option<&RecordSet>,
    partitions: &DailyPartitions,
) -> Result<RecordSet, PipelineError> {
    let mut output = RecordSet::new([
        "date",
        "currency",
        "level",
        "jurisdiction",
        "total_active_users",
        "total_distinct_withdrawal_users",
        "total_distinct_deposit_users",
        "total_withdrawal_amount",
        "total_deposit_amount",
    ]);
    let Some(levels) = levels else {
        return Ok(output);
    };
    let memberships = levels_as_of(levels, date)?;

    let mut buckets: BTreeMap<(KeyValue, KeyValue, KeyValue), StatsBucket> = BTreeMap::new();
    let mut active: HashMap<(KeyValue, KeyValue), HashSet<KeyValue>> = HashMap::new();

    for (records, table, is_deposit) in [
        (partitions.deposit.as_ref(), DEPOSIT, true),
        (partitions.withdrawal.as_ref(), WITHDRAWAL, false),
    ] {
        let Some(records) = records else {
            continue;
        };
        let user_index = records.require_column(table, "user_id")?;
        let at_index = records.require_column(table, "event_timestamp")?;
        let amount_index = records.require_column(table, "amount")?;
        let currency_index = records.require_column(table, "currency")?;

        for row in records.rows() {
            if row[at_index].as_timestamp().map(|at| at.date()) != Some(date) {
                continue;
            }
            let user = row[user_index].to_key();
            let Some(user_levels) = memberships.get(&user) else {
                continue;
            };
            let amount = row[amount_index].as_f64().unwrap_or(0.0);
            let currency = &row[currency_index];

            for (jurisdiction, level) in user_levels {
                let bucket = buckets
                    .entry((level.to_key(), jurisdiction.to_key(), currency.to_key()))
                    .or_insert_with(|| StatsBucket {
                        level: level.clone(),
                        jurisdiction: jurisdiction.clone(),
                        currency: currency.clone(),
                        deposit_amount: 0.0,
                        withdrawal_amount: 0.0,
                        deposit_users: HashSet::new(),
                        withdrawal_users: HashSet::new(),
                    });
                if is_deposit {
                    bucket.deposit_amount += amount;
                    bucket.deposit_users.insert(user.clone());
                } else {
                    bucket.withdrawal_amount += amount;
                    bucket.withdrawal_users.insert(user.clone());
                }
                active
                    .entry((level.to_key(), jurisdiction.to_key()))
                    .or_default()
                    .insert(user.clone());
            }
        }
    }

    let stats_date = Value::Timestamp(date.midnight());
    for ((level_key, jurisdiction_key, _), bucket) in buckets {
        let active_users = active
            .get(&(level_key, jurisdiction_key))
            .map_or(0, HashSet::len);
        let measures_zero = active_users == 0
            && bucket.deposit_users.is_empty()
            && bucket.withdrawal_users.is_empty()
            && bucket.deposit_amount == 0.0
            && bucket.withdrawal_amount == 0.0;
        if measures_zero {
            continue;
        }

        output.push_row(vec![
            stats_date.clone(),
            bucket.currency,
            bucket.level,
            bucket.jurisdiction,
            Value::Integer(count(active_users)),
            Value::Integer(count(bucket.withdrawal_users.len())),
            Value::Integer(count(bucket.deposit_users.len())),
            Value::Decimal(bucket.withdrawal_amount),
            Value::Decimal(bucket.deposit_amount),
        ])?;
    }

    Ok(output)
}

/// For each user, the `(jurisdiction, level)` pairs in force at the end of `date`.
fn levels_as_of(
    levels: &RecordSet,
    date: Date,
) -> Result<HashMap<KeyValue, Vec<(Value, Value)>>, PipelineError> {
    let user_index = levels.require_column(FACT_USER_LEVEL, "user_id")?;
    let jurisdiction_index = levels.require_column(FACT_USER_LEVEL, "jurisdiction")?;
    let level_index = levels.require_column(FACT_USER_LEVEL, "level")?;
    let at_index = levels.require_column(FACT_USER_LEVEL, "event_timestamp")?;

    let mut latest: HashMap<(KeyValue, KeyValue), (PrimitiveDateTime, usize)> = HashMap::new();
    for (position, row) in levels.rows().iter().enumerate() {
        let Some(at) = row[at_index].as_timestamp() else {
            continue;
        };
        if at.date() > date {
            continue;
        }
        let key = (row[user_index].to_key(), row[jurisdiction_index].to_key());
        let current = latest.entry(key).or_insert((at, position));
        if at >= current.0 {
            *current = (at, position);
        }
    }

    let mut positions: Vec<usize> = latest.into_values().map(|(_, position)| position).collect();
    positions.sort_unstable();

    let mut memberships: HashMap<KeyValue, Vec<(Value, Value)>> = HashMap::new();
    for position in positions {
        let row = &levels.rows()[position];
        memberships
            .entry(row[user_index].to_key())
            .or_default()
            .push((row[jurisdiction_index].clone(), row[level_index].clone()));
    }
    Ok(memberships)
}

fn count_by_user(
    records: Option<&RecordSet>,
    table: &str,
    date: Date,
    include: impl Fn(&[Value]) -> bool,
) -> Result<HashMap<KeyValue, i64>, PipelineError> {
    let mut counts = HashMap::new();
    let Some(records) = records else {
        return Ok(counts);
    };
    let user_index = records.require_column(table, "user_id")?;
    let at_index = records.require_column(table, "event_timestamp")?;

    for row in records.rows() {
        if row[at_index].as_timestamp().map(|at| at.date()) != Some(date) || !include(row) {
            continue;
        }
        *counts.entry(row[user_index].to_key()).or_insert(0) += 1;
    }
    Ok(counts)
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
