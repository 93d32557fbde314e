//! Reporting views over the cumulative tables.

use ::duckdb::Connection;

/// Create the reporting views:
/// - `vw_daily_active_users`: active users and activity totals per snapshot date
/// - `vw_level_totals`: deposit and withdrawal totals per date and level, all currencies summed
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_daily_active_users AS
SELECT
    CAST(date AS DATE) AS date,
    COUNT(*) FILTER (WHERE is_active) AS active_users,
    SUM(qty_deposits)::BIGINT AS deposits,
    SUM(qty_withdrawals)::BIGINT AS withdrawals,
    SUM(qty_logins)::BIGINT AS logins
FROM fact_user_daily_snapshot
GROUP BY CAST(date AS DATE);

CREATE OR REPLACE VIEW vw_level_totals AS
SELECT
    CAST(date AS DATE) AS date,
    level,
    SUM(total_deposit_amount)::DOUBLE AS deposit_amount,
    SUM(total_withdrawal_amount)::DOUBLE AS withdrawal_amount,
    SUM(total_distinct_deposit_users)::BIGINT AS deposit_users,
    SUM(total_distinct_withdrawal_users)::BIGINT AS withdrawal_users
FROM fact_daily_stats
GROUP BY CAST(date AS DATE), level;
",
    )
}
