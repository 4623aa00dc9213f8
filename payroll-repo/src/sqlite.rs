//! SQLite repository adapter.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use payroll_types::{
    ApiKey, ApiKeyStore, DomainError, Employee, EmployeeDirectory, EmployeeId,
    GeneratePayrollRequest, LifecycleAction, PayRecurrence, PayrollFilter, PayrollId, PayrollLine,
    PayrollPage, PayrollPeriod, PayrollRepository, PayrollSnapshot, RecurrenceId, RecurrenceKind,
    RepoError, Role,
};
use payroll_types::domain::guard;

use crate::security;
use crate::types::sqlite::{DbApiKey, DbEmployee, DbPayroll, DbPayrollLine, DbRecurrence};
use crate::types::{db_err, format_date, format_timestamp, parse_id, tx_err, write_err};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

const MIGRATIONS: [(&str, &str); 3] = [
    (
        "0001",
        include_str!("../migrations/0001_create_master_data.sql"),
    ),
    ("0002", include_str!("../migrations/0002_create_payrolls.sql")),
    ("0003", include_str!("../migrations/0003_create_api_keys.sql")),
];

const PAYROLL_SELECT: &str = r#"
    SELECT id, user_id, ref_no, date_from, date_to, period_type, status,
           base_salary, allowance_total, deduction_total, net,
           present, absent, late, created_at, updated_at
    FROM payroll_periods
"#;

/// Runs all database migrations, one statement at a time.
async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    for (name, sql) in MIGRATIONS {
        for statement in sql.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
            }
        }
    }
    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to `:memory:` opens its own empty database.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new().connect_with(options).await?
        };

        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Master data (imports and fixtures)
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn insert_employee(&self, employee: &Employee) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO employees (id, full_name, base_salary, created_at) VALUES (?, ?, ?, ?)"#,
        )
        .bind(employee.id.to_string())
        .bind(&employee.full_name)
        .bind(employee.base_salary.minor_units())
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    /// Assigns an allowance or deduction to an employee.
    pub async fn insert_recurrence(
        &self,
        kind: RecurrenceKind,
        recurrence: &PayRecurrence,
    ) -> Result<(), RepoError> {
        let sql = match kind {
            RecurrenceKind::Allowance => {
                r#"INSERT INTO employee_allowances (id, user_id, allowance_id, type, amount, effective_date)
                   VALUES (?, ?, ?, ?, ?, ?)"#
            }
            RecurrenceKind::Deduction => {
                r#"INSERT INTO employee_deductions (id, user_id, deduction_id, type, amount, effective_date)
                   VALUES (?, ?, ?, ?, ?, ?)"#
            }
        };

        sqlx::query(sql)
            .bind(recurrence.id.to_string())
            .bind(recurrence.employee_id.to_string())
            .bind(recurrence.category_id.to_string())
            .bind(recurrence.recurrence_type.as_str())
            .bind(recurrence.amount.minor_units())
            .bind(format_date(recurrence.effective_date))
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Opens a write transaction holding the RESERVED lock from the start.
    ///
    /// A second writer then blocks on `busy_timeout` at `BEGIN` and reads the
    /// committed row, instead of failing its lock upgrade with SQLITE_BUSY.
    async fn begin_write(&self) -> Result<sqlx::Transaction<'static, Sqlite>, RepoError> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(tx_err)
    }

    /// Moves a payroll through the lifecycle inside one transaction.
    ///
    /// Returns the updated record, or `None` when the action deleted it.
    async fn apply_transition(
        &self,
        id: PayrollId,
        action: LifecycleAction,
    ) -> Result<Option<PayrollPeriod>, RepoError> {
        let mut db_tx = self.begin_write().await?;

        let mut payroll = fetch_payroll(&mut db_tx, id)
            .await?
            .ok_or(DomainError::PayrollNotFound(id))?;
        let previous = payroll.status;

        let next = payroll.status.apply(action)?;
        let result = match next {
            Some(_) => {
                payroll.transition(action)?;
                sqlx::query(
                    r#"UPDATE payroll_periods SET status = ?, updated_at = ?
                       WHERE id = ? AND status = 'PENDING'"#,
                )
                .bind(payroll.status.as_str())
                .bind(format_timestamp(payroll.updated_at))
                .bind(id.to_string())
                .execute(&mut *db_tx)
                .await
                .map_err(db_err)?
            }
            None => {
                sqlx::query(r#"DELETE FROM payroll_lines WHERE payroll_id = ?"#)
                    .bind(id.to_string())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?;
                sqlx::query(r#"DELETE FROM payroll_periods WHERE id = ? AND status = 'PENDING'"#)
                    .bind(id.to_string())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?
            }
        };

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "Payroll {} changed status concurrently",
                id
            )));
        }

        db_tx.commit().await.map_err(tx_err)?;

        tracing::info!(payroll_id = %id, from = %previous, action = %action, "Payroll transitioned");
        Ok(next.map(|_| payroll))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level queries (shared by pool reads and transactions)
// ─────────────────────────────────────────────────────────────────────────────

async fn fetch_employee(
    conn: &mut SqliteConnection,
    id: EmployeeId,
) -> Result<Option<Employee>, RepoError> {
    let row: Option<DbEmployee> =
        sqlx::query_as(r#"SELECT id, full_name, base_salary FROM employees WHERE id = ?"#)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;

    row.map(DbEmployee::into_domain).transpose()
}

async fn fetch_recurrences(
    conn: &mut SqliteConnection,
    kind: RecurrenceKind,
    employee_id: EmployeeId,
) -> Result<Vec<PayRecurrence>, RepoError> {
    let sql = match kind {
        RecurrenceKind::Allowance => {
            r#"SELECT id, user_id, allowance_id AS category_id, type AS recurrence_type, amount, effective_date
               FROM employee_allowances WHERE user_id = ? ORDER BY effective_date, id"#
        }
        RecurrenceKind::Deduction => {
            r#"SELECT id, user_id, deduction_id AS category_id, type AS recurrence_type, amount, effective_date
               FROM employee_deductions WHERE user_id = ? ORDER BY effective_date, id"#
        }
    };

    let rows: Vec<DbRecurrence> = sqlx::query_as(sql)
        .bind(employee_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    rows.into_iter().map(DbRecurrence::into_domain).collect()
}

/// ONCE assignments already applied by a live payroll of this employee.
async fn fetch_consumed_once(
    conn: &mut SqliteConnection,
    employee_id: EmployeeId,
) -> Result<HashSet<RecurrenceId>, RepoError> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"SELECT l.recurrence_id
           FROM payroll_lines l
           JOIN payroll_periods p ON p.id = l.payroll_id
           WHERE p.user_id = ? AND p.status <> 'CANCELLED' AND l.recurrence_type = 'ONCE'"#,
    )
    .bind(employee_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    ids.iter().map(|id| parse_id("recurrence_id", id)).collect()
}

async fn fetch_lines(
    conn: &mut SqliteConnection,
    payroll_ids: &[String],
) -> Result<HashMap<String, Vec<PayrollLine>>, RepoError> {
    let mut grouped: HashMap<String, Vec<PayrollLine>> = HashMap::new();
    if payroll_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT payroll_id, recurrence_id, category_id, kind, recurrence_type, amount, effective_date \
         FROM payroll_lines WHERE payroll_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in payroll_ids {
        ids.push_bind(id.clone());
    }
    ids.push_unseparated(") ORDER BY payroll_id, position");

    let rows: Vec<DbPayrollLine> = qb
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    for row in rows {
        let payroll_id = row.payroll_id.clone();
        grouped.entry(payroll_id).or_default().push(row.into_domain()?);
    }
    Ok(grouped)
}

async fn fetch_payroll(
    conn: &mut SqliteConnection,
    id: PayrollId,
) -> Result<Option<PayrollPeriod>, RepoError> {
    let sql = format!("{} WHERE id = ?", PAYROLL_SELECT);
    let row: Option<DbPayroll> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut lines = fetch_lines(conn, std::slice::from_ref(&row.id)).await?;
    let lines = lines.remove(&row.id).unwrap_or_default();
    row.into_domain(lines).map(Some)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PayrollFilter) {
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.to_string());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(period_type) = filter.period_type {
        qb.push(" AND period_type = ").push_bind(period_type.as_str());
    }
    if let Some(ref_no) = &filter.ref_no {
        qb.push(" AND instr(ref_no, ")
            .push_bind(ref_no.clone())
            .push(") > 0");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PayrollRepository for SqliteRepo {
    async fn generate_payroll(
        &self,
        req: GeneratePayrollRequest,
    ) -> Result<PayrollPeriod, RepoError> {
        let input = req.validate()?;
        let key = input.key();

        let mut db_tx = self.begin_write().await?;

        // Uniqueness guard
        let by_ref: Option<String> =
            sqlx::query_scalar(r#"SELECT id FROM payroll_periods WHERE ref_no = ?"#)
                .bind(&input.ref_no)
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(db_err)?;
        let by_ref = by_ref.map(|id| parse_id("id", &id)).transpose()?;
        guard::ensure_ref_no_free(&input.ref_no, by_ref)?;

        let live: Option<String> = sqlx::query_scalar(
            r#"SELECT id FROM payroll_periods
               WHERE user_id = ? AND date_from = ? AND date_to = ? AND period_type = ?
                 AND status <> 'CANCELLED'"#,
        )
        .bind(key.user_id.to_string())
        .bind(format_date(key.date_from))
        .bind(format_date(key.date_to))
        .bind(key.period_type.as_str())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(db_err)?;
        let live = live.map(|id| parse_id("id", &id)).transpose()?;
        guard::ensure_period_free(&key, live)?;

        // Master data
        let employee = fetch_employee(&mut db_tx, input.user_id)
            .await?
            .ok_or(DomainError::EmployeeNotFound(input.user_id))?;
        let allowances =
            fetch_recurrences(&mut db_tx, RecurrenceKind::Allowance, employee.id).await?;
        let deductions =
            fetch_recurrences(&mut db_tx, RecurrenceKind::Deduction, employee.id).await?;
        let consumed = fetch_consumed_once(&mut db_tx, employee.id).await?;

        let snapshot = PayrollSnapshot::build(
            employee.base_salary,
            &allowances,
            &deductions,
            &input.window,
            input.period_type,
            &consumed,
        )?;
        let payroll = PayrollPeriod::pending(
            input.user_id,
            input.ref_no,
            input.window,
            input.period_type,
            input.attendance,
            snapshot,
        );

        sqlx::query(
            r#"INSERT INTO payroll_periods (id, user_id, ref_no, date_from, date_to, period_type, status,
                   base_salary, allowance_total, deduction_total, net, present, absent, late, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(payroll.id.to_string())
        .bind(payroll.user_id.to_string())
        .bind(&payroll.ref_no)
        .bind(format_date(payroll.date_from))
        .bind(format_date(payroll.date_to))
        .bind(payroll.period_type.as_str())
        .bind(payroll.status.as_str())
        .bind(payroll.base_salary.minor_units())
        .bind(payroll.allowance_total.minor_units())
        .bind(payroll.deduction_total.minor_units())
        .bind(payroll.net.minor_units())
        .bind(payroll.attendance.present)
        .bind(payroll.attendance.absent)
        .bind(payroll.attendance.late)
        .bind(format_timestamp(payroll.created_at))
        .bind(format_timestamp(payroll.updated_at))
        .execute(&mut *db_tx)
        .await
        .map_err(write_err)?;

        for (position, line) in payroll.lines.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO payroll_lines (payroll_id, position, recurrence_id, category_id, kind,
                       recurrence_type, amount, effective_date)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(payroll.id.to_string())
            .bind(position as i64)
            .bind(line.recurrence_id.to_string())
            .bind(line.category_id.to_string())
            .bind(line.kind.as_str())
            .bind(line.recurrence_type.as_str())
            .bind(line.amount.minor_units())
            .bind(format_date(line.effective_date))
            .execute(&mut *db_tx)
            .await
            .map_err(db_err)?;
        }

        db_tx.commit().await.map_err(tx_err)?;

        tracing::info!(
            payroll_id = %payroll.id,
            ref_no = %payroll.ref_no,
            net = %payroll.net,
            lines = payroll.lines.len(),
            "Payroll generated"
        );
        Ok(payroll)
    }

    async fn mark_paid(&self, id: PayrollId) -> Result<PayrollPeriod, RepoError> {
        self.apply_transition(id, LifecycleAction::MarkPaid)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn cancel_payroll(&self, id: PayrollId) -> Result<PayrollPeriod, RepoError> {
        self.apply_transition(id, LifecycleAction::Cancel)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn remove_payroll(&self, id: PayrollId) -> Result<(), RepoError> {
        self.apply_transition(id, LifecycleAction::Remove)
            .await
            .map(|_| ())
    }

    async fn get_payroll(&self, id: PayrollId) -> Result<Option<PayrollPeriod>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_payroll(&mut conn, id).await
    }

    async fn list_payrolls(&self, filter: &PayrollFilter) -> Result<PayrollPage, RepoError> {
        filter.validate()?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let mut count_qb =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM payroll_periods WHERE 1 = 1");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::<Sqlite>::new(PAYROLL_SELECT);
        qb.push(" WHERE 1 = 1");
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id");
        if let Some((limit, offset)) = filter.pagination() {
            qb.push(" LIMIT ")
                .push_bind(i64::from(limit))
                .push(" OFFSET ")
                .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows: Vec<DbPayroll> = qb
            .build_query_as()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut lines = fetch_lines(&mut conn, &ids).await?;

        let data = rows
            .into_iter()
            .map(|row| {
                let row_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_domain(row_lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PayrollPage {
            data,
            meta: filter.meta(total.max(0) as u64),
        })
    }
}

#[async_trait]
impl EmployeeDirectory for SqliteRepo {
    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_employee(&mut conn, id).await
    }

    async fn list_allowances(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<PayRecurrence>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_recurrences(&mut conn, RecurrenceKind::Allowance, employee_id).await
    }

    async fn list_deductions(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<PayRecurrence>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_recurrences(&mut conn, RecurrenceKind::Deduction, employee_id).await
    }
}

#[async_trait]
impl ApiKeyStore for SqliteRepo {
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let row: Option<DbApiKey> = sqlx::query_as(
            r#"SELECT id, name, key_hash, role, is_active, created_at, last_used_at
               FROM api_keys
               WHERE key_hash = ? AND is_active = 1"#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let now = Utc::now();
        sqlx::query(r#"UPDATE api_keys SET last_used_at = ? WHERE id = ?"#)
            .bind(format_timestamp(now))
            .bind(&row.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let mut api_key = row.into_domain()?;
        api_key.last_used_at = Some(now);
        Ok(Some(api_key))
    }

    async fn create_api_key(&self, name: &str, role: Role) -> Result<(ApiKey, String), RepoError> {
        let raw_key = security::generate_api_key();
        let api_key = ApiKey::new(name.to_string(), security::hash_api_key(&raw_key), role);

        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_hash, role, is_active, created_at)
               VALUES (?, ?, ?, ?, 1, ?)"#,
        )
        .bind(api_key.id.to_string())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.role.as_str())
        .bind(format_timestamp(api_key.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM api_keys WHERE is_active = 1"#)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let rows: Vec<DbApiKey> = sqlx::query_as(
            r#"SELECT id, name, key_hash, role, is_active, created_at, last_used_at
               FROM api_keys ORDER BY created_at"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbApiKey::into_domain).collect()
    }
}
