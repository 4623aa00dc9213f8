//! PostgreSQL repository adapter.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use payroll_types::domain::guard;
use payroll_types::{
    ApiKey, ApiKeyStore, DomainError, Employee, EmployeeDirectory, EmployeeId,
    GeneratePayrollRequest, LifecycleAction, PayRecurrence, PayrollFilter, PayrollId, PayrollLine,
    PayrollPage, PayrollPeriod, PayrollRepository, PayrollSnapshot, RecurrenceId, RecurrenceKind,
    RepoError, Role,
};

use crate::security;
use crate::types::pg::{DbApiKey, DbEmployee, DbPayroll, DbPayrollLine, DbRecurrence};
use crate::types::{db_err, tx_err, write_err};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

const PAYROLL_SELECT: &str = r#"
    SELECT id, user_id, ref_no, date_from, date_to, period_type, status,
           base_salary, allowance_total, deduction_total, net,
           present, absent, late, created_at, updated_at
    FROM payroll_periods
"#;

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_master_data_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_payrolls_pg.sql"),
        "0002",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0003_create_api_keys_pg.sql"),
        "0003",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
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
            r#"INSERT INTO employees (id, full_name, base_salary, created_at) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(employee.id.into_uuid())
        .bind(&employee.full_name)
        .bind(employee.base_salary.minor_units())
        .bind(Utc::now())
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
                   VALUES ($1, $2, $3, $4, $5, $6)"#
            }
            RecurrenceKind::Deduction => {
                r#"INSERT INTO employee_deductions (id, user_id, deduction_id, type, amount, effective_date)
                   VALUES ($1, $2, $3, $4, $5, $6)"#
            }
        };

        sqlx::query(sql)
            .bind(recurrence.id.into_uuid())
            .bind(recurrence.employee_id.into_uuid())
            .bind(recurrence.category_id.into_uuid())
            .bind(recurrence.recurrence_type.as_str())
            .bind(recurrence.amount.minor_units())
            .bind(recurrence.effective_date)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Moves a payroll through the lifecycle, holding a row lock on it.
    ///
    /// Returns the updated record, or `None` when the action deleted it.
    async fn apply_transition(
        &self,
        id: PayrollId,
        action: LifecycleAction,
    ) -> Result<Option<PayrollPeriod>, RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let mut payroll = fetch_payroll(&mut db_tx, id, true)
            .await?
            .ok_or(DomainError::PayrollNotFound(id))?;
        let previous = payroll.status;

        let next = payroll.status.apply(action)?;
        match next {
            Some(_) => {
                payroll.transition(action)?;
                sqlx::query(r#"UPDATE payroll_periods SET status = $1, updated_at = $2 WHERE id = $3"#)
                    .bind(payroll.status.as_str())
                    .bind(payroll.updated_at)
                    .bind(id.into_uuid())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?;
            }
            None => {
                sqlx::query(r#"DELETE FROM payroll_lines WHERE payroll_id = $1"#)
                    .bind(id.into_uuid())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?;
                sqlx::query(r#"DELETE FROM payroll_periods WHERE id = $1"#)
                    .bind(id.into_uuid())
                    .execute(&mut *db_tx)
                    .await
                    .map_err(db_err)?;
            }
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
    conn: &mut PgConnection,
    id: EmployeeId,
) -> Result<Option<Employee>, RepoError> {
    let row: Option<DbEmployee> =
        sqlx::query_as(r#"SELECT id, full_name, base_salary FROM employees WHERE id = $1"#)
            .bind(id.into_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;

    Ok(row.map(DbEmployee::into_domain))
}

async fn fetch_recurrences(
    conn: &mut PgConnection,
    kind: RecurrenceKind,
    employee_id: EmployeeId,
) -> Result<Vec<PayRecurrence>, RepoError> {
    let sql = match kind {
        RecurrenceKind::Allowance => {
            r#"SELECT id, user_id, allowance_id AS category_id, type AS recurrence_type, amount, effective_date
               FROM employee_allowances WHERE user_id = $1 ORDER BY effective_date, id"#
        }
        RecurrenceKind::Deduction => {
            r#"SELECT id, user_id, deduction_id AS category_id, type AS recurrence_type, amount, effective_date
               FROM employee_deductions WHERE user_id = $1 ORDER BY effective_date, id"#
        }
    };

    let rows: Vec<DbRecurrence> = sqlx::query_as(sql)
        .bind(employee_id.into_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    rows.into_iter().map(DbRecurrence::into_domain).collect()
}

/// ONCE assignments already applied by a live payroll of this employee.
async fn fetch_consumed_once(
    conn: &mut PgConnection,
    employee_id: EmployeeId,
) -> Result<HashSet<RecurrenceId>, RepoError> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"SELECT l.recurrence_id
           FROM payroll_lines l
           JOIN payroll_periods p ON p.id = l.payroll_id
           WHERE p.user_id = $1 AND p.status <> 'CANCELLED' AND l.recurrence_type = 'ONCE'"#,
    )
    .bind(employee_id.into_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(ids.into_iter().map(RecurrenceId::from_uuid).collect())
}

async fn fetch_lines(
    conn: &mut PgConnection,
    payroll_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<PayrollLine>>, RepoError> {
    let mut grouped: HashMap<Uuid, Vec<PayrollLine>> = HashMap::new();
    if payroll_ids.is_empty() {
        return Ok(grouped);
    }

    let rows: Vec<DbPayrollLine> = sqlx::query_as(
        r#"SELECT payroll_id, recurrence_id, category_id, kind, recurrence_type, amount, effective_date
           FROM payroll_lines
           WHERE payroll_id = ANY($1)
           ORDER BY payroll_id, position"#,
    )
    .bind(payroll_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    for row in rows {
        let payroll_id = row.payroll_id;
        grouped.entry(payroll_id).or_default().push(row.into_domain()?);
    }
    Ok(grouped)
}

async fn fetch_payroll(
    conn: &mut PgConnection,
    id: PayrollId,
    for_update: bool,
) -> Result<Option<PayrollPeriod>, RepoError> {
    let sql = if for_update {
        format!("{} WHERE id = $1 FOR UPDATE", PAYROLL_SELECT)
    } else {
        format!("{} WHERE id = $1", PAYROLL_SELECT)
    };
    let row: Option<DbPayroll> = sqlx::query_as(&sql)
        .bind(id.into_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut lines = fetch_lines(conn, &[row.id]).await?;
    let lines = lines.remove(&row.id).unwrap_or_default();
    row.into_domain(lines).map(Some)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PayrollFilter) {
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.into_uuid());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(period_type) = filter.period_type {
        qb.push(" AND period_type = ").push_bind(period_type.as_str());
    }
    if let Some(ref_no) = &filter.ref_no {
        qb.push(" AND strpos(ref_no, ")
            .push_bind(ref_no.clone())
            .push(") > 0");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PayrollRepository for PostgresRepo {
    async fn generate_payroll(
        &self,
        req: GeneratePayrollRequest,
    ) -> Result<PayrollPeriod, RepoError> {
        let input = req.validate()?;
        let key = input.key();

        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        // Row lock on the employee serialises concurrent runs for them
        let employee: Option<DbEmployee> = sqlx::query_as(
            r#"SELECT id, full_name, base_salary FROM employees WHERE id = $1 FOR UPDATE"#,
        )
        .bind(input.user_id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(db_err)?;

        // Uniqueness guard
        let by_ref: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT id FROM payroll_periods WHERE ref_no = $1"#)
                .bind(&input.ref_no)
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(db_err)?;
        guard::ensure_ref_no_free(&input.ref_no, by_ref.map(PayrollId::from_uuid))?;

        let live: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM payroll_periods
               WHERE user_id = $1 AND date_from = $2 AND date_to = $3 AND period_type = $4
                 AND status <> 'CANCELLED'"#,
        )
        .bind(key.user_id.into_uuid())
        .bind(key.date_from)
        .bind(key.date_to)
        .bind(key.period_type.as_str())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(db_err)?;
        guard::ensure_period_free(&key, live.map(PayrollId::from_uuid))?;

        // Master data
        let employee = employee
            .map(DbEmployee::into_domain)
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
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"#,
        )
        .bind(payroll.id.into_uuid())
        .bind(payroll.user_id.into_uuid())
        .bind(&payroll.ref_no)
        .bind(payroll.date_from)
        .bind(payroll.date_to)
        .bind(payroll.period_type.as_str())
        .bind(payroll.status.as_str())
        .bind(payroll.base_salary.minor_units())
        .bind(payroll.allowance_total.minor_units())
        .bind(payroll.deduction_total.minor_units())
        .bind(payroll.net.minor_units())
        .bind(payroll.attendance.present)
        .bind(payroll.attendance.absent)
        .bind(payroll.attendance.late)
        .bind(payroll.created_at)
        .bind(payroll.updated_at)
        .execute(&mut *db_tx)
        .await
        .map_err(write_err)?;

        for (position, line) in payroll.lines.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO payroll_lines (payroll_id, position, recurrence_id, category_id, kind,
                       recurrence_type, amount, effective_date)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
            )
            .bind(payroll.id.into_uuid())
            .bind(position as i32)
            .bind(line.recurrence_id.into_uuid())
            .bind(line.category_id.into_uuid())
            .bind(line.kind.as_str())
            .bind(line.recurrence_type.as_str())
            .bind(line.amount.minor_units())
            .bind(line.effective_date)
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
        fetch_payroll(&mut conn, id, false).await
    }

    async fn list_payrolls(&self, filter: &PayrollFilter) -> Result<PayrollPage, RepoError> {
        filter.validate()?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM payroll_periods WHERE TRUE");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;

        let mut qb = QueryBuilder::<Postgres>::new(PAYROLL_SELECT);
        qb.push(" WHERE TRUE");
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

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
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
impl EmployeeDirectory for PostgresRepo {
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
impl ApiKeyStore for PostgresRepo {
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let row: Option<DbApiKey> = sqlx::query_as(
            r#"
            UPDATE api_keys SET last_used_at = NOW()
            WHERE key_hash = $1 AND is_active = TRUE
            RETURNING id, name, key_hash, role, is_active, created_at, last_used_at
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbApiKey::into_domain).transpose()
    }

    async fn create_api_key(&self, name: &str, role: Role) -> Result<(ApiKey, String), RepoError> {
        let raw_key = security::generate_api_key();
        let api_key = ApiKey::new(name.to_string(), security::hash_api_key(&raw_key), role);

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, key_hash, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            "#,
        )
        .bind(api_key.id.into_uuid())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.role.as_str())
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE"#)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let rows: Vec<DbApiKey> = sqlx::query_as(
            r#"
            SELECT id, name, key_hash, role, is_active, created_at, last_used_at
            FROM api_keys ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbApiKey::into_domain).collect()
    }
}
