//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use payroll_types::{
        ApiKeyStore, CategoryId, DomainError, Employee, EmployeeDirectory, EmployeeId,
        GeneratePayrollRequest, LifecycleAction, Money, PayRecurrence, PayrollFilter, PayrollId,
        PayrollRepository, PayrollStatus, PeriodType, RecurrenceKind, RecurrenceType, RepoError,
        Role,
    };

    use crate::SqliteRepo;
    use crate::security::hash_api_key;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn major(amount: i64) -> Money {
        Money::from_major(amount).unwrap()
    }

    async fn seed_employee(repo: &SqliteRepo, salary: i64) -> Employee {
        let employee = Employee::new("Dewi Lestari", major(salary));
        repo.insert_employee(&employee).await.unwrap();
        employee
    }

    async fn assign(
        repo: &SqliteRepo,
        employee: &Employee,
        kind: RecurrenceKind,
        recurrence_type: RecurrenceType,
        amount: i64,
        effective_date: NaiveDate,
    ) -> PayRecurrence {
        let recurrence = PayRecurrence::new(
            employee.id,
            CategoryId::new(),
            recurrence_type,
            major(amount),
            effective_date,
        );
        repo.insert_recurrence(kind, &recurrence).await.unwrap();
        recurrence
    }

    fn request(
        user_id: EmployeeId,
        ref_no: &str,
        from: NaiveDate,
        to: NaiveDate,
        period_type: PeriodType,
    ) -> GeneratePayrollRequest {
        GeneratePayrollRequest {
            user_id,
            ref_no: ref_no.to_string(),
            date_from: from,
            date_to: to,
            period_type,
            present: 20,
            absent: 1,
            late: 2,
        }
    }

    fn january(user_id: EmployeeId, ref_no: &str) -> GeneratePayrollRequest {
        request(
            user_id,
            ref_no,
            date(2025, 1, 1),
            date(2025, 1, 31),
            PeriodType::Monthly,
        )
    }

    async fn count_rows(repo: &SqliteRepo, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(repo.pool())
            .await
            .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Generation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_generate_reference_scenario() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 8_000_000).await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Allowance,
            RecurrenceType::Monthly,
            500_000,
            date(2025, 1, 10),
        )
        .await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Deduction,
            RecurrenceType::Monthly,
            200_000,
            date(2025, 1, 15),
        )
        .await;

        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-2025-01-0001"))
            .await
            .unwrap();

        assert_eq!(payroll.status, PayrollStatus::Pending);
        assert_eq!(payroll.base_salary, major(8_000_000));
        assert_eq!(payroll.allowance_total, major(500_000));
        assert_eq!(payroll.deduction_total, major(200_000));
        assert_eq!(payroll.net, major(8_300_000));
        assert_eq!(payroll.lines.len(), 2);
        assert_eq!(payroll.attendance.present, 20);

        let fetched = repo.get_payroll(payroll.id).await.unwrap().unwrap();
        assert_eq!(fetched.net, payroll.net);
        assert_eq!(fetched.ref_no, "PAY-2025-01-0001");
        assert_eq!(fetched.lines, payroll.lines);
        assert_eq!(fetched.date_from, date(2025, 1, 1));
    }

    #[tokio::test]
    async fn test_generate_without_assignments_nets_base_salary() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 5_000_000).await;

        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-1"))
            .await
            .unwrap();

        assert_eq!(payroll.allowance_total, Money::ZERO);
        assert_eq!(payroll.deduction_total, Money::ZERO);
        assert_eq!(payroll.net, major(5_000_000));
        assert!(payroll.lines.is_empty());
    }

    #[tokio::test]
    async fn test_generate_negative_net_is_stored() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000).await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Deduction,
            RecurrenceType::Once,
            1_500,
            date(2025, 1, 3),
        )
        .await;

        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-NEG"))
            .await
            .unwrap();
        assert_eq!(payroll.net, major(-500));

        let fetched = repo.get_payroll(payroll.id).await.unwrap().unwrap();
        assert!(fetched.net.is_negative());
    }

    #[tokio::test]
    async fn test_generate_duplicate_ref_no_rejected() {
        let repo = setup_repo().await;
        let first = seed_employee(&repo, 1_000_000).await;
        let second = seed_employee(&repo, 2_000_000).await;

        repo.generate_payroll(january(first.id, "PAY-DUP"))
            .await
            .unwrap();
        let result = repo.generate_payroll(january(second.id, "PAY-DUP")).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::DuplicateRefNo(ref r))) if r == "PAY-DUP"
        ));
        assert_eq!(count_rows(&repo, "payroll_periods").await, 1);
    }

    #[tokio::test]
    async fn test_generate_duplicate_period_until_cancelled() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;

        let first = repo
            .generate_payroll(january(employee.id, "PAY-A"))
            .await
            .unwrap();

        let result = repo.generate_payroll(january(employee.id, "PAY-B")).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::DuplicatePeriod { existing, .. })) if existing == first.id
        ));

        repo.cancel_payroll(first.id).await.unwrap();

        let second = repo
            .generate_payroll(january(employee.id, "PAY-B"))
            .await
            .unwrap();
        assert_eq!(second.status, PayrollStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_generate_same_period_one_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
        let repo = std::sync::Arc::new(SqliteRepo::new(&url).await.unwrap());

        for round in 0..10 {
            let employee = seed_employee(&repo, 1_000_000).await;

            let handles: Vec<_> = ["A", "B"]
                .into_iter()
                .map(|suffix| {
                    let repo = repo.clone();
                    let req = january(employee.id, &format!("PAY-{}-{}", round, suffix));
                    tokio::spawn(async move { repo.generate_payroll(req).await })
                })
                .collect();

            let mut created = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => created += 1,
                    Err(RepoError::Domain(DomainError::DuplicatePeriod { .. }))
                    | Err(RepoError::Conflict(_)) => {}
                    Err(other) => panic!("round {}: unexpected error {:?}", round, other),
                }
            }
            assert_eq!(created, 1, "round {}", round);
        }

        assert_eq!(count_rows(&repo, "payroll_periods").await, 10);
    }

    #[tokio::test]
    async fn test_same_dates_different_period_type_allowed() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;

        repo.generate_payroll(january(employee.id, "PAY-M"))
            .await
            .unwrap();
        let semi = request(
            employee.id,
            "PAY-S",
            date(2025, 1, 1),
            date(2025, 1, 31),
            PeriodType::SemiMonthly,
        );

        assert!(repo.generate_payroll(semi).await.is_ok());
    }

    #[tokio::test]
    async fn test_generate_unknown_employee_writes_nothing() {
        let repo = setup_repo().await;
        let missing = EmployeeId::new();

        let result = repo.generate_payroll(january(missing, "PAY-X")).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::EmployeeNotFound(id))) if id == missing
        ));
        assert_eq!(count_rows(&repo, "payroll_periods").await, 0);
        assert_eq!(count_rows(&repo, "payroll_lines").await, 0);
    }

    #[tokio::test]
    async fn test_generate_reversed_period_rejected() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        let req = request(
            employee.id,
            "PAY-R",
            date(2025, 1, 31),
            date(2025, 1, 1),
            PeriodType::Monthly,
        );

        let result = repo.generate_payroll(req).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidPeriod { .. }))
        ));
    }

    #[tokio::test]
    async fn test_generate_blank_ref_no_rejected() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;

        let result = repo.generate_payroll(january(employee.id, "   ")).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::Validation { ref field, .. })) if field == "ref_no"
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recurrence resolution against stored assignments
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_semi_monthly_assignment_only_in_semi_monthly_runs() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Allowance,
            RecurrenceType::SemiMonthly,
            100_000,
            date(2025, 1, 5),
        )
        .await;

        let monthly = repo
            .generate_payroll(january(employee.id, "PAY-M"))
            .await
            .unwrap();
        assert_eq!(monthly.allowance_total, Money::ZERO);

        let semi = repo
            .generate_payroll(request(
                employee.id,
                "PAY-S",
                date(2025, 1, 1),
                date(2025, 1, 15),
                PeriodType::SemiMonthly,
            ))
            .await
            .unwrap();
        assert_eq!(semi.allowance_total, major(100_000));
    }

    #[tokio::test]
    async fn test_assignment_outside_window_ignored() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Allowance,
            RecurrenceType::Monthly,
            300_000,
            date(2025, 2, 1),
        )
        .await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Deduction,
            RecurrenceType::Monthly,
            50_000,
            date(2024, 12, 31),
        )
        .await;

        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-W"))
            .await
            .unwrap();

        assert_eq!(payroll.net, major(1_000_000));
        assert!(payroll.lines.is_empty());
    }

    #[tokio::test]
    async fn test_once_assignment_consumed_by_live_payroll_only() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        let bonus = assign(
            &repo,
            &employee,
            RecurrenceKind::Allowance,
            RecurrenceType::Once,
            250_000,
            date(2025, 1, 5),
        )
        .await;
        let first_half = || {
            request(
                employee.id,
                "",
                date(2025, 1, 1),
                date(2025, 1, 15),
                PeriodType::SemiMonthly,
            )
        };

        let first = repo
            .generate_payroll(GeneratePayrollRequest {
                ref_no: "PAY-1".into(),
                ..first_half()
            })
            .await
            .unwrap();
        assert_eq!(first.allowance_total, major(250_000));
        assert_eq!(first.lines[0].recurrence_id, bonus.id);

        // Overlapping monthly run must not pay the bonus twice.
        let monthly = repo
            .generate_payroll(january(employee.id, "PAY-2"))
            .await
            .unwrap();
        assert_eq!(monthly.allowance_total, Money::ZERO);

        repo.cancel_payroll(first.id).await.unwrap();

        let rerun = repo
            .generate_payroll(GeneratePayrollRequest {
                ref_no: "PAY-3".into(),
                ..first_half()
            })
            .await
            .unwrap();
        assert_eq!(rerun.allowance_total, major(250_000));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Store-level backstop
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unique_index_rejects_second_live_period() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        repo.generate_payroll(january(employee.id, "PAY-A"))
            .await
            .unwrap();

        // Bypasses the guard to exercise the partial unique index directly.
        let err = sqlx::query(
            r#"INSERT INTO payroll_periods (id, user_id, ref_no, date_from, date_to, period_type, status,
                   base_salary, allowance_total, deduction_total, net, created_at, updated_at)
               VALUES (?, ?, 'PAY-RACE', '2025-01-01', '2025-01-31', 'MONTHLY', 'PENDING',
                   0, 0, 0, 0, '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z')"#,
        )
        .bind(PayrollId::new().to_string())
        .bind(employee.id.to_string())
        .execute(repo.pool())
        .await
        .unwrap_err();

        assert!(matches!(crate::types::write_err(err), RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unique_index_ignores_cancelled_rows() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        let first = repo
            .generate_payroll(january(employee.id, "PAY-A"))
            .await
            .unwrap();
        repo.cancel_payroll(first.id).await.unwrap();

        let result = sqlx::query(
            r#"INSERT INTO payroll_periods (id, user_id, ref_no, date_from, date_to, period_type, status,
                   base_salary, allowance_total, deduction_total, net, created_at, updated_at)
               VALUES (?, ?, 'PAY-B', '2025-01-01', '2025-01-31', 'MONTHLY', 'PENDING',
                   0, 0, 0, 0, '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z')"#,
        )
        .bind(PayrollId::new().to_string())
        .bind(employee.id.to_string())
        .execute(repo.pool())
        .await;

        assert!(result.is_ok());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_mark_paid_then_cancel_rejected() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-P"))
            .await
            .unwrap();

        let paid = repo.mark_paid(payroll.id).await.unwrap();
        assert_eq!(paid.status, PayrollStatus::Paid);
        assert_eq!(paid.net, payroll.net);

        let result = repo.cancel_payroll(payroll.id).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::IllegalTransition {
                status: PayrollStatus::Paid,
                action: LifecycleAction::Cancel,
            }))
        ));

        let again = repo.mark_paid(payroll.id).await;
        assert!(matches!(
            again,
            Err(RepoError::Domain(DomainError::IllegalTransition { .. }))
        ));

        let stored = repo.get_payroll(payroll.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PayrollStatus::Paid);
    }

    #[tokio::test]
    async fn test_cancelled_payroll_cannot_be_paid() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-C"))
            .await
            .unwrap();

        let cancelled = repo.cancel_payroll(payroll.id).await.unwrap();
        assert_eq!(cancelled.status, PayrollStatus::Cancelled);

        let result = repo.mark_paid(payroll.id).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::IllegalTransition {
                status: PayrollStatus::Cancelled,
                action: LifecycleAction::MarkPaid,
            }))
        ));
    }

    #[tokio::test]
    async fn test_remove_pending_deletes_record_and_lines() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        assign(
            &repo,
            &employee,
            RecurrenceKind::Allowance,
            RecurrenceType::Monthly,
            10_000,
            date(2025, 1, 2),
        )
        .await;
        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-D"))
            .await
            .unwrap();
        assert_eq!(count_rows(&repo, "payroll_lines").await, 1);

        repo.remove_payroll(payroll.id).await.unwrap();

        assert!(repo.get_payroll(payroll.id).await.unwrap().is_none());
        assert_eq!(count_rows(&repo, "payroll_lines").await, 0);

        // The reference number is free again once the record is gone.
        assert!(
            repo.generate_payroll(january(employee.id, "PAY-D"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_remove_non_pending_rejected() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        let payroll = repo
            .generate_payroll(january(employee.id, "PAY-K"))
            .await
            .unwrap();
        repo.mark_paid(payroll.id).await.unwrap();

        let result = repo.remove_payroll(payroll.id).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::IllegalTransition {
                status: PayrollStatus::Paid,
                action: LifecycleAction::Remove,
            }))
        ));
        assert!(repo.get_payroll(payroll.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transition_unknown_payroll() {
        let repo = setup_repo().await;
        let id = PayrollId::new();

        let result = repo.mark_paid(id).await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::PayrollNotFound(missing))) if missing == id
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listing
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let repo = setup_repo().await;
        let alice = seed_employee(&repo, 1_000_000).await;
        let bob = seed_employee(&repo, 2_000_000).await;

        let a1 = repo
            .generate_payroll(january(alice.id, "PAY-2025-01-A"))
            .await
            .unwrap();
        repo.generate_payroll(request(
            alice.id,
            "PAY-2025-02-A",
            date(2025, 2, 1),
            date(2025, 2, 28),
            PeriodType::Monthly,
        ))
        .await
        .unwrap();
        repo.generate_payroll(january(bob.id, "PAY-2025-01-B"))
            .await
            .unwrap();
        repo.mark_paid(a1.id).await.unwrap();

        let all = repo.list_payrolls(&PayrollFilter::default()).await.unwrap();
        assert_eq!(all.data.len(), 3);
        assert!(all.meta.is_none());

        let alices = repo
            .list_payrolls(&PayrollFilter {
                user_id: Some(alice.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alices.data.len(), 2);

        let paid = repo
            .list_payrolls(&PayrollFilter {
                status: Some(PayrollStatus::Paid),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paid.data.len(), 1);
        assert_eq!(paid.data[0].id, a1.id);

        let january_refs = repo
            .list_payrolls(&PayrollFilter {
                ref_no: Some("2025-01".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(january_refs.data.len(), 2);

        let page = repo
            .list_payrolls(&PayrollFilter {
                page: Some(2),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        let meta = page.meta.unwrap();
        assert_eq!(meta.total_items, 3);
        assert_eq!(meta.total_pages, 2);
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.items_per_page, 2);
    }

    #[tokio::test]
    async fn test_list_page_past_the_end_is_empty() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 1_000_000).await;
        repo.generate_payroll(january(employee.id, "PAY-001"))
            .await
            .unwrap();

        let page = repo
            .list_payrolls(&PayrollFilter {
                page: Some(u32::MAX),
                limit: Some(100),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(page.data.is_empty());
        let meta = page.meta.unwrap();
        assert_eq!(meta.total_items, 1);
        assert_eq!(meta.current_page, u32::MAX);
    }

    #[tokio::test]
    async fn test_list_rejects_zero_limit() {
        let repo = setup_repo().await;

        let result = repo
            .list_payrolls(&PayrollFilter {
                page: Some(1),
                limit: Some(0),
                ..Default::default()
            })
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::Validation { ref field, .. })) if field == "limit"
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Employee directory
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_directory_reads_master_data() {
        let repo = setup_repo().await;
        let employee = seed_employee(&repo, 3_000_000).await;
        let allowance = assign(
            &repo,
            &employee,
            RecurrenceKind::Allowance,
            RecurrenceType::Monthly,
            100,
            date(2025, 3, 1),
        )
        .await;

        let fetched = repo.get_employee(employee.id).await.unwrap().unwrap();
        assert_eq!(fetched, employee);

        let allowances = repo.list_allowances(employee.id).await.unwrap();
        assert_eq!(allowances, vec![allowance]);
        assert!(repo.list_deductions(employee.id).await.unwrap().is_empty());
        assert!(repo.get_employee(EmployeeId::new()).await.unwrap().is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let repo = setup_repo().await;
        assert_eq!(repo.count_api_keys().await.unwrap(), 0);

        let (created, raw_key) = repo.create_api_key("ops", Role::PayrollAdmin).await.unwrap();
        assert_eq!(created.role, Role::PayrollAdmin);

        let verified = repo
            .verify_api_key_hash(&hash_api_key(&raw_key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.id, created.id);
        assert!(verified.last_used_at.is_some());

        assert!(
            repo.verify_api_key_hash(&hash_api_key("pk_unknown"))
                .await
                .unwrap()
                .is_none()
        );

        repo.create_api_key("audit", Role::Viewer).await.unwrap();
        assert_eq!(repo.count_api_keys().await.unwrap(), 2);
        assert_eq!(repo.list_api_keys().await.unwrap().len(), 2);
    }
}
