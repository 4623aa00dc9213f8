//! Client example demonstrating a full payroll flow against a running server.
//!
//! Run with: cargo run -p payroll-app --example client_example --features sqlite

use chrono::NaiveDate;
use payroll_client::PayrollClient;
use payroll_hex::{PayrollService, inbound::HttpServer};
use payroll_repo::build_repo;
use payroll_types::{
    CategoryId, Employee, GeneratePayrollRequest, Money, PayRecurrence, PayrollFilter,
    PeriodType, PreviewPayrollRequest, RecurrenceKind, RecurrenceType, Role,
};
use std::net::SocketAddr;
use tempfile::tempdir;
use tokio::net::TcpListener;

fn date(y: i32, m: u32, d: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| anyhow::anyhow!("invalid date"))
}

fn show(amount: Money) -> String {
    format!("{:.2}", amount.minor_units() as f64 / 100.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let port = addr.port();
    drop(listener);

    // Use a temp file-backed SQLite DB
    let tmp = tempdir()?;
    let db_path = tmp.path().join("payroll.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server on port {port}...");
    println!("   Database: {db_url}");

    // Build repository (handles connection and migration)
    let repo = build_repo(&db_url).await?;

    // Seed master data: the employee directory is owned by HR, not this API
    let employee = Employee::new("Budi Santoso", Money::from_major(8_000_000)?);
    repo.insert_employee(&employee).await?;
    repo.insert_recurrence(
        RecurrenceKind::Allowance,
        &PayRecurrence::new(
            employee.id,
            CategoryId::new(),
            RecurrenceType::Monthly,
            Money::from_major(500_000)?,
            date(2025, 1, 10)?,
        ),
    )
    .await?;
    repo.insert_recurrence(
        RecurrenceKind::Deduction,
        &PayRecurrence::new(
            employee.id,
            CategoryId::new(),
            RecurrenceType::Monthly,
            Money::from_major(200_000)?,
            date(2025, 1, 15)?,
        ),
    )
    .await?;
    println!("✅ Seeded employee {} (id={})", employee.full_name, employee.id);

    // Start server in background
    let service = PayrollService::new(repo);
    let server = HttpServer::new(service);
    let router = server.router();

    let server_listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(server_listener, router.into_make_service()).await {
            eprintln!("server error: {e}");
        }
    });

    // Wait for server to start
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    // Create client
    let base_url = format!("http://127.0.0.1:{port}");
    let client = PayrollClient::new(&base_url);

    // ─────────────────────────────────────────────────────────────────────────
    // Demo: Full payroll flow
    // ─────────────────────────────────────────────────────────────────────────

    // Health check
    let health = client.health().await?;
    println!("✅ Server health: {health}");

    let january = GeneratePayrollRequest {
        user_id: employee.id,
        ref_no: "PAY-2025-01-0001".into(),
        date_from: date(2025, 1, 1)?,
        date_to: date(2025, 1, 31)?,
        period_type: PeriodType::Monthly,
        present: 21,
        absent: 1,
        late: 0,
    };

    let response = client.generate(&january).await;
    if let Err(e) = &response {
        println!("✅ Unauthorized without key: {e}");
    }

    // Keys
    let admin = client.bootstrap("hr-admin").await?;
    println!("✅ Admin key generated: {}", admin.api_key);
    let admin_client = PayrollClient::new(&base_url).with_api_key(admin.api_key);

    let viewer = admin_client.create_api_key("auditor", Role::Viewer).await?;
    let viewer_client = PayrollClient::new(&base_url).with_api_key(viewer.api_key);

    // Preview, then generate
    let preview = viewer_client
        .preview(&PreviewPayrollRequest {
            user_id: employee.id,
            date_from: january.date_from,
            date_to: january.date_to,
            period_type: january.period_type,
        })
        .await?;
    println!("✅ Preview net: {}", show(preview.breakdown.net));

    if let Err(e) = viewer_client.generate(&january).await {
        println!("✅ Viewer cannot generate: {e}");
    }

    let payroll = admin_client.generate(&january).await?;
    println!(
        "✅ Generated {} (id={}): base {} + allowances {} - deductions {} = net {}",
        payroll.ref_no,
        payroll.id,
        show(payroll.base_salary),
        show(payroll.allowance_total),
        show(payroll.deduction_total),
        show(payroll.net)
    );

    if let Err(e) = admin_client.generate(&january).await {
        println!("✅ Duplicate rejected: {e}");
    }

    // Lifecycle
    let paid = admin_client.mark_paid(payroll.id).await?;
    println!("✅ Payroll {} is now {}", paid.ref_no, paid.status);

    if let Err(e) = admin_client.cancel(payroll.id).await {
        println!("✅ Paid payroll cannot be cancelled: {e}");
    }

    // List
    let page = viewer_client.list_payrolls(&PayrollFilter::default()).await?;
    println!("\n📋 All payrolls:");
    for p in page.data {
        println!(
            "   - {} {} {}..{} [{}]: {}",
            p.ref_no,
            p.period_type,
            p.date_from,
            p.date_to,
            p.status,
            show(p.net)
        );
    }

    println!("\n🎉 Example completed successfully!");

    Ok(())
}
