//! Payroll CLI
//!
//! Command-line interface for the Payroll API.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use payroll_client::PayrollClient;
use payroll_types::{
    EmployeeId, GeneratePayrollRequest, PayrollFilter, PayrollId, PayrollStatus, PeriodType,
    PreviewPayrollRequest, Role,
};

#[derive(Parser)]
#[command(name = "payroll")]
#[command(author, version, about = "Payroll API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the Payroll API
    #[arg(long, env = "PAYROLL_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "PAYROLL_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Payroll operations
    Payroll {
        #[command(subcommand)]
        action: PayrollCommands,
    },
    /// API key management
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Bootstrap the first API key
    Bootstrap {
        /// Name for the new API key
        #[arg(long, default_value = "bootstrap-key")]
        name: String,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum PayrollCommands {
    /// Generate a PENDING payroll
    Generate {
        /// Employee ID (UUID)
        #[arg(long)]
        user_id: EmployeeId,
        /// Unique reference number
        #[arg(long)]
        ref_no: String,
        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day of the period (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
        /// MONTHLY or SEMI_MONTHLY
        #[arg(long, default_value = "MONTHLY")]
        period_type: PeriodType,
        #[arg(long, default_value_t = 0)]
        present: i32,
        #[arg(long, default_value_t = 0)]
        absent: i32,
        #[arg(long, default_value_t = 0)]
        late: i32,
    },
    /// Compute a payroll without recording it
    Preview {
        #[arg(long)]
        user_id: EmployeeId,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, default_value = "MONTHLY")]
        period_type: PeriodType,
    },
    /// Get payroll details
    Get {
        /// Payroll ID (UUID)
        id: PayrollId,
    },
    /// List payrolls
    List {
        #[arg(long)]
        user_id: Option<EmployeeId>,
        /// PENDING, PAID or CANCELLED
        #[arg(long)]
        status: Option<PayrollStatus>,
        #[arg(long)]
        period_type: Option<PeriodType>,
        /// Substring of the reference number
        #[arg(long)]
        ref_no: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Mark a payroll as paid
    Pay { id: PayrollId },
    /// Cancel a payroll
    Cancel { id: PayrollId },
    /// Set a payroll's status through the generic update route
    Update {
        id: PayrollId,
        /// PAID or CANCELLED
        #[arg(long)]
        status: PayrollStatus,
    },
    /// Delete a pending payroll
    Delete { id: PayrollId },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key
    Create {
        /// Name for the new key
        #[arg(long)]
        name: String,
        /// PAYROLL_ADMIN or VIEWER
        #[arg(long, default_value = "VIEWER")]
        role: Role,
    },
    /// List all API keys
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = PayrollClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Payroll { action } => match action {
            PayrollCommands::Generate {
                user_id,
                ref_no,
                from,
                to,
                period_type,
                present,
                absent,
                late,
            } => {
                let req = GeneratePayrollRequest {
                    user_id,
                    ref_no,
                    date_from: from,
                    date_to: to,
                    period_type,
                    present,
                    absent,
                    late,
                };
                let payroll = client.generate(&req).await?;
                println!("{}", serde_json::to_string_pretty(&payroll)?);
            }
            PayrollCommands::Preview {
                user_id,
                from,
                to,
                period_type,
            } => {
                let req = PreviewPayrollRequest {
                    user_id,
                    date_from: from,
                    date_to: to,
                    period_type,
                };
                let preview = client.preview(&req).await?;
                println!("{}", serde_json::to_string_pretty(&preview)?);
            }
            PayrollCommands::Get { id } => {
                let payroll = client.get_payroll(id).await?;
                println!("{}", serde_json::to_string_pretty(&payroll)?);
            }
            PayrollCommands::List {
                user_id,
                status,
                period_type,
                ref_no,
                page,
                limit,
            } => {
                let filter = PayrollFilter {
                    user_id,
                    status,
                    period_type,
                    ref_no,
                    page,
                    limit,
                };
                let payrolls = client.list_payrolls(&filter).await?;
                println!("{}", serde_json::to_string_pretty(&payrolls)?);
            }
            PayrollCommands::Pay { id } => {
                let payroll = client.mark_paid(id).await?;
                println!("{}", serde_json::to_string_pretty(&payroll)?);
            }
            PayrollCommands::Cancel { id } => {
                let payroll = client.cancel(id).await?;
                println!("{}", serde_json::to_string_pretty(&payroll)?);
            }
            PayrollCommands::Update { id, status } => {
                let payroll = client.set_status(id, status).await?;
                println!("{}", serde_json::to_string_pretty(&payroll)?);
            }
            PayrollCommands::Delete { id } => {
                client.remove(id).await?;
                println!("✓ Payroll deleted");
            }
        },

        Commands::Key { action } => match action {
            KeyCommands::Create { name, role } => {
                let created = client.create_api_key(&name, role).await?;
                println!("{}", created.api_key);
            }
            KeyCommands::List => {
                let keys = client.list_api_keys().await?;
                println!("{}", serde_json::to_string_pretty(&keys)?);
            }
        },

        Commands::Bootstrap { name } => {
            let created = client.bootstrap(&name).await?;
            println!("{}", created.api_key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_generate() {
        let cli = Cli::try_parse_from([
            "payroll",
            "payroll",
            "generate",
            "--user-id",
            "6f1c1f2e-5a7b-4d8e-9c0a-1b2c3d4e5f60",
            "--ref-no",
            "PAY-001",
            "--from",
            "2025-01-01",
            "--to",
            "2025-01-15",
            "--period-type",
            "semi_monthly",
        ])
        .unwrap();

        match cli.command {
            Commands::Payroll {
                action:
                    PayrollCommands::Generate {
                        period_type, to, ..
                    },
            } => {
                assert_eq!(period_type, PeriodType::SemiMonthly);
                assert_eq!(to, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
            }
            _ => panic!("expected payroll generate"),
        }
    }

    #[test]
    fn test_rejects_unknown_role() {
        let result = Cli::try_parse_from(["payroll", "key", "create", "--name", "x", "--role", "ROOT"]);
        assert!(result.is_err());
    }
}
