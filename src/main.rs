//! `service-ledger` - command-line host for the service request contract.
//!
//! Every command runs as one ledger transaction against a local sled database.
//! Settings come from flags or environment variables:
//!
//! - `SERVICE_LEDGER_DB` - database path (default: `service-ledger.db`)
//! - `SERVICE_LEDGER_ADMIN_MSP` - administrative organization (default: `Org1MSP`)
//! - `SERVICE_LEDGER_CLIENT_ID` - caller client id
//! - `SERVICE_LEDGER_MSP_ID` - caller organization

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use service_ledger::config::DEFAULT_ADMIN_MSP;
use service_ledger::history::HistoryEntry;
use service_ledger::{
    ContractConfig, ServiceContract, ServiceRecord, SledLedger, StaticIdentity,
    TransactionContext, utils,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "service-ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ledger database path.
    #[arg(long, env = "SERVICE_LEDGER_DB", default_value = "service-ledger.db")]
    db: PathBuf,

    /// Organization allowed to change status and delete requests.
    #[arg(long, env = "SERVICE_LEDGER_ADMIN_MSP", default_value = DEFAULT_ADMIN_MSP)]
    admin_msp: String,

    /// Caller client id. A fresh one is issued when absent.
    #[arg(long, env = "SERVICE_LEDGER_CLIENT_ID")]
    client_id: Option<String>,

    /// Caller organization.
    #[arg(long, env = "SERVICE_LEDGER_MSP_ID")]
    msp_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Submit a new service request from a JSON payload.
    Create { payload: String },
    /// Print the stored request, or nothing when absent.
    Read { type_of_service: String, phone: String },
    /// Overwrite the status of a request.
    SetStatus {
        type_of_service: String,
        phone: String,
        status: String,
    },
    /// Withdraw a request.
    Withdraw {
        type_of_service: String,
        phone: String,
        /// Accepted for compatibility, not used.
        status: Option<String>,
    },
    /// Soft-delete a request.
    Delete {
        type_of_service: String,
        phone: String,
        /// Accepted for compatibility, not used.
        status: Option<String>,
    },
    /// Print the caller organization and client id.
    Whoami,
    /// List stored requests.
    List {
        /// Only requests of this category.
        #[arg(long = "type")]
        type_of_service: Option<String>,
    },
    /// Print every committed version of a request.
    History { type_of_service: String, phone: String },
}

impl Cli {
    fn identity(&self) -> Result<StaticIdentity> {
        let mut identity = StaticIdentity::anonymous();
        let client_id = match &self.client_id {
            Some(id) => id.clone(),
            None => utils::new_client_id().context("failed to issue client id")?,
        };
        identity = identity.with_client_id(&client_id);
        if let Some(msp_id) = &self.msp_id {
            identity = identity.with_msp_id(msp_id);
        }
        Ok(identity)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let ledger = SledLedger::open(&cli.db)
        .with_context(|| format!("failed to open ledger at {}", cli.db.display()))?;
    let contract = ServiceContract::new(ContractConfig::new(&cli.admin_msp));
    let identity = cli.identity()?;

    match &cli.command {
        Commands::Create { payload } => {
            let record = ledger.submit(|stub| {
                contract.create(&TransactionContext::new(stub, &identity), payload.as_bytes())
            })?;
            print_record(&record)?;
        }
        Commands::Read {
            type_of_service,
            phone,
        } => {
            let bytes = ledger.submit(|stub| {
                contract.read(&TransactionContext::new(stub, &identity), type_of_service, phone)
            })?;
            println!("{}", String::from_utf8_lossy(&bytes.unwrap_or_default()));
        }
        Commands::SetStatus {
            type_of_service,
            phone,
            status,
        } => {
            let record = ledger.submit(|stub| {
                contract.set_status(
                    &TransactionContext::new(stub, &identity),
                    type_of_service,
                    phone,
                    status,
                )
            })?;
            print_record(&record)?;
        }
        Commands::Withdraw {
            type_of_service,
            phone,
            ..
        } => {
            let record = ledger.submit(|stub| {
                contract.withdraw(&TransactionContext::new(stub, &identity), type_of_service, phone)
            })?;
            print_record(&record)?;
        }
        Commands::Delete {
            type_of_service,
            phone,
            ..
        } => {
            let record = ledger.submit(|stub| {
                contract.delete(&TransactionContext::new(stub, &identity), type_of_service, phone)
            })?;
            print_record(&record)?;
        }
        Commands::Whoami => {
            let (msp_id, client_id) = ledger
                .submit(|stub| contract.whoami(&TransactionContext::new(stub, &identity)))?;
            println!("{msp_id}\n{client_id}");
        }
        Commands::List { type_of_service } => {
            for record in contract.list(&ledger, type_of_service.as_deref())? {
                print_record(&record)?;
            }
        }
        Commands::History {
            type_of_service,
            phone,
        } => {
            for entry in contract.history(&ledger, type_of_service, phone)? {
                print_history(&entry);
            }
        }
    }

    ledger.flush().context("failed to flush ledger")?;
    Ok(())
}

fn print_record(record: &ServiceRecord) -> Result<()> {
    let bytes = record.encode().context("failed to encode service record")?;
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

fn print_history(entry: &HistoryEntry) {
    println!(
        "{} {} {} {}",
        entry.timestamp.to_datetime_utc().to_rfc3339(),
        entry.tx_id,
        entry.value_hash,
        String::from_utf8_lossy(&entry.value)
    );
}
