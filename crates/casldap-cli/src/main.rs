//! casldap - look up and provision LDAP-backed user accounts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;


use casldap_core::PrivilegeGrant;
use casldap_db::{create_pool, run_migrations, PgUserRepository};
use casldap_directory::{AttributeResolver, Ldap3Connector, UserInitRegistry};
use crate::config::Settings;

/// Look up and provision LDAP-backed user accounts
#[derive(Debug, Parser)]
#[command(name = "casldap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Additional configuration file, read after config/default and config/local
    #[arg(long, short, global = true, env = "CASLDAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Look up one or more users in LDAP
    Lookup {
        #[arg(required = true)]
        tokens: Vec<String>,

        /// Retrieve all available LDAP attributes
        #[arg(long, short)]
        all: bool,
    },

    /// Create local user accounts populated from LDAP
    CreateUser {
        #[arg(required = true)]
        tokens: Vec<String>,

        /// Give the new accounts superuser and staff permissions
        #[arg(long)]
        admin: bool,

        /// Give the new accounts staff permissions
        #[arg(long, conflicts_with = "admin")]
        staff: bool,
    },
}

impl Commands {
    fn grant(admin: bool, staff: bool) -> PrivilegeGrant {
        if admin {
            PrivilegeGrant::Admin
        } else if staff {
            PrivilegeGrant::Staff
        } else {
            PrivilegeGrant::None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    settings
        .ldap
        .validate()
        .context("Invalid LDAP configuration")?;
    let ldap = Arc::new(settings.ldap);
    let connector = Arc::new(Ldap3Connector::new());

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let report = match cli.command {
        Commands::Lookup { tokens, all } => {
            commands::lookup(ldap, connector.as_ref(), &tokens, all, &mut stdout, &mut stderr)
                .await?
        }
        Commands::CreateUser {
            tokens,
            admin,
            staff,
        } => {
            info!("Connecting to PostgreSQL...");
            let pool = create_pool(&settings.database).await?;
            if settings.database.run_migrations {
                run_migrations(&pool).await?;
            }

            let users = Arc::new(PgUserRepository::new(pool));
            let resolver = AttributeResolver::from_registry(
                ldap,
                connector,
                users,
                &UserInitRegistry::with_defaults(),
            )?;

            let grant = Commands::grant(admin, staff);
            commands::create_users(&resolver, &tokens, grant, &mut stdout, &mut stderr).await?
        }
    };

    if report.all_failed() {
        bail!("all {} lookups failed", report.failed);
    }
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,casldap=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
