/// # bu-reconcile CLI Interface (Module)
///
/// Command parsing and the async entrypoint. Reconciliation logic lives in
/// [`bu-reconcile-core`]; this module only wires flags, config and the HTTP transport together
/// and turns the outcome into output and an exit status.
///
/// ## Commands
/// - `apply --config <file>`: reconcile the resource declared in a YAML file.
/// - `list <kind>`: print every remote record of a kind as JSON.
///
/// [`bu-reconcile-core`]: ../../bu-reconcile-core/
use crate::load_config::{load_config, resolve_connection, Connection, Overrides};
use crate::transport::HttpTransport;
use anyhow::{Context, Result};
use bu_reconcile_core::client::ApiClient;
use bu_reconcile_core::model::{ResourceKind, State};
use bu_reconcile_core::reconcile::Reconciler;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// CLI for bu-reconcile: keep Better Uptime resources in their declared state.
#[derive(Parser)]
#[clap(
    name = "bu-reconcile",
    version,
    about = "Reconcile Better Uptime monitors and status pages against a declared state"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command that talks to the API.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// API bearer token (falls back to BU_API_TOKEN)
    #[clap(long)]
    pub token: Option<String>,

    /// Require TLS certificate validation (falls back to BU_VALIDATE_CERTS, default true)
    #[clap(long, action = clap::ArgAction::Set)]
    pub validate_certs: Option<bool>,

    /// Proxy for HTTPS requests (falls back to https_proxy / HTTPS_PROXY)
    #[clap(long)]
    pub https_proxy: Option<String>,

    /// Request timeout in seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Alternative API root (falls back to BU_API_BASE_URL)
    #[clap(long, hide = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the resource declared in a YAML file
    Apply {
        /// Path to the YAML file describing the desired resource
        #[clap(long)]
        config: PathBuf,

        /// Whether the resource should exist: present or absent
        #[clap(long)]
        state: Option<State>,

        /// Restrict the lookup to this remote id
        #[clap(long)]
        id: Option<u64>,

        /// Comma-separated fields that identify the resource
        #[clap(long, value_delimiter = ',')]
        check_for: Option<Vec<String>>,

        /// Decide and report without changing anything
        #[clap(long)]
        dry_run: bool,

        #[clap(flatten)]
        connection: ConnectionArgs,
    },
    /// Print every remote record of a resource kind as JSON
    List {
        /// monitors or status-pages
        kind: ResourceKind,

        /// Fetch a single record
        #[clap(long)]
        id: Option<u64>,

        #[clap(flatten)]
        connection: ConnectionArgs,
    },
}

impl ConnectionArgs {
    fn into_overrides(self) -> Overrides {
        Overrides {
            token: self.token,
            validate_certs: self.validate_certs,
            https_proxy: self.https_proxy,
            timeout: self.timeout.map(Duration::from_secs),
            base_url: self.base_url,
            ..Overrides::default()
        }
    }
}

fn build_client(connection: Connection) -> Result<ApiClient<HttpTransport>> {
    let transport = HttpTransport::new(&connection.transport)?;
    let client = ApiClient::new(transport, connection.token);
    Ok(match connection.base_url {
        Some(base_url) => client.with_base_url(base_url),
        None => client,
    })
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Apply {
            config,
            state,
            id,
            check_for,
            dry_run,
            connection,
        } => {
            let overrides = Overrides {
                state,
                id,
                check_for,
                dry_run,
                ..connection.into_overrides()
            };
            let invocation = load_config(&config, &overrides)?;
            tracing::info!(command = "apply", kind = %invocation.request.record.kind(), "Starting reconciliation");

            let reconciler = Reconciler::new(build_client(invocation.connection)?);
            let outcome = reconciler.reconcile(&invocation.request).await;

            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
            );

            if outcome.failed {
                tracing::error!(command = "apply", msg = ?outcome.msg, "Reconciliation failed");
                anyhow::bail!(
                    "Reconciliation failed: {}",
                    outcome.msg.as_deref().unwrap_or("unknown error")
                );
            }
            tracing::info!(command = "apply", changed = outcome.changed, "Reconciliation complete");
            Ok(())
        }
        Commands::List {
            kind,
            id,
            connection,
        } => {
            let overrides = connection.into_overrides();
            let connection = resolve_connection(kind, &overrides, None, None, None)?;
            let client = build_client(connection)?;

            tracing::info!(command = "list", kind = %kind, "Listing remote records");
            let records = client
                .fetch_all(kind, id)
                .await
                .with_context(|| format!("Failed to list {kind}"))?;

            println!(
                "{}",
                serde_json::to_string_pretty(&records).context("Failed to serialise records")?
            );
            Ok(())
        }
    }
}
