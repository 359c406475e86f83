use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use microtunnel::{Credential, SessionInfo, TunnelClient, TunnelConfig};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "microtunnel", about = "Provision and check microtunnel clients")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh credential record as JSON
    CredGenerate,
    /// Load a credential and registry and list the resolved servers
    Check {
        #[arg(long, env = "APP_CRED")]
        cred: PathBuf,
        #[arg(long, env = "AUTH_SRVS")]
        servers: PathBuf,
        #[arg(long, default_value = "/microtunnel")]
        api_prefix: String,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Also handshake with every logical server
        #[arg(long)]
        connect: bool,
    },
}

#[derive(Serialize)]
struct EndpointSummary<'a> {
    index: usize,
    url: &'a str,
    agent: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::CredGenerate => {
            let record = Credential::generate().to_record();
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("failed to encode credential")?
            );
        }
        Command::Check {
            cred,
            servers,
            api_prefix,
            timeout_ms,
            connect,
        } => {
            let config = TunnelConfig::builder()
                .credential_file(cred)
                .registry_file(servers)
                .api_prefix(api_prefix)
                .request_timeout(Duration::from_millis(timeout_ms))
                .build()
                .context("failed to load configuration")?;
            let client = TunnelClient::new(config).context("failed to build client")?;
            info!(agent = %client.config().credential.agent(), "credential loaded");

            let summary: BTreeMap<&str, Vec<EndpointSummary<'_>>> = client
                .registry()
                .iter()
                .map(|(name, endpoints)| {
                    let endpoints = endpoints
                        .iter()
                        .enumerate()
                        .map(|(index, e)| EndpointSummary {
                            index,
                            url: e.url(),
                            agent: e.agent(),
                        })
                        .collect();
                    (name, endpoints)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if connect {
                let mut sessions: BTreeMap<String, SessionInfo> = BTreeMap::new();
                let mut failed = 0usize;
                for name in client.server_names() {
                    match client.connect(name).await {
                        Ok(session) => {
                            sessions.insert(name.to_string(), session);
                        }
                        Err(e) => {
                            warn!(server = %name, error = %e, "connect failed");
                            failed += 1;
                        }
                    }
                }
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                if failed > 0 {
                    anyhow::bail!("{failed} server(s) unreachable");
                }
            }
        }
    }
    Ok(())
}
