//! Thin CLI client for the admin API: builds a request and submits it
//! over HTTP against a running control plane.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "meshctl-admin", version, about = "meshctl control plane admin CLI")]
struct Cli {
    /// Base URL of the control plane admin API
    #[arg(long, env = "MESHCTL_ADMIN_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Admin bearer token (or set MESHCTL_ADMIN_TOKEN)
    #[arg(long, env = "MESHCTL_ADMIN_TOKEN")]
    token: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List devices on a virtual network
    ListDevices {
        #[arg(long)]
        network_id: Uuid,
    },
    /// Revoke a device
    RevokeDevice {
        #[arg(long)]
        device_id: Uuid,
    },
    /// List alerts for an org, optionally filtered by status
    ListAlerts {
        #[arg(long)]
        org_id: Uuid,
        #[arg(long)]
        status: Option<String>,
    },
    /// Acknowledge an alert
    AcknowledgeAlert {
        #[arg(long)]
        alert_id: Uuid,
    },
    /// Resolve an alert
    ResolveAlert {
        #[arg(long)]
        alert_id: Uuid,
    },
    /// Dashboard stats for a virtual network
    Stats {
        #[arg(long)]
        network_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let http = reqwest::Client::new();

    let (method, path, query) = match &cli.cmd {
        Commands::ListDevices { network_id } => {
            (reqwest::Method::GET, format!("/api/v1/admin/networks/{network_id}/devices"), vec![])
        }
        Commands::RevokeDevice { device_id } => {
            (reqwest::Method::DELETE, format!("/api/v1/admin/devices/{device_id}"), vec![])
        }
        Commands::ListAlerts { org_id, status } => {
            let query = status.as_ref().map(|s| vec![("status".to_string(), s.clone())]).unwrap_or_default();
            (reqwest::Method::GET, format!("/api/v1/admin/orgs/{org_id}/alerts"), query)
        }
        Commands::AcknowledgeAlert { alert_id } => {
            (reqwest::Method::POST, format!("/api/v1/admin/alerts/{alert_id}/acknowledge"), vec![])
        }
        Commands::ResolveAlert { alert_id } => {
            (reqwest::Method::POST, format!("/api/v1/admin/alerts/{alert_id}/resolve"), vec![])
        }
        Commands::Stats { network_id } => {
            (reqwest::Method::GET, format!("/api/v1/admin/networks/{network_id}/stats/dashboard"), vec![])
        }
    };

    let response = http
        .request(method, format!("{}{}", cli.url, path))
        .bearer_auth(&cli.token)
        .query(&query)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        eprintln!("{status}: {body}");
        std::process::exit(1);
    }
    println!("{body}");
    Ok(())
}
