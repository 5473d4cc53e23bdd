use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[zbus::proxy(
    interface = "org.presence.Attendance1",
    default_service = "org.presence.Attendance1",
    default_path = "/org/presence/Attendance1"
)]
trait Attendance {
    async fn enroll(&self, name: &str, email: &str, descriptor: &str) -> zbus::Result<String>;
    async fn submit(&self, descriptor: &str, captured_at: &str, metrics: &str) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn history(&self, email: &str, limit: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "presence", about = "Presence face attendance CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    /// Print raw JSON replies
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from one or more descriptor files
    Enroll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        /// JSON file holding a descriptor array; repeat to average several captures
        #[arg(short, long = "descriptor", required = true)]
        descriptors: Vec<PathBuf>,
    },
    /// Submit a captured descriptor for check-in / check-out
    Submit {
        /// JSON file holding the probe descriptor array
        #[arg(short, long)]
        descriptor: PathBuf,
        /// Capture time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Detector confidence for the capture
        #[arg(long)]
        accuracy: Option<f32>,
        /// Detection latency in milliseconds
        #[arg(long)]
        latency_ms: Option<f64>,
    },
    /// List enrolled identities
    List,
    /// Show recent attendance events for an identity
    History {
        email: String,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Show daemon status
    Status,
}

fn read_descriptor(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    if !value.is_array() {
        bail!("{}: descriptor must be a JSON array", path.display());
    }
    Ok(value)
}

fn metrics_json(accuracy: Option<f32>, latency_ms: Option<f64>) -> String {
    if accuracy.is_none() && latency_ms.is_none() {
        return String::new();
    }
    serde_json::json!({ "accuracy": accuracy, "latencyMs": latency_ms }).to_string()
}

fn print_outcome(reply: &Value) {
    let name = reply["identity"]["name"].as_str().unwrap_or("?");
    match reply["outcome"].as_str() {
        Some("MATCHED_CHECK_IN") => println!("Checked in: {name}"),
        Some("MATCHED_CHECK_OUT") => println!("Checked out: {name}"),
        Some("TOO_SOON") => {
            let minutes = reply["minutes_remaining"].as_f64().unwrap_or(0.0);
            println!("{name} already checked in; check-out possible in {minutes:.1} min");
        }
        Some("NO_MATCH") => println!("Face not recognized. Please enroll first."),
        _ => println!("{reply}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("presenced not reachable")?;

    let reply = match &cli.command {
        Commands::Enroll {
            name,
            email,
            descriptors,
        } => {
            let samples = descriptors
                .iter()
                .map(|p| read_descriptor(p))
                .collect::<Result<Vec<_>>>()?;
            let payload = if samples.len() == 1 {
                samples[0].to_string()
            } else {
                Value::Array(samples).to_string()
            };
            tracing::debug!(samples = descriptors.len(), "enrolling");
            proxy.enroll(name, email, &payload).await?
        }
        Commands::Submit {
            descriptor,
            at,
            accuracy,
            latency_ms,
        } => {
            let probe = read_descriptor(descriptor)?;
            let captured_at = at
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
            proxy
                .submit(
                    &probe.to_string(),
                    &captured_at,
                    &metrics_json(*accuracy, *latency_ms),
                )
                .await?
        }
        Commands::List => proxy.list_identities().await?,
        Commands::History { email, limit } => proxy.history(email, *limit).await?,
        Commands::Status => proxy.status().await?,
    };

    let value: Value = serde_json::from_str(&reply).context("daemon returned invalid JSON")?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match &cli.command {
        Commands::Enroll { .. } => println!(
            "Enrolled {} <{}> as {}",
            value["name"].as_str().unwrap_or("?"),
            value["email"].as_str().unwrap_or("?"),
            value["id"].as_str().unwrap_or("?")
        ),
        Commands::Submit { .. } => print_outcome(&value),
        Commands::List => match value.as_array() {
            Some(list) if !list.is_empty() => {
                for identity in list {
                    println!(
                        "{}  {} <{}>",
                        identity["id"].as_str().unwrap_or("?"),
                        identity["name"].as_str().unwrap_or("?"),
                        identity["email"].as_str().unwrap_or("?")
                    );
                }
            }
            _ => println!("No identities enrolled"),
        },
        Commands::History { .. } => {
            let events = value["events"].as_array().cloned().unwrap_or_default();
            if events.is_empty() {
                println!("No attendance recorded");
            }
            for event in events {
                println!(
                    "{}  {:<9}  similarity {:.3}",
                    event["timestamp"].as_str().unwrap_or("?"),
                    event["kind"].as_str().unwrap_or("?"),
                    event["similarity"].as_f64().unwrap_or(0.0)
                );
            }
        }
        Commands::Status => println!("{}", serde_json::to_string_pretty(&value)?),
    }

    Ok(())
}
