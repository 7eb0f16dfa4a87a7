//! Exhibit Admin
//!
//! Operator tool for a room full of exhibit tags. Finds tags by the service
//! UUID they advertise and reads or rewrites their attributes over Bluetooth
//! LE.
//!
//! # Commands
//!
//! - `list` - Names of every tag in range
//! - `counts` - Visit count of every tag in range, as a bar chart
//! - `get-url <name>` - URL stored on a tag
//! - `set-url <name> <url>` - Rewrite a tag's URL (resets its visit count)
//! - `rename <old> <new>` - Rename a tag
//!
//! # Environment Variables
//!
//! - `EXHIBIT_SCAN_SECS`: Optional. How long to scan for tags (default: 5)
//! - `EXHIBIT_OP_TIMEOUT_SECS`: Optional. Limit per attribute operation (default: 15)
//! - `RUST_LOG`: Optional. Logging level (default: warn)

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use exhibit_core::{AttributeId, SERVICE_UUID};
use futures::{pin_mut, StreamExt};
use tracing::{debug, info, warn};

/// Environment variable names
mod env_vars {
    pub const SCAN_SECS: &str = "EXHIBIT_SCAN_SECS";
    pub const OP_TIMEOUT_SECS: &str = "EXHIBIT_OP_TIMEOUT_SECS";
}

/// Default configuration values
mod defaults {
    pub const SCAN_SECS: u64 = 5;
    pub const OP_TIMEOUT_SECS: u64 = 15;
    pub const BAR_WIDTH: u32 = 40;
}

/// Shown when a tag has never been given a URL.
const NO_URL: &str = "No URL set";

/// Errors reported to the operator.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}\n\n{usage}", usage = USAGE)]
    Usage(String),

    #[error("No device found with name {0:?}")]
    DeviceNotFound(String),

    #[error("Operation timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("Tag does not expose the {0} attribute")]
    AttributeMissing(AttributeId),

    #[error("Visit count must be 4 bytes, got {0}")]
    InvalidCount(usize),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),
}

const USAGE: &str = "\
Usage: exhibit-admin <command>

Commands:
    list                    List tags in range
    counts                  Show visit counts of tags in range
    get-url <name>          Show the URL stored on a tag
    set-url <name> <url>    Rewrite a tag's URL
    rename <old> <new>      Rename a tag
    help                    Show this message";

/// Configuration for the admin tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long discovery runs
    pub scan: Duration,

    /// Limit on connecting plus one attribute read or write
    pub op_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .unwrap_or(default)
        };

        Self {
            scan: Duration::from_secs(secs(env_vars::SCAN_SECS, defaults::SCAN_SECS)),
            op_timeout: Duration::from_secs(secs(
                env_vars::OP_TIMEOUT_SECS,
                defaults::OP_TIMEOUT_SECS,
            )),
        }
    }
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Counts,
    GetUrl { name: String },
    SetUrl { name: String, url: String },
    Rename { old: String, new: String },
    Help,
}

impl Command {
    /// Parse the arguments following the program name
    pub fn parse(args: &[String]) -> Result<Self, AdminError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match args.as_slice() {
            [] | ["help" | "--help" | "-h"] => Self::Help,
            ["list"] => Self::List,
            ["counts"] => Self::Counts,
            ["get-url", name] => Self::GetUrl {
                name: (*name).to_string(),
            },
            ["set-url", name, url] => Self::SetUrl {
                name: (*name).to_string(),
                url: (*url).to_string(),
            },
            ["rename", old, new] => Self::Rename {
                old: (*old).to_string(),
                new: (*new).to_string(),
            },
            [cmd @ ("get-url" | "set-url" | "rename"), ..] => {
                return Err(AdminError::Usage(format!(
                    "Wrong number of arguments for {cmd}"
                )))
            }
            [cmd, ..] => return Err(AdminError::Usage(format!("Unknown command: {cmd}"))),
        };
        Ok(command)
    }
}

/// Decode the visit-count attribute.
pub fn decode_count(bytes: &[u8]) -> Result<u32, AdminError> {
    let bytes: [u8; 4] = bytes
        .try_into()
        .map_err(|_| AdminError::InvalidCount(bytes.len()))?;
    Ok(u32::from_be_bytes(bytes))
}

/// Render the URL attribute for display.
pub fn describe_url(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        NO_URL.to_string()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Render visit counts as a horizontal bar chart.
pub fn render_counts(counts: &[(String, u32)]) -> String {
    let label_width = counts.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let max = counts.iter().map(|&(_, count)| count).max().unwrap_or(0);

    counts
        .iter()
        .map(|(name, count)| {
            let bar = if max == 0 {
                0
            } else {
                let scaled = u64::from(*count) * u64::from(defaults::BAR_WIDTH) / u64::from(max);
                usize::try_from(scaled).unwrap_or(0)
            };
            format!("{name:<label_width$}  {count:>6} {}\n", "#".repeat(bar))
        })
        .collect()
}

/// A tag found during discovery
#[derive(Clone)]
pub struct Tag {
    pub name: String,
    pub device: Device,
}

/// BLE central that talks to exhibit tags
pub struct TagClient {
    _session: Session,
    adapter: Adapter,
    config: Config,
}

impl TagClient {
    /// Open the default adapter and power it on
    pub async fn new(config: Config) -> Result<Self, AdminError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        debug!(adapter = %adapter.name(), "Using Bluetooth adapter");
        Ok(Self {
            _session: session,
            adapter,
            config,
        })
    }

    /// Scan for tags advertising the exhibit service
    pub async fn discover(&self) -> Result<Vec<Tag>, AdminError> {
        info!(secs = self.config.scan.as_secs(), "Scanning for tags");
        let events = self.adapter.discover_devices().await?;
        pin_mut!(events);

        let deadline = tokio::time::sleep(self.config.scan);
        tokio::pin!(deadline);

        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) if seen.insert(address) => {
                        if let Some(tag) = self.inspect(address).await {
                            debug!(name = %tag.name, %address, "Found tag");
                            tags.push(tag);
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn inspect(&self, address: Address) -> Option<Tag> {
        let probe = async {
            let device = self.adapter.device(address)?;
            let uuids = device.uuids().await?.unwrap_or_default();
            if !uuids.contains(&SERVICE_UUID) {
                return Ok(None);
            }
            let name = device.name().await?.unwrap_or_default();
            Ok::<_, bluer::Error>(Some(Tag { name, device }))
        };

        match probe.await {
            Ok(tag) => tag,
            Err(err) => {
                debug!(%address, %err, "Skipping device");
                None
            }
        }
    }

    /// Find a tag by its advertised name
    pub async fn find(&self, name: &str) -> Result<Tag, AdminError> {
        self.discover()
            .await?
            .into_iter()
            .find(|tag| tag.name == name)
            .ok_or_else(|| AdminError::DeviceNotFound(name.to_string()))
    }

    /// Read an attribute
    pub async fn read(&self, tag: &Tag, attribute: AttributeId) -> Result<Vec<u8>, AdminError> {
        self.bounded(format!("read {attribute} from {}", tag.name), async {
            let characteristic = attribute_characteristic(&tag.device, attribute).await?;
            Ok::<_, AdminError>(characteristic.read().await?)
        })
        .await
    }

    /// Write an attribute
    pub async fn write(
        &self,
        tag: &Tag,
        attribute: AttributeId,
        value: &[u8],
    ) -> Result<(), AdminError> {
        self.bounded(format!("write {attribute} to {}", tag.name), async {
            let characteristic = attribute_characteristic(&tag.device, attribute).await?;
            Ok::<_, AdminError>(characteristic.write(value).await?)
        })
        .await
    }

    async fn bounded<T>(
        &self,
        operation: String,
        op: impl Future<Output = Result<T, AdminError>>,
    ) -> Result<T, AdminError> {
        let secs = self.config.op_timeout.as_secs();
        tokio::time::timeout(self.config.op_timeout, op)
            .await
            .map_err(|_| AdminError::Timeout { operation, secs })?
    }
}

async fn attribute_characteristic(
    device: &Device,
    attribute: AttributeId,
) -> Result<Characteristic, AdminError> {
    if !device.is_connected().await? {
        device.connect().await?;
    }

    for service in device.services().await? {
        if service.uuid().await? != SERVICE_UUID {
            continue;
        }
        for characteristic in service.characteristics().await? {
            if AttributeId::from_uuid(characteristic.uuid().await?) == Some(attribute) {
                return Ok(characteristic);
            }
        }
    }
    Err(AdminError::AttributeMissing(attribute))
}

async fn disconnect(tag: &Tag) {
    if let Err(err) = tag.device.disconnect().await {
        debug!(name = %tag.name, %err, "Disconnect failed");
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let client = TagClient::new(config)
        .await
        .context("Failed to open Bluetooth adapter")?;

    match command {
        Command::Help => {}
        Command::List => {
            for tag in client.discover().await? {
                println!("{}", tag.name);
            }
        }
        Command::Counts => {
            let mut counts = Vec::new();
            for tag in client.discover().await? {
                let count = client
                    .read(&tag, AttributeId::VisitCount)
                    .await
                    .and_then(|bytes| decode_count(&bytes));
                disconnect(&tag).await;
                match count {
                    Ok(count) => counts.push((tag.name, count)),
                    Err(err) => warn!(name = %tag.name, %err, "Could not read visit count"),
                }
            }
            print!("{}", render_counts(&counts));
        }
        Command::GetUrl { name } => {
            let tag = client.find(&name).await?;
            let url = client.read(&tag, AttributeId::Url).await;
            disconnect(&tag).await;
            println!("{}", describe_url(&url?));
        }
        Command::SetUrl { name, url } => {
            let tag = client.find(&name).await?;
            let current = client.read(&tag, AttributeId::Url).await;
            if let Ok(current) = &current {
                println!("Current URL: {}", describe_url(current));
            }
            let written = client.write(&tag, AttributeId::Url, url.as_bytes()).await;
            disconnect(&tag).await;
            written.context("URL may not have changed; run get-url to check")?;
            println!("URL successfully changed to {url}");
        }
        Command::Rename { old, new } => {
            let tag = client.find(&old).await?;
            let written = client
                .write(&tag, AttributeId::DeviceName, new.as_bytes())
                .await;
            disconnect(&tag).await;
            written.context("Name may not have changed; run list to check")?;
            println!("Device name successfully changed to {new}");
        }
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    let config = Config::from_env();
    debug!(?command, ?config, "Starting exhibit-admin");

    run(command, config).await
}
