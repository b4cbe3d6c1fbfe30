use anyhow::{bail, Result};
use chrono::{Duration, SecondsFormat, Utc};
use clap::Parser;

use ds_mcp_gateway::credentials::{generate_key, key_prefix, DEFAULT_KEY_PREFIX};

/// Generates API keys for the MCP gateway.
#[derive(Parser, Debug)]
#[clap(version = ds_mcp_gateway::VERSION)]
struct CliArgs {
    /// Prefix put in front of every key.
    #[clap(long, default_value = DEFAULT_KEY_PREFIX)]
    pub prefix: String,

    /// How many keys to generate.
    #[clap(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Print `[[api_keys]]` records ready to paste into the TOML config.
    #[clap(long)]
    pub toml: bool,

    /// Label stored with the TOML records.
    #[clap(long, requires = "toml")]
    pub label: Option<String>,

    /// Expiry of the TOML records, in days from now.
    #[clap(long, requires = "toml")]
    pub expires_in_days: Option<i64>,
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("Key prefix must not be empty");
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        bail!("Key prefix may only contain ASCII letters, digits and '-'");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    validate_prefix(&args.prefix)?;
    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let expires_at = args
        .expires_in_days
        .map(|days| (Utc::now() + Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true));

    for i in 0..args.count {
        let key = generate_key(&args.prefix);
        if args.toml {
            if i > 0 {
                println!();
            }
            println!("# log prefix: {}", key_prefix(&key));
            println!("[[api_keys]]");
            println!("key = {:?}", key);
            if let Some(label) = &args.label {
                println!("label = {:?}", label);
            }
            if let Some(expires_at) = &expires_at {
                println!("expires_at = {:?}", expires_at);
            }
        } else {
            println!("{}\t{}", key, key_prefix(&key));
        }
    }

    Ok(())
}
