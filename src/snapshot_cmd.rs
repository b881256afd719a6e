//! One-time snapshot ingestion (`mqa snapshot init`).
//!
//! Fetches the full message set from the remote API and writes the
//! durable NDJSON snapshot. The snapshot is write-once: if the file
//! already exists the command refuses to touch it, since every later
//! load treats it as the permanent baseline.

use anyhow::{bail, Result};
use std::io::Write;

use crate::config::Config;
use crate::models::Message;
use crate::store::{HttpRemoteClient, RemoteClient};

pub async fn run_snapshot_init(config: &Config) -> Result<()> {
    let path = &config.snapshot.path;

    if path.exists() {
        bail!(
            "Snapshot already exists at {} and is write-once; it will not be overwritten. \
             Use `mqa refresh --force` to refresh the in-memory cache instead.",
            path.display()
        );
    }

    println!("Fetching messages from {} ...", config.remote.base_url);
    let client = HttpRemoteClient::new(&config.remote)?;
    let messages = client.fetch_all_messages().await?;

    if messages.is_empty() {
        bail!("Remote API returned no messages; snapshot not written.");
    }

    write_snapshot(path, &messages)?;

    println!(
        "Wrote {} messages to {}",
        messages.len(),
        path.display()
    );

    // Per-member breakdown, most active first.
    let mut counts: Vec<(String, usize)> = {
        let mut map = std::collections::HashMap::new();
        for msg in &messages {
            *map.entry(msg.user_name.clone()).or_insert(0usize) += 1;
        }
        map.into_iter().collect()
    };
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    println!("\nMessages per member:");
    for (name, count) in counts {
        println!("  {}: {}", name, count);
    }

    Ok(())
}

fn write_snapshot(path: &std::path::Path, messages: &[Message]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;
    for msg in messages {
        serde_json::to_writer(&mut file, msg)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(())
}
