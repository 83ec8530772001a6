//! CLI output formatting: plain text for pipelines, JSON for tooling.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

pub fn print_json<T: Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// Render a search result set: one hex uuid per line, or a JSON array.
pub fn print_results(fmt: OutputFormat, uuids: &[[u8; 16]]) -> Result<()> {
    if fmt.is_json() {
        let ids: Vec<String> = uuids.iter().map(hex::encode).collect();
        print_json(&serde_json::json!({ "results": ids }))?;
    } else {
        for uuid in uuids {
            println!("{}", hex::encode(uuid));
        }
    }
    Ok(())
}
