// Stats command - print the counters once

use crate::client::Client;
use crate::output::{self, OutputFormat};
use anyhow::Result;

pub async fn run(client: &Client, format: OutputFormat) -> Result<()> {
    let stats = client.stats().await?;
    if format.is_text() {
        output::print_stats(&stats);
    } else {
        format.print_value(&stats)?;
    }
    Ok(())
}
