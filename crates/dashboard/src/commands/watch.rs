// Watch command - keep a view current from the broadcast channels
//
// Subscribes to both channels, renders the view once, then refetches only the
// planned props after each status event. Ctrl-C drops both streams, which closes
// the connections and unsubscribes.

use anyhow::{bail, Result};
use futures::{stream, StreamExt};
use lendwise_core::{LOANS_CHANNEL, TRANSACTIONS_CHANNEL};
use tracing::info;

use crate::client::Client;
use crate::live::{LiveView, View};
use crate::output::{self, OutputFormat};

pub async fn run(client: &Client, format: OutputFormat, view: View, notify: bool) -> Result<()> {
    let loans = client.subscribe(LOANS_CHANNEL).await?;
    let transactions = client.subscribe(TRANSACTIONS_CHANNEL).await?;
    let mut events = stream::select(Box::pin(loans), Box::pin(transactions));
    info!(?view, "Subscribed to {} and {}", LOANS_CHANNEL, TRANSACTIONS_CHANNEL);

    let mut live = LiveView::new(view);
    let initial = client.dashboard(&live.view().props()).await?;
    output::print_dashboard(format, &initial)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, unsubscribing");
                break;
            }
            next = events.next() => {
                let event = match next {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => return Err(e.into()),
                    None => bail!("Server closed the channel streams"),
                };

                let Some(update) = live.on_event(&event) else {
                    continue;
                };
                if notify {
                    output::print_notice(format, &update.notice);
                }
                if update.props.is_empty() {
                    continue;
                }
                let data = client.dashboard(&update.props).await?;
                output::print_dashboard(format, &data)?;
            }
        }
    }

    drop(events);
    Ok(())
}
