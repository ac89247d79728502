use std::sync::Arc;

use complaint_wall::config::AppConfig;
use complaint_wall::feed::FeedClient;
use complaint_wall::feed::hosted::HostedFeed;
use complaint_wall::feed::memory::MemoryHub;
use complaint_wall::view;
use complaint_wall::wall::session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    // Logs go to stderr; stdout belongs to the rendered wall.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = AppConfig::from_env()?;
    let feed: Arc<dyn FeedClient> = match &config.feed {
        Some(feed_config) => {
            tracing::info!(url = %feed_config.url, table = %feed_config.table, "using hosted feed");
            Arc::new(HostedFeed::new(feed_config)?)
        }
        None => {
            tracing::info!("no feed url configured; running offline");
            Arc::new(MemoryHub::new().client())
        }
    };

    let wall = session::mount(feed, config.wall);
    let mut snapshots = wall.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let frame = view::render(&snapshots.borrow_and_update());
    stdout.write_all(frame.as_bytes()).await?;
    stdout.flush().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !wall.keystroke(line).await || !wall.submit().await {
                    break;
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = view::render(&snapshots.borrow_and_update());
                stdout.write_all(b"\n").await?;
                stdout.write_all(frame.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
    }

    wall.unmount().await;
    Ok(())
}
