//! Terminal consumer that polls a running feed service and prints updates.
//!
//! Env: FEED_BASE_URL (default http://127.0.0.1:8000), FEED_POLL_SECS (300),
//! FEED_CATEGORY (all), FEED_LIMIT (15).
//! Commands on stdin: `pause`, `resume`, `refresh`, `clear`, `quit`.

use std::sync::Arc;
use std::time::Duration;

use feed_sync::client::HttpFeedClient;
use feed_sync::feed::types::Category;
use feed_sync::{FeedScheduler, SchedulerCfg, SchedulerState};
use tokio::io::{AsyncBufReadExt, BufReader};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn print_state(s: &SchedulerState) {
    let when = s
        .last_updated
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "seed".into());
    println!(
        "[{when}] {} items, live={}, +{} -{} ={}{}",
        s.items.len(),
        s.is_real_time,
        s.sentiment.positive,
        s.sentiment.negative,
        s.sentiment.neutral,
        s.error
            .as_deref()
            .map(|e| format!(" (error: {e})"))
            .unwrap_or_default()
    );
    for it in s.items.iter().take(5) {
        println!("  {:>3}  {:<10} {}", it.relevance_score, it.category, it.title);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let base = std::env::var("FEED_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".into());
    let category = std::env::var("FEED_CATEGORY")
        .ok()
        .and_then(|c| Category::parse_lenient(&c));
    let cfg = SchedulerCfg {
        interval: Duration::from_secs(env_or("FEED_POLL_SECS", 300u64).max(1)),
        category,
        limit: env_or("FEED_LIMIT", 15usize).max(1),
        ..SchedulerCfg::default()
    };

    let client = HttpFeedClient::new(&base, Duration::from_secs(30))?;
    let sched = FeedScheduler::start(Arc::new(client), cfg);

    let mut updates = sched.subscribe();
    print_state(&updates.borrow_and_update());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = updates.borrow_and_update().clone();
                if !s.is_refreshing {
                    print_state(&s);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "pause" => sched.set_observed(false),
                    "resume" => sched.set_observed(true),
                    "refresh" => {
                        let outcome = sched.refresh_now(true).await;
                        println!("refresh: {outcome:?}");
                    }
                    "clear" => {
                        let outcome = sched.clear_cache_and_refresh().await;
                        println!("clear: {outcome:?}");
                    }
                    "quit" | "exit" => break,
                    "" => {}
                    other => println!("unknown command: {other}"),
                }
            }
        }
    }

    sched.shutdown();
    println!("feed-watch done");
    Ok(())
}
