use chrono::{Duration as ChronoDuration, Local, Utc};
use metronome::{job, Dependencies, JobDescriptor, Registry};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

static COUNTER: AtomicU32 = AtomicU32::new(0);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_target(false)
        .init();

    let registry = Registry::new("tasks");

    // Every 2 seconds
    registry
        .add(
            JobDescriptor::builder()
                .name("heartbeat")
                .period("2s")
                .job(job(|_| async {
                    let count = COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
                    println!("[HEARTBEAT] Execution #{}", count);
                    Ok(())
                }))
                .build(),
        )
        .await?;

    // Once, three seconds from now, two jobs in sequence
    registry
        .add(
            JobDescriptor::builder()
                .name("warmup")
                .period(3)
                .job(job(|_| async {
                    println!("[WARMUP] step 1");
                    Ok(())
                }))
                .job(job(|ctx| async move {
                    println!("[WARMUP] step 2 with {:?}", ctx.args());
                    Ok(())
                }))
                .arg("caches")
                .once()
                .build(),
        )
        .await?;

    // Daily at a fixed time, which for the demo is five seconds from now
    let at = (Utc::now() + ChronoDuration::seconds(5)).format("%H:%M:%S").to_string();
    registry
        .add(
            JobDescriptor::builder()
                .name("daily-report")
                .time(at.clone())
                .job(job(|_| async {
                    println!("[{}] [DAILY] report sent", Local::now().format("%H:%M:%S"));
                    Ok(())
                }))
                .build(),
        )
        .await?;

    // A job that fails is reported and the schedule carries on
    registry
        .add(
            JobDescriptor::builder()
                .name("flaky")
                .period(4)
                .job(job(|_| async { Err(anyhow::anyhow!("upstream returned 503")) }))
                .build(),
        )
        .await?;

    registry.up(Dependencies::default()).await?;
    registry.after().await;

    println!("✅ Tasks armed, daily report fires at {} UTC\n", at);
    tokio::time::sleep(Duration::from_secs(10)).await;

    registry.down().await;
    println!(
        "\n📊 Heartbeat ran {} times in 10 seconds",
        COUNTER.load(Ordering::SeqCst)
    );

    Ok(())
}
