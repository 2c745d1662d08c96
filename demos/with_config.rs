use chrono::Local;
use metronome::{
    job, linkme, load_toml_settings, Dependencies, Extension, NamedJob, Registry, JOBS,
};
use std::time::Duration;

/// Shared state every job can reach through `ctx.app::<App>()`
struct App {
    environment: String,
}

#[linkme::distributed_slice(JOBS)]
#[linkme(crate = metronome::linkme)]
static CLEANUP: fn() -> NamedJob = || {
    NamedJob::new(
        "cleanup",
        job(|ctx| async move {
            let environment = ctx
                .app::<App>()
                .map(|app| app.environment.clone())
                .unwrap_or_default();
            println!(
                "[{}] 🧹 [CLEANUP] {} in {} with {:?}",
                Local::now().format("%H:%M:%S"),
                ctx.task().display_name(),
                environment,
                ctx.args()
            );
            Ok(())
        }),
    )
};

#[linkme::distributed_slice(JOBS)]
#[linkme(crate = metronome::linkme)]
static NOTIFY: fn() -> NamedJob = || {
    NamedJob::new(
        "notify",
        job(|ctx| async move {
            println!(
                "[{}] 📣 [NOTIFY] {} finished",
                Local::now().format("%H:%M:%S"),
                ctx.task().display_name()
            );
            Ok(())
        }),
    )
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Task descriptor files live in demos/tasks, overrides in demos/config
    let settings = load_toml_settings("demos/config/application.toml")?;

    let registry = Registry::builder()
        .name("tasks")
        .volume("demos/tasks")
        .extension(
            Extension::new()
                .on_after(|registry| async move {
                    println!("✅ {} tasks armed", registry.len().await);
                })
                .on_task_error(|failure| async move {
                    eprintln!(
                        "❌ {} failed: {:#}",
                        failure.task.display_name(),
                        failure.error
                    );
                }),
        )
        .build();

    registry
        .up(Dependencies::new(settings).with_app(App {
            environment: "staging".to_string(),
        }))
        .await?;
    registry.after().await;

    tokio::time::sleep(Duration::from_secs(15)).await;
    registry.down().await;

    Ok(())
}
