use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metronome::{
    job, Dependencies, Extension, Job, JobDescriptor, Registry, RegistrySettings, TaskOverride,
    TaskPhase,
};
use tokio::time::{sleep, Instant};

fn counting(count: &Arc<AtomicUsize>) -> Job {
    let count = Arc::clone(count);
    job(move |_| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn host_lifecycle_runs_and_drains_tasks() {
    let registry = Registry::new("tasks");
    let cb1 = Arc::new(AtomicUsize::new(0));
    let cb2 = Arc::new(AtomicUsize::new(0));

    registry
        .add(
            JobDescriptor::builder()
                .name("first")
                .period(1)
                .jobs([counting(&cb1), counting(&cb1)])
                .once()
                .build(),
        )
        .await
        .unwrap();
    registry
        .add(
            JobDescriptor::builder()
                .name("second")
                .period(2)
                .jobs([counting(&cb2), counting(&cb2), counting(&cb2)])
                .once()
                .build(),
        )
        .await
        .unwrap();

    registry.up(Dependencies::default()).await.unwrap();
    registry.after().await;
    sleep(Duration::from_secs(4)).await;

    assert_eq!(cb1.load(Ordering::SeqCst), 2);
    assert_eq!(cb2.load(Ordering::SeqCst), 3);

    registry.down().await;
    assert!(registry.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn down_waits_for_a_slow_job() {
    let registry = Registry::new("tasks");
    registry.up(Dependencies::default()).await.unwrap();

    let finished = Arc::new(AtomicUsize::new(0));
    let slow = {
        let finished = Arc::clone(&finished);
        job(move |_| {
            let finished = Arc::clone(&finished);
            async move {
                sleep(Duration::from_secs(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let task = registry
        .add(JobDescriptor::builder().period(1).job(slow).build())
        .await
        .unwrap()
        .unwrap();
    registry.after().await;

    sleep(Duration::from_secs(2)).await;
    assert_eq!(task.phase(), TaskPhase::Running);

    let begun = Instant::now();
    registry.down().await;

    assert!(begun.elapsed() >= Duration::from_secs(8));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(task.phase(), TaskPhase::Idle);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(task.run_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failures_reach_extension_listeners_and_do_not_stop_the_schedule() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let extension = {
        let failures = Arc::clone(&failures);
        Extension::new().on_task_error(move |failure| {
            let failures = Arc::clone(&failures);
            async move {
                failures
                    .lock()
                    .unwrap()
                    .push(failure.task.display_name().to_string());
            }
        })
    };
    let registry = Registry::builder().extension(extension).build();
    registry.up(Dependencies::default()).await.unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let always_failing = {
        let runs = Arc::clone(&runs);
        job(move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("upstream unavailable")) }
        })
    };
    registry
        .add(
            JobDescriptor::builder()
                .name("poller")
                .period(1)
                .job(always_failing)
                .build(),
        )
        .await
        .unwrap();
    registry.after().await;

    sleep(Duration::from_millis(3_500)).await;
    registry.down().await;

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(*failures.lock().unwrap(), vec!["poller"; 3]);
}

#[tokio::test(start_paused = true)]
async fn settings_disable_and_reschedule_tasks() {
    let settings = RegistrySettings::default()
        .with_task(
            "noisy",
            TaskOverride {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .with_task(
            "slowed",
            TaskOverride {
                period: Some("3s".into()),
                ..Default::default()
            },
        );

    let registry = Registry::new("tasks");
    let noisy = Arc::new(AtomicUsize::new(0));
    let slowed = Arc::new(AtomicUsize::new(0));
    registry
        .add(
            JobDescriptor::builder()
                .name("noisy")
                .period(1)
                .job(counting(&noisy))
                .build(),
        )
        .await
        .unwrap();
    registry
        .add(
            JobDescriptor::builder()
                .name("slowed")
                .period(1)
                .job(counting(&slowed))
                .build(),
        )
        .await
        .unwrap();

    registry.up(Dependencies::new(settings)).await.unwrap();
    registry.after().await;
    sleep(Duration::from_millis(6_500)).await;
    registry.down().await;

    assert_eq!(noisy.load(Ordering::SeqCst), 0);
    assert_eq!(slowed.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn registry_can_go_up_again_after_down() {
    let registry = Registry::new("tasks");
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        registry.up(Dependencies::default()).await.unwrap();
        registry
            .add(
                JobDescriptor::builder()
                    .id("ping")
                    .period(1)
                    .job(counting(&calls))
                    .once()
                    .build(),
            )
            .await
            .unwrap();
        registry.after().await;
        sleep(Duration::from_secs(2)).await;
        registry.down().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
