use std::sync::Arc;

use cirun::{EventBus, JobError, JobService, JobState, JobStore, NewJob, Repository};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn service() -> TestResult<(JobService, EventBus)> {
    let store = JobStore::open_in_memory()?;
    let bus = EventBus::new(64);
    Ok((JobService::new(store, Arc::new(bus.clone())), bus))
}

fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn drain(rx: &mut broadcast::Receiver<cirun::Envelope>) -> Vec<String> {
    let mut events = Vec::new();
    while let Ok(env) = rx.try_recv() {
        events.push(env.event().unwrap_or_default().to_string());
    }
    events
}

#[tokio::test]
async fn job_runs_through_its_lifecycle() -> TestResult {
    let (service, bus) = service()?;
    let mut rx = bus.subscribe();

    let job = service
        .create_job(NewJob {
            config: payload(json!({ "language": "go" })),
            number: Some("4.1".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(job.state, Some(JobState::Created));

    service.enqueue(&job.id).await?;
    service
        .start(&job.id, &payload(json!({ "worker": "w1", "bogus": 1 })))
        .await?;
    let finished = service
        .finish(&job.id, &payload(json!({ "state": "passed" })))
        .await?;

    assert!(finished.is_passed());
    assert!(finished.is_finished());
    assert_eq!(finished.worker.as_deref(), Some("w1"));
    assert!(finished.tags.contains("language:go"));
    assert_eq!(drain(&mut rx), vec!["queue", "start", "finish"]);

    let stored = service.store().get_job(&job.id).await?.ok_or("job missing")?;
    assert_eq!(stored, finished);
    Ok(())
}

#[tokio::test]
async fn rejected_transition_changes_nothing_and_publishes_nothing() -> TestResult {
    let (service, bus) = service()?;
    let job = service.create_job(NewJob::default()).await?;
    let mut rx = bus.subscribe();

    let err = service
        .finish(&job.id, &payload(json!({ "state": "failed" })))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition { .. }));
    assert!(drain(&mut rx).is_empty());

    let stored = service.store().get_job(&job.id).await?.ok_or("job missing")?;
    assert_eq!(stored, job);
    Ok(())
}

#[tokio::test]
async fn reset_restores_a_fresh_job_and_announces_create() -> TestResult {
    let (service, bus) = service()?;
    let job = service.create_job(NewJob::default()).await?;
    service.enqueue(&job.id).await?;
    service.start(&job.id, &Map::new()).await?;
    service.store().append_log(&job.id, "running tests\n").await?;
    service
        .finish(&job.id, &payload(json!({ "state": "errored" })))
        .await?;
    let log_id = job.log_id().map(str::to_string);

    let mut rx = bus.subscribe();
    let (reset, changed) = service.reset(&job.id).await?;
    assert!(changed);
    assert_eq!(reset.state, Some(JobState::Created));
    assert!(reset.queued_at.is_none() && reset.started_at.is_none());
    assert!(reset.finished_at.is_none() && reset.worker.is_none());
    assert_eq!(drain(&mut rx), vec!["create"]);

    let stored = service.store().get_job(&job.id).await?.ok_or("job missing")?;
    assert_eq!(stored.log_content(), Some(""));
    assert_eq!(stored.log_id().map(str::to_string), log_id);

    let (_, changed) = service.reset(&job.id).await?;
    assert!(!changed);
    assert!(drain(&mut rx).is_empty());
    Ok(())
}

#[tokio::test]
async fn jobs_propagate_to_their_build() -> TestResult {
    let (service, _bus) = service()?;
    let build = service
        .create_build(Some("req-3".to_string()), Repository::from_slug("acme/widgets"))
        .await?;
    let new_job = || NewJob {
        owner_id: Some(build.id.clone()),
        ..Default::default()
    };
    let a = service.create_job(new_job()).await?;
    let b = service.create_job(new_job()).await?;

    for id in [&a.id, &b.id] {
        service.enqueue(id).await?;
        service.start(id, &Map::new()).await?;
    }
    let store = service.store();
    assert_eq!(
        store.get_build(&build.id).await?.ok_or("build missing")?.state,
        JobState::Started
    );

    service
        .finish(&a.id, &payload(json!({ "state": "passed" })))
        .await?;
    service
        .finish(&b.id, &payload(json!({ "state": "failed" })))
        .await?;
    let stored = store.get_build(&build.id).await?.ok_or("build missing")?;
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.members.len(), 2);
    Ok(())
}

#[tokio::test]
async fn creating_a_job_for_a_missing_build_fails() -> TestResult {
    let (service, _bus) = service()?;
    let err = service
        .create_job(NewJob {
            owner_id: Some("nope".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NotFound(ref id) if id == "nope"));
    assert!(service.store().list_jobs().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_job_is_not_found() -> TestResult {
    let (service, _bus) = service()?;
    assert!(matches!(
        service.enqueue("missing").await,
        Err(JobError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn concurrent_callbacks_are_serialized_per_job() -> TestResult {
    let (service, bus) = service()?;
    let mut rx = bus.subscribe();
    let job = service.create_job(NewJob::default()).await?;
    service.enqueue(&job.id).await?;

    let mut handles = Vec::new();
    for worker in ["w1", "w2", "w3", "w4"] {
        let service = service.clone();
        let id = job.id.clone();
        handles.push(tokio::spawn(async move {
            service.start(&id, &payload(json!({ "worker": worker }))).await
        }));
    }
    let mut started = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => started += 1,
            Err(JobError::InvalidTransition { from, .. }) => assert_eq!(from, "started"),
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(drain(&mut rx), vec!["queue", "start"]);
    Ok(())
}

#[tokio::test]
async fn store_persists_across_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data").join("jobs.db");

    let id = {
        let store = JobStore::open(&path).await?;
        let service = JobService::new(store, Arc::new(EventBus::new(4)));
        let job = service
            .create_job(NewJob {
                queue: Some("builds.linux".to_string()),
                request_id: Some("req-8".to_string()),
                repository: Repository::from_slug("acme/widgets"),
                ..Default::default()
            })
            .await?;
        service.enqueue(&job.id).await?;
        job.id
    };

    let store = JobStore::open(&path).await?;
    let job = store.get_job(&id).await?.ok_or("job missing")?;
    assert_eq!(job.state, Some(JobState::Queued));
    assert!(job.queued_at.is_some());
    assert_eq!(job.queue.as_deref(), Some("builds.linux"));
    assert_eq!(job.request_id.as_deref(), Some("req-8"));
    assert_eq!(job.repository.map(|r| r.slug()).as_deref(), Some("acme/widgets"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_connections_share_one_database() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("jobs.db");
    let first = JobService::new(JobStore::open(&path).await?, Arc::new(EventBus::new(64)));
    let second = JobService::new(JobStore::open(&path).await?, Arc::new(EventBus::new(64)));

    let mut ids = Vec::new();
    for _ in 0..40 {
        ids.push(first.create_job(NewJob::default()).await?.id);
    }

    let mut handles = Vec::new();
    for (i, id) in ids.iter().cloned().enumerate() {
        let service = if i % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(tokio::spawn(async move {
            service.enqueue(&id).await?;
            service.store().append_log(&id, "queued\n").await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    for job in second.store().list_jobs().await? {
        assert_eq!(job.state, Some(JobState::Queued));
        assert_eq!(job.log_content(), Some("queued\n"));
    }
    assert_eq!(first.store().list_jobs().await?.len(), 40);
    Ok(())
}
