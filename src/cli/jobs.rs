use anyhow::{Context as _, Result};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use cirun::core::terminal::{self, print_status, print_success, print_warn, styled_state};
use cirun::{Envelope, NewJob, Repository, Sponsorable, TestJob, state_label};

use super::{Context, flag_value, positional};

pub(super) fn print_envelopes(rx: &mut broadcast::Receiver<Envelope>) {
    while let Ok(envelope) = rx.try_recv() {
        let body = serde_json::to_string(envelope.as_map()).unwrap_or_default();
        terminal::print_event(envelope.msg().unwrap_or("notification"), &body);
    }
}

fn print_job(ctx: &Context, job: &TestJob) {
    print_status("Job", &job.id);
    print_status("State", &styled_state(state_label(job.state)));
    if let Some(number) = &job.number {
        print_status("Number", number);
    }
    if let Some(build) = &job.owner_id {
        print_status("Build", build);
    }
    if let Some(queue) = &job.queue {
        print_status("Queue", queue);
    }
    for (label, at) in [
        ("Queued at", job.queued_at),
        ("Started at", job.started_at),
        ("Finished at", job.finished_at),
    ] {
        if let Some(at) = at {
            print_status(label, &at.to_rfc3339());
        }
    }
    if let Some(worker) = &job.worker {
        print_status("Worker", worker);
    }
    if let Some(sponsor) = job.sponsor(&ctx.settings.sponsors) {
        print_status("Sponsor", sponsor);
    }
    if !job.tags.is_empty() {
        print_status(
            "Tags",
            &job.tags.iter().cloned().collect::<Vec<_>>().join(", "),
        );
    }
    if job.has_invalid_config() {
        print_warn("Job configuration failed to parse; it cannot be reset.");
    }
}

/// `--repo` as a repository, rejecting anything that is not `owner/name`.
pub(super) fn repository_flag(args: &[String]) -> Result<Option<Repository>> {
    flag_value(args, "--repo")
        .map(|slug| {
            Repository::from_slug(&slug)
                .with_context(|| format!("repository must be owner/name, got {}", slug))
        })
        .transpose()
}

pub async fn create_build(ctx: &Context, args: &[String]) -> Result<()> {
    let repository = repository_flag(args)?;
    let build = ctx
        .service
        .create_build(flag_value(args, "--request"), repository)
        .await?;
    print_success(&format!("Created build {}", build.id));
    Ok(())
}

pub async fn create_job(ctx: &Context, args: &[String]) -> Result<()> {
    let config: Map<String, Value> = match flag_value(args, "--config") {
        Some(raw) => serde_json::from_str(&raw).context("--config must be a JSON object")?,
        None => Map::new(),
    };
    let repository = repository_flag(args)?;
    let job = ctx
        .service
        .create_job(NewJob {
            config,
            owner_id: flag_value(args, "--build"),
            number: flag_value(args, "--number"),
            queue: flag_value(args, "--queue"),
            request_id: flag_value(args, "--request"),
            repository,
        })
        .await?;
    print_success(&format!("Created job {}", job.id));
    print_job(ctx, &job);
    Ok(())
}

pub async fn enqueue(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    let mut rx = ctx.bus.subscribe();
    let job = ctx.service.enqueue(&id).await?;
    print_job(ctx, &job);
    print_envelopes(&mut rx);
    Ok(())
}

pub async fn start(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    let mut payload = Map::new();
    if let Some(worker) = flag_value(args, "--worker") {
        payload.insert("worker".to_string(), worker.into());
    }
    if let Some(at) = flag_value(args, "--started-at") {
        payload.insert("started_at".to_string(), at.into());
    }
    let mut rx = ctx.bus.subscribe();
    let job = ctx.service.start(&id, &payload).await?;
    print_job(ctx, &job);
    print_envelopes(&mut rx);
    Ok(())
}

pub async fn finish(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    let mut payload = Map::new();
    let state = flag_value(args, "--state").context("--state is required")?;
    payload.insert("state".to_string(), state.into());
    if let Some(at) = flag_value(args, "--finished-at") {
        payload.insert("finished_at".to_string(), at.into());
    }
    let mut rx = ctx.bus.subscribe();
    let job = ctx.service.finish(&id, &payload).await?;
    print_job(ctx, &job);
    print_envelopes(&mut rx);
    Ok(())
}

pub async fn reset(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    if let Some(job) = ctx.service.store().get_job(&id).await?
        && job.has_invalid_config()
    {
        print_warn("Job configuration failed to parse; refusing to reset.");
        return Ok(());
    }
    let mut rx = ctx.bus.subscribe();
    let (job, changed) = ctx.service.reset(&id).await?;
    if !changed {
        print_warn("Job is already created; nothing to reset.");
    }
    print_job(ctx, &job);
    print_envelopes(&mut rx);
    Ok(())
}

pub async fn append_log(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    let text = positional(args, 1, "text")?;
    ctx.service.store().append_log(&id, &text).await?;
    print_success("Log updated");
    Ok(())
}

pub async fn show(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    match ctx.service.store().get_job(&id).await? {
        Some(job) => {
            print_job(ctx, &job);
            if let Some(content) = job.log_content().filter(|c| !c.is_empty()) {
                println!("\n{}", content);
            }
        }
        None => print_warn(&format!("No job {}", id)),
    }
    Ok(())
}

pub async fn list(ctx: &Context) -> Result<()> {
    let jobs = ctx.service.store().list_jobs().await?;
    if jobs.is_empty() {
        terminal::print_info("No jobs yet.");
    }
    for job in jobs {
        println!(
            "{}  {:<10}  {}",
            job.id,
            styled_state(state_label(job.state)),
            job.worker.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
