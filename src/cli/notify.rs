use anyhow::{Context as _, Result};

use cirun::{Handler, LogTransport};

use super::jobs::print_envelopes;
use super::{Context, positional};

/// Delivers a notification about a job through a channel defined in the settings.
pub async fn notify(ctx: &Context, args: &[String]) -> Result<()> {
    let id = positional(args, 0, "job")?;
    let channel_name = positional(args, 1, "channel")?;
    let event = positional(args, 2, "event")?;

    let channel = ctx
        .settings
        .channel(&channel_name)
        .with_context(|| format!("no channel named {} in settings", channel_name))?
        .clone();
    let job = ctx
        .service
        .store()
        .get_job(&id)
        .await?
        .with_context(|| format!("no job {}", id))?;

    let mut rx = ctx.bus.subscribe();
    let handler = Handler::new(channel, event, job.event_payload());
    handler.notify(&job, &LogTransport, &ctx.bus).await?;
    print_envelopes(&mut rx);
    Ok(())
}
