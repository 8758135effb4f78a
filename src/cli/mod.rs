mod jobs;
mod notify;

use anyhow::{Result, anyhow};
use console::style;
use std::sync::Arc;

use cirun::core::terminal;
use cirun::{EventBus, JobService, JobStore, Settings};

fn print_help() {
    println!("\n {}\n", style("cirun - test job lifecycle").bold().cyan());
    let commands = [
        ("build [--request <id>] [--repo <owner/name>]", "Create a build to group jobs"),
        (
            "create [--build <id>] [--config <json>] [--queue <name>] [--number <n>] \
             [--request <id>] [--repo <owner/name>]",
            "Create a job",
        ),
        ("enqueue <job>", "Queue a created job"),
        ("start <job> [--worker <name>] [--started-at <rfc3339>]", "Mark a job started"),
        ("finish <job> --state <state> [--finished-at <rfc3339>]", "Record a job outcome"),
        ("reset <job>", "Rewind a finished job to created"),
        ("log <job> <text>", "Append output to a job log"),
        ("show <job>", "Show a job"),
        ("list", "List jobs"),
        ("notify <job> <channel> <event>", "Send a notification through a configured channel"),
    ];
    for (usage, about) in commands {
        println!("  {:<72} {}", style(usage).green(), style(about).dim());
    }
    println!(
        "\n {} {} <command> [args]\n",
        style("Usage:").bold(),
        style("cirun").green()
    );
}

/// Value following `flag`, if present.
pub(crate) fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

pub(crate) fn positional(args: &[String], index: usize, name: &str) -> Result<String> {
    args.get(index)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow!("missing <{}> argument", name))
}

pub(crate) struct Context {
    pub settings: Settings,
    pub bus: EventBus,
    pub service: JobService,
}

async fn context() -> Result<Context> {
    let settings = Settings::load()?;
    cirun::logging::init(settings.level());
    let store = JobStore::open(settings.database_path()).await?;
    let bus = EventBus::new(settings.bus_capacity);
    let service = JobService::new(store, Arc::new(bus.clone()));
    Ok(Context {
        settings,
        bus,
        service,
    })
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };
    let rest = &args[2..];

    match command {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "build" => jobs::create_build(&context().await?, rest).await,
        "create" => jobs::create_job(&context().await?, rest).await,
        "enqueue" => jobs::enqueue(&context().await?, rest).await,
        "start" => jobs::start(&context().await?, rest).await,
        "finish" => jobs::finish(&context().await?, rest).await,
        "reset" => jobs::reset(&context().await?, rest).await,
        "log" => jobs::append_log(&context().await?, rest).await,
        "show" => jobs::show(&context().await?, rest).await,
        "list" => jobs::list(&context().await?).await,
        "notify" => notify::notify(&context().await?, rest).await,
        other => {
            terminal::print_error(&format!("Unknown command: {}", other));
            print_help();
            Err(anyhow!("unknown command {}", other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_reads_following_argument() {
        let a = args(&["job-1", "--worker", "w1", "--state", "passed"]);
        assert_eq!(flag_value(&a, "--worker").as_deref(), Some("w1"));
        assert_eq!(flag_value(&a, "--state").as_deref(), Some("passed"));
        assert_eq!(flag_value(&a, "--queue"), None);
    }

    #[test]
    fn flag_without_value_is_none() {
        let a = args(&["job-1", "--worker"]);
        assert_eq!(flag_value(&a, "--worker"), None);
    }

    #[test]
    fn positional_rejects_flags() {
        let a = args(&["--worker", "w1"]);
        assert!(positional(&a, 0, "job").is_err());
        let a = args(&["job-1"]);
        assert_eq!(positional(&a, 0, "job").unwrap(), "job-1");
    }

    #[test]
    fn repo_flag_must_be_a_slug() {
        let repo = jobs::repository_flag(&args(&["--repo", "acme/widgets"])).unwrap();
        assert_eq!(repo.map(|r| r.slug()).as_deref(), Some("acme/widgets"));
        assert!(jobs::repository_flag(&args(&[])).unwrap().is_none());

        let err = jobs::repository_flag(&args(&["--repo", "widgets"])).unwrap_err();
        assert!(err.to_string().contains("owner/name"));
    }
}
