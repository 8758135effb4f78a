use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static BELL: Emoji<'_, '_> = Emoji("🔔 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_event(msg: &str, body: &str) {
    println!("{} {}", BELL, style(msg).bold());
    println!("   {}", style(body).dim());
}

/// Colours a job state the way the status column reads at a glance.
pub fn styled_state(state: &str) -> String {
    match state {
        "passed" => style(state).green().bold().to_string(),
        "failed" | "errored" => style(state).red().bold().to_string(),
        "canceled" => style(state).yellow().to_string(),
        "started" | "queued" => style(state).cyan().to_string(),
        _ => style(state).dim().to_string(),
    }
}
