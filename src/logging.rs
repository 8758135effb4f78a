use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the global subscriber writing to stderr, so stdout stays free for command output.
pub fn init(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // already installed
}
