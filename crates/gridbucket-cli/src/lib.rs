use std::io::Write;
use std::path::Path;

use anyhow::Context;

/// Initialize tracing for the CLI. Logs go to stderr so file contents can be piped from stdout.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Name to store an uploaded file under when none is given: the path's final component.
pub fn default_filename(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

/// Write downloaded content to `output`, or to stdout when no path is given.
pub async fn write_output(output: Option<&Path>, data: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => tokio::fs::write(path, data)
            .await
            .with_context(|| format!("Write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data).context("Write stdout")?;
            stdout.flush().context("Flush stdout")
        }
    }
}
