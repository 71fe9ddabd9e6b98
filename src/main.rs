use anyhow::Result;
use proxy_harvest::{logging::init_logging, AppConfig, OutputWriter, Pipeline};
use std::time::Instant;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::default();
    init_logging(&config.logging)?;

    let start = Instant::now();
    info!(sources = config.pipeline.sources.len(), "starting proxy update");

    let writer = OutputWriter::new(config.output.clone());
    writer.prepare()?;

    let mut pipeline = Pipeline::new(config.pipeline)?;
    let report = pipeline.run().await;
    writer.write_all(&report)?;

    info!(
        working = report.working().len(),
        elapsed_secs = %format!("{:.2}", start.elapsed().as_secs_f64()),
        "proxy update finished"
    );
    Ok(())
}
