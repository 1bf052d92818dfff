use anyhow::Result;
use fnr_dataprep::{Pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::from_env()?;
    info!(base = %config.base.display(), workers = config.workers, "preparing corpus");

    let report = Pipeline::new(config).run()?;
    info!(
        train = report.split_sizes.train,
        test = report.split_sizes.test,
        val = report.split_sizes.val,
        skipped_all = report.all_skipped(),
        "corpus ready"
    );
    Ok(())
}
