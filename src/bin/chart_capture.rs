use chart_sentinel::daemon::{self, Variant};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chart_sentinel::telemetry::init();

    if let Err(e) = daemon::run(Variant::ChartOnly).await {
        tracing::error!("chart capture failed to start: {e:#}");
        return Err(e);
    }
    Ok(())
}
