use promptforge::{App, ConfigBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    promptforge::init_tracing_with_config(&config);

    tracing::info!(
        database = config.database.url.is_some(),
        generator = %config.generation.provider,
        sweeper = config.sweeper.enabled,
        "Starting promptforge"
    );

    App::from_config(config).await?.serve().await?;
    Ok(())
}
