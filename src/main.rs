use clap::Parser;
use std::sync::Arc;
use threadcast::args::Args;
use threadcast::pipeline::Pipeline;
use threadcast::session::MemorySessionStore;
use threadcast::tts::create_provider;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting thread video generation pipeline");

    let args = Args::parse();
    let settings = args.pipeline_settings()?;

    if !settings.images_dir.is_dir() {
        error!("Image directory not found: {}", settings.images_dir.display());
        std::process::exit(1);
    }
    if let Some(bgm) = &settings.bgm {
        if !bgm.exists() {
            error!("Background music not found: {}", bgm.display());
            std::process::exit(1);
        }
        info!("Background music found: {}", bgm.display());
    }

    let provider = create_provider(&args.provider_config());
    info!("Narration engine: {}", provider.name());

    let pipeline = Pipeline::new(
        provider,
        Arc::new(args.renderer()),
        Arc::new(MemorySessionStore::new()),
        settings,
    );
    let video = pipeline.run(&args.thread).await?;

    info!("Process complete: {}", video.display());
    Ok(())
}
