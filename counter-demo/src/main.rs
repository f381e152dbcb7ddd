use cached_state::{PrimitiveKind, StoreFactory};
use counter_demo::{CounterConfig, parse_ops, run};
use shared::config::StoreConfig;
use storage_engine::EngineFactory;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables from .env file (if exists)
    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let mut args = std::env::args().skip(1);
    let kind: PrimitiveKind = args.next().unwrap_or_default().parse()?;
    let ops = parse_ops(args)?;

    let store_config = StoreConfig::from_env();
    info!(
        "Using {} store '{}' ({:?} per ttl unit)",
        store_config.backend.as_str(),
        store_config.name,
        store_config.expiry_unit.as_duration()
    );
    let store = EngineFactory.create_from_config(&store_config)?;

    let counter_config = CounterConfig::from_env(kind)?;
    for step in run(store, &counter_config, kind, &ops)? {
        println!("{}", step);
    }

    Ok(())
}
