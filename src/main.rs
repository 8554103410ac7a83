use stockroom::config::{AppConfig, BackendKind};
use stockroom::store::Backend;
use stockroom::{logging, serve, Api, DbPool, MemoryBackend, Migrator, PgBackend};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn run<B: Backend>(backend: B, config: &AppConfig) -> Result<(), BoxError> {
    let api = Api::new(backend, config);
    let address = config.server.bind_address();
    let server = serve(api, address.as_str())?;
    log::info!("Listening on {address}");
    server
        .join()
        .map_err(|_| BoxError::from("http server terminated abnormally"))
}

fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    logging::init(&config.logging)?;

    if config.server.workers > 0 {
        may::config().set_workers(config.server.workers);
    }
    if config.server.stack_size > 0 {
        may::config().set_stack_size(config.server.stack_size);
    }

    match config.inventory.backend {
        BackendKind::Postgres => {
            let pool = DbPool::connect(&config.database)?;
            let applied = Migrator::builtin().up(&pool.acquire()?)?;
            log::info!(
                "Connected to PostgreSQL ({} connections), {} migration(s) applied",
                pool.size(),
                applied
            );
            run(PgBackend::new(pool, config.database.lock_timeout_ms), &config)
        }
        BackendKind::Memory => {
            log::warn!("Using the in-memory backend; data is lost on exit");
            run(MemoryBackend::new(), &config)
        }
    }
}
