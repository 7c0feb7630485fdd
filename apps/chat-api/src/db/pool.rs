use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncPgConnection>;

/// Upper bound on pooled connections shared by REST and socket handlers.
const MAX_POOL_SIZE: usize = 20;

/// Create a Diesel async connection pool. Connections are opened lazily.
pub async fn connect(database_url: &str) -> DbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(MAX_POOL_SIZE)
        .build()
        .expect("failed to build connection pool");

    tracing::info!(max_size = MAX_POOL_SIZE, "database pool created");

    pool
}
