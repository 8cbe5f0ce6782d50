pub mod pool;

pub use pool::{connect, connect_lazy, ping, run_migrations, DbPool};
