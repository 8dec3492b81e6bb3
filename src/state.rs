use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::linkedin::Publisher;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub publisher: Arc<dyn Publisher>,
}
