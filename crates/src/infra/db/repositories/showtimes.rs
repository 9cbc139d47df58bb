use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::{OptionalExtension, prelude::*};
use uuid::Uuid;

use crate::domain::entities::showtimes::ShowtimeEntity;
use crate::domain::repositories::showtimes::ShowtimeRepository;
use crate::infra::db::postgres::{postgres_connection::PgPool, schema::showtimes};

pub struct ShowtimePostgres {
    db_pool: Arc<PgPool>,
}

impl ShowtimePostgres {
    pub fn new(db_pool: Arc<PgPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ShowtimeRepository for ShowtimePostgres {
    async fn find_by_id(&self, showtime_id: Uuid) -> Result<Option<ShowtimeEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let showtime = showtimes::table
            .find(showtime_id)
            .first::<ShowtimeEntity>(&mut conn)
            .optional()?;

        Ok(showtime)
    }
}
