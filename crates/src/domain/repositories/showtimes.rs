use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::showtimes::ShowtimeEntity;

#[async_trait]
#[automock]
pub trait ShowtimeRepository {
    async fn find_by_id(&self, showtime_id: Uuid) -> Result<Option<ShowtimeEntity>>;
}
