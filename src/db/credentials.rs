use sqlx::PgPool;
use uuid::Uuid;

use crate::models::UserCredential;

pub async fn find_by_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserCredential>, sqlx::Error> {
    sqlx::query_as::<_, UserCredential>("SELECT * FROM user_credentials WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}
