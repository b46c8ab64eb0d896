use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::extractors::UserClaims;
use crate::errors::AppError;

/// Interviews owned by one expert are hidden from other logged-in experts.
/// Guest sessions and guest callers are not restricted.
pub fn ensure_visible_to(owner: Option<Uuid>, caller: Option<&UserClaims>) -> Result<(), AppError> {
    match (owner, caller) {
        (Some(owner), Some(UserClaims(claims))) if claims.sub != owner => Err(AppError::Forbidden),
        _ => Ok(()),
    }
}

/// Gate for every route that reads or changes one interview.
pub async fn authorize_session(
    db: &PgPool,
    session_id: Uuid,
    caller: Option<&UserClaims>,
) -> Result<(), AppError> {
    let owner = sqlx::query_scalar::<_, Option<Uuid>>(
        "SELECT user_id FROM interview_sessions WHERE id = $1",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Interview session {session_id} not found")))?;

    ensure_visible_to(owner, caller)
}
