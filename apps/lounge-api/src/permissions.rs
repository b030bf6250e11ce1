use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::AppState;

/// Reject callers that are not configured administrators.
pub fn require_admin(state: &AppState, user: &AuthUser) -> Result<(), ApiError> {
    if state.config.is_admin(&user.user_id) {
        return Ok(());
    }
    tracing::debug!(user_id = %user.user_id, "admin action refused");
    Err(ApiError::forbidden("Administrator access required"))
}
