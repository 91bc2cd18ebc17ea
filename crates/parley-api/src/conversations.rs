use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};
use tracing::{debug, error};

use parley_types::api::{Claims, DirectConversationResponse, OpenDirectConversationRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /conversations/direct: the "Message" action on a profile.
///
/// Returns the one direct conversation between the caller and
/// `other_user_id`, creating it on first use. Invoked on explicit user action
/// only; failures are returned once and never retried here.
pub async fn open_direct_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenDirectConversationRequest>,
) -> Result<Json<DirectConversationResponse>, ApiError> {
    let other_user_id = req.other_user_id;

    if other_user_id != claims.sub {
        let db = Arc::clone(&state.db);
        let other = other_user_id.to_string();
        let exists = tokio::task::spawn_blocking(move || db.user_exists(&other))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::internal("user lookup failed")
            })?
            .map_err(|e| {
                error!("User lookup for {} failed: {:#}", other_user_id, e);
                ApiError::internal(format!("user lookup failed: {:#}", e))
            })?;

        if !exists {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("user {} does not exist", other_user_id),
                false,
            ));
        }
    }

    let conversation_id = state
        .conversations
        .resolve_direct_conversation(claims.sub, other_user_id)
        .await?;

    debug!(
        "{} opened direct conversation {} with {}",
        claims.username, conversation_id, other_user_id
    );
    Ok(Json(DirectConversationResponse { conversation_id }))
}
