//! Manual triggers for operators: run the reconciliation outside its
//! schedule and exercise the email channel. Not part of the reconciliation
//! contract; both endpoints require the admin trigger token.

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::response::{self, AppError};
use crate::services::email::{EmailError, EmailMessage, Mailer};
use crate::state::AppState;
use crate::store::SessionCollection;
use crate::workers::auto_sign_out;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/auto-sign-out", post(trigger_auto_sign_out))
        .route("/email/test", post(send_test_email))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let expected = &state.config().admin_trigger_token;
    if expected.is_empty() {
        return Err(AppError::unauthorized(
            "manual triggers are disabled: no ADMIN_TRIGGER_TOKEN configured",
        ));
    }

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(AppError::unauthorized("invalid trigger token"))
    }
}

async fn trigger_auto_sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers)?;

    let mut per_collection = Map::new();
    for collection in SessionCollection::ALL {
        let stats = auto_sign_out::reconcile_collection(
            state.store(),
            state.mailer(),
            collection,
            &state.config().auto_sign_out,
        )
        .await?;
        let value = serde_json::to_value(&stats)
            .map_err(|e| AppError::internal(&e.to_string()))?;
        per_collection.insert(collection.name().to_string(), value);
    }

    Ok(response::ok(Value::Object(per_collection)))
}

#[derive(Debug, Deserialize)]
struct TestEmailRequest {
    to: String,
}

async fn send_test_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TestEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers)?;

    let message = EmailMessage {
        to: req.to,
        subject: "attendance-backend test email".to_string(),
        text: "This is a test message from the attendance backend.".to_string(),
    };

    state.mailer().send(&message).await.map_err(|e| match e {
        EmailError::InvalidPayload(msg) => AppError::bad_request("INVALID_EMAIL", &msg),
        other => AppError::internal(&other.to_string()),
    })?;

    Ok(response::ok(serde_json::json!({ "delivered": true })))
}
