use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, FieldErrors, NON_FIELD};
use crate::state::AppState;
use crate::users::dto::{RegisterRequest, TokenRequest, TokenResponse, UpdateMeRequest, UserOut};
use crate::users::password::{hash_password, verify_password};
use crate::users::repo::User;
use crate::users::token::{AuthUser, TokenKeys};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

const MIN_PASSWORD_LEN: usize = 8;

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserOut>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let mut errors = FieldErrors::new();
    if !is_valid_email(&payload.email) {
        errors.add("email", "enter a valid email address");
    } else if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        errors.add("email", "a user with this email already exists");
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        errors.add("password", "password must be at least 8 characters");
    }
    errors.into_result()?;

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.email, payload.name.trim(), &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    Json(mut payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    // The token exchange reports bad credentials as a 400 validation error,
    // never a 401, so callers cannot distinguish unknown emails from wrong
    // passwords or disabled accounts.
    let bad_credentials =
        || ApiError::invalid(NON_FIELD, "unable to authenticate with provided credentials");

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "token request for unknown email");
            return Err(bad_credentials());
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "token request with invalid password");
        return Err(bad_credentials());
    }

    if !user.is_active {
        warn!(user_id = %user.id, "token request for inactive account");
        return Err(bad_credentials());
    }

    let keys = TokenKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, "token issued");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserOut>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::AuthenticationRequired("user no longer exists".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<UserOut>, ApiError> {
    let mut errors = FieldErrors::new();

    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            if !is_valid_email(&email) {
                errors.add("email", "enter a valid email address");
            } else if let Some(existing) = User::find_by_email(&state.db, &email).await? {
                if existing.id != user_id {
                    errors.add("email", "a user with this email already exists");
                }
            }
            Some(email)
        }
        None => None,
    };

    let password_hash = match payload.password {
        Some(ref plain) => {
            if plain.len() < MIN_PASSWORD_LEN {
                errors.add("password", "password must be at least 8 characters");
                None
            } else {
                Some(hash_password(plain)?)
            }
        }
        None => None,
    };

    errors.into_result()?;

    let name = payload.name.as_ref().map(|n| n.trim().to_string());
    let user = User::update_profile(
        &state.db,
        user_id,
        email.as_deref(),
        name.as_deref(),
        password_hash.as_deref(),
    )
    .await?
    .ok_or_else(|| ApiError::AuthenticationRequired("user no longer exists".into()))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("chef@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("no-tld@example"));
    }
}
