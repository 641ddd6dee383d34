use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use uuid::Uuid;

use courier_chat::ChatService;
use courier_gateway::dispatcher::Dispatcher;
use courier_store::StoreError;
use courier_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use courier_types::models::User;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

/// Starter avatars handed out at registration.
const AVATARS: &[&str] = &[
    "/avatars/01.jpg",
    "/avatars/02.jpg",
    "/avatars/03.jpg",
    "/avatars/04.jpg",
    "/avatars/05.jpg",
];

fn random_avatar() -> String {
    AVATARS[rand::rng().random_range(0..AVATARS.len())].to_string()
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() || req.phone.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "name, phone, and password are required".to_string(),
        ));
    }

    let secret = state.jwt_secret.clone();
    let chat = state.chat.clone();
    let response = tokio::task::spawn_blocking(move || {
        // Argon2id is CPU-bound; it stays on the blocking pool with the
        // store calls.
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .to_string();

        let now = chrono::Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            phone: req.phone.trim().to_string(),
            password_hash,
            avatar: random_avatar(),
            created_at: now,
            last_seen: now,
        };
        // The store enforces phone uniqueness inside one lock
        // acquisition; a check-then-create here would race with a
        // concurrent registration for the same phone.
        chat.store().create_user(user.clone()).map_err(|e| match e {
            StoreError::PhoneTaken => ApiError::Conflict(
                "user with this phone number already exists".to_string(),
            ),
            other => ApiError::Internal(other.to_string()),
        })?;

        let token = create_token(&secret, user.id, &user.phone)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok::<_, ApiError>(AuthResponse {
            user: user.profile(),
            token,
        })
    })
    .await??;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let secret = state.jwt_secret.clone();
    let chat = state.chat.clone();
    let response = tokio::task::spawn_blocking(move || {
        let user = chat
            .store()
            .find_user_by_phone(req.phone.trim())
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .ok_or(ApiError::Unauthorized)?;

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|e| ApiError::Internal(e.to_string()))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;

        // Successful authentication counts as presence.
        chat.touch(user.id);

        let token = create_token(&secret, user.id, &user.phone)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok::<_, ApiError>(AuthResponse {
            user: user.profile(),
            token,
        })
    })
    .await??;

    Ok(Json(response))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.clone();
    let profile = tokio::task::spawn_blocking(move || chat.profile(claims.sub))
        .await?
        .map_err(ApiError::from)?;
    Ok(Json(profile))
}

pub fn create_token(secret: &str, user_id: Uuid, phone: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        phone: phone.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn token_round_trips_claims() {
        let user_id = Uuid::new_v4();
        let token = create_token("test-secret", user_id, "+15550001").unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, user_id);
        assert_eq!(data.claims.phone, "+15550001");
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let token = create_token("test-secret", Uuid::new_v4(), "+15550001").unwrap();
        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other-secret"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn avatar_comes_from_the_fixed_set() {
        for _ in 0..16 {
            assert!(AVATARS.contains(&random_avatar().as_str()));
        }
    }
}
