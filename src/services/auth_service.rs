use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    error::{AppError, AppResult},
    models::User,
    policy::Role,
    response::{ApiResponse, Meta},
    services::{
        require_text,
        user_service::{is_valid_email, is_valid_phone, user_from_entity},
    },
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Self-registration always creates a customer.
pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest {
        email,
        password,
        full_name,
        phone,
    } = payload;
    let email = email.trim().to_lowercase();

    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    require_text(&full_name, "full_name")?;
    if !phone.is_empty() && !is_valid_phone(&phone) {
        return Err(AppError::BadRequest("Invalid phone number".into()));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(password_hash),
        full_name: Set(full_name.trim().to_string()),
        phone: Set(phone.trim().to_string()),
        role: Set(Role::Customer.as_str().to_string()),
        created_at: Set(Utc::now().into()),
        last_login: Set(None),
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "Email is already taken"))?;

    audit::record(
        &state.pool,
        Some(user.id),
        AuditAction::UserRegister,
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        user_from_entity(user)?,
        Some(Meta::empty()),
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(email.trim().to_lowercase()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let role: Role = crate::services::parse_stored(&user.role, "users.role")?;
    let token = issue_token(
        user.id,
        role,
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
    )?;

    let mut active: UserActive = user.into();
    active.last_login = Set(Some(Utc::now().into()));
    let user = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.id),
        AuditAction::UserLogin,
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token,
            user: user_from_entity(user)?,
        },
        Some(Meta::empty()),
    ))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Signs an HS256 bearer token carrying the user id and role.
pub fn issue_token(user_id: Uuid, role: Role, secret: &str, ttl_hours: i64) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}
