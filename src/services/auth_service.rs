use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::auth::{
        AdminUpdateUserRequest, AuthResponse, LoginRequest, RegisterRequest,
        UpdateProfileRequest, UserList,
    },
    entity::{
        Users,
        users::{ActiveModel as UserActive, Column as UserCol},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin, issue_token},
    models::{Role, User},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::mapping::user_from_entity,
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    let RegisterRequest {
        name,
        email,
        password,
        phone,
    } = payload;
    let email = normalize_email(&email);

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::bad_request("User already exists"));
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.trim().to_string()),
        email: Set(email),
        password_hash: Set(hash_password(&password)?),
        phone: Set(phone),
        addresses: Set(serde_json::json!([])),
        role: Set(Role::User.as_str().to_string()),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::unique_violation(e, "User already exists"))?;

    let token = issue_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry_days)?;
    let user = user_from_entity(user)?;

    tracing::info!(user_id = %user.id, "user registered");
    audit::record(
        &state.pool,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User registered successfully",
        AuthResponse { token, user },
        None,
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    let LoginRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(normalize_email(&email)))
        .one(&state.orm)
        .await?;

    let invalid = || AppError::Unauthorized("Invalid email or password".into());
    let user = user.ok_or_else(invalid)?;
    if !verify_password(&password, &user.password_hash)? {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".into()));
    }

    let token = issue_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry_days)?;
    let user = user_from_entity(user)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Login successful",
        AuthResponse { token, user },
        Some(Meta::empty()),
    ))
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(ApiResponse::success("Profile", user_from_entity(model)?, None))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(email) = payload.email {
        let email = normalize_email(&email);
        let taken = Users::find()
            .filter(UserCol::Email.eq(email.as_str()))
            .filter(UserCol::Id.ne(user.user_id))
            .one(&state.orm)
            .await?;
        if taken.is_some() {
            return Err(AppError::bad_request("Email is already in use"));
        }
        active.email = Set(email);
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(password) = payload.password {
        active.password_hash = Set(hash_password(&password)?);
    }
    if let Some(addresses) = payload.addresses {
        for address in &addresses {
            address.validate()?;
        }
        let addresses = serde_json::to_value(addresses)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        active.addresses = Set(addresses);
    }
    active.updated_at = Set(Utc::now().into());

    let updated = active
        .update(&state.orm)
        .await
        .map_err(|e| AppError::unique_violation(e, "Email is already in use"))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "profile_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Profile updated successfully",
        user_from_entity(updated)?,
        None,
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(user_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn admin_update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    if id == user.user_id && (payload.role == Some(Role::User) || payload.is_active == Some(false))
    {
        return Err(AppError::bad_request(
            "Admins cannot demote or deactivate themselves",
        ));
    }

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let mut active: UserActive = existing.into();
    if let Some(role) = payload.role {
        active.role = Set(role.as_str().to_string());
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_admin_update",
        "users",
        serde_json::json!({
            "user_id": id,
            "role": payload.role.map(|r| r.as_str()),
            "is_active": payload.is_active,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated",
        user_from_entity(updated)?,
        None,
    ))
}
