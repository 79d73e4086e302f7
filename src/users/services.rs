//! Session lifecycle: registration, login, refresh-token rotation, logout and
//! credential changes.
//!
//! Each user holds at most one live refresh token. Login and refresh replace
//! it, logout clears it, and a refresh is only honoured when the presented
//! token is exactly the stored one.

use tracing::{error, info, warn};
use uuid::Uuid;

use super::dto::{ChangePasswordRequest, LoginRequest, RegisterForm, UpdateAccountRequest};
use super::repo_types::{ImageSlot, NewUser, PublicUser, User};
use crate::auth::{jwt::TokenPair, password};
use crate::error::ApiError;
use crate::media::services::{discard_image, upload_image, UploadFile};
use crate::state::AppState;

const TOKEN_FAILURE: &str = "Something went wrong while generating access and refresh tokens";

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_password_len(plain: &str) -> Result<(), ApiError> {
    if !password::is_long_enough(plain) {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn register(st: &AppState, form: RegisterForm) -> Result<PublicUser, ApiError> {
    if [&form.full_name, &form.email, &form.username, &form.password]
        .iter()
        .any(|f| f.trim().is_empty())
    {
        return Err(ApiError::validation("All fields are required"));
    }
    let email = normalize(&form.email);
    if !email.contains('@') {
        return Err(ApiError::validation("Invalid email"));
    }
    check_password_len(&form.password)?;

    let username = normalize(&form.username);
    if st
        .users
        .find_by_username_or_email(Some(username.as_str()), Some(email.as_str()))
        .await?
        .is_some()
    {
        warn!(%username, %email, "registration for existing user");
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar = form
        .avatar
        .filter(|f| !f.body.is_empty())
        .ok_or_else(|| ApiError::validation("Avatar is required"))?;

    let id = Uuid::new_v4();
    let avatar_url = upload_image(st, id, ImageSlot::Avatar, avatar)
        .await
        .map_err(|e| {
            error!(error = %e, "avatar upload failed");
            ApiError::Upload("Failed to upload avatar".into())
        })?;

    let cover_url = match form.cover_image.filter(|f| !f.body.is_empty()) {
        Some(file) => match upload_image(st, id, ImageSlot::CoverImage, file).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cover image upload failed; continuing without it");
                String::new()
            }
        },
        None => String::new(),
    };

    let new_user = NewUserInput {
        id,
        full_name: &form.full_name,
        username,
        email,
        password: &form.password,
        avatar: &avatar_url,
        cover_image: &cover_url,
    };
    let created = match create_user(st, new_user).await {
        Ok(user) => user,
        Err(e) => {
            discard_image(st, &avatar_url).await;
            discard_image(st, &cover_url).await;
            return Err(e);
        }
    };

    let user = st
        .users
        .find_by_id(created.id)
        .await?
        .ok_or_else(|| {
            error!(user_id = %created.id, "created user not found on read-back");
            ApiError::Internal("Something went wrong while registering the user".into())
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user.into())
}

struct NewUserInput<'a> {
    id: Uuid,
    full_name: &'a str,
    username: String,
    email: String,
    password: &'a str,
    avatar: &'a str,
    cover_image: &'a str,
}

async fn create_user(st: &AppState, input: NewUserInput<'_>) -> Result<User, ApiError> {
    let password_hash = password::hash_password(input.password)
        .map_err(|e| ApiError::internal(e, "Something went wrong while registering the user"))?;
    let user = st
        .users
        .create(NewUser {
            id: input.id,
            username: input.username,
            email: input.email,
            full_name: input.full_name.trim().to_string(),
            password_hash,
            avatar: input.avatar.to_string(),
            cover_image: input.cover_image.to_string(),
        })
        .await?;
    Ok(user)
}

/// Signs a fresh pair and makes its refresh token the user's only live one.
async fn issue_tokens(st: &AppState, user_id: Uuid) -> Result<TokenPair, ApiError> {
    let tokens = st
        .jwt
        .issue_pair(user_id)
        .map_err(|e| ApiError::internal(e, TOKEN_FAILURE))?;
    st.users
        .set_refresh_token(user_id, Some(&tokens.refresh_token))
        .await
        .map_err(|e| ApiError::internal(e, TOKEN_FAILURE))?;
    Ok(tokens)
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<(PublicUser, TokenPair), ApiError> {
    let username = non_empty(req.username).map(|u| normalize(&u));
    let email = non_empty(req.email).map(|e| normalize(&e));
    if username.is_none() && email.is_none() {
        return Err(ApiError::validation("Username or email is required"));
    }

    let user = st
        .users
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    let ok = user
        .password_matches(&req.password)
        .map_err(|e| ApiError::internal(e, "Internal server error"))?;
    if !ok {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let tokens = issue_tokens(st, user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((user.into(), tokens))
}

pub async fn logout(st: &AppState, user: &User) -> Result<(), ApiError> {
    st.users.set_refresh_token(user.id, None).await?;
    info!(user_id = %user.id, "user logged out");
    Ok(())
}

pub async fn refresh(st: &AppState, presented: Option<String>) -> Result<TokenPair, ApiError> {
    let presented = non_empty(presented).ok_or_else(|| ApiError::validation("Unauthorized request"))?;

    let claims = st.jwt.verify_refresh(&presented).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        ApiError::unauthorized("Invalid refresh token")
    })?;

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        warn!(user_id = %user.id, "stale refresh token presented");
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let tokens = st
        .jwt
        .issue_pair(user.id)
        .map_err(|e| ApiError::internal(e, TOKEN_FAILURE))?;
    let rotated = st
        .users
        .rotate_refresh_token(user.id, &presented, &tokens.refresh_token)
        .await?;
    if !rotated {
        warn!(user_id = %user.id, "refresh token rotated concurrently");
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    info!(user_id = %user.id, "access token refreshed");
    Ok(tokens)
}

pub async fn change_password(
    st: &AppState,
    user: &User,
    req: ChangePasswordRequest,
) -> Result<(), ApiError> {
    let (Some(old), Some(new)) = (non_empty(req.old_password), non_empty(req.new_password)) else {
        return Err(ApiError::validation("Both old and new passwords are required"));
    };
    check_password_len(&new)?;

    let current = st
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    let ok = current
        .password_matches(&old)
        .map_err(|e| ApiError::internal(e, "Internal server error"))?;
    if !ok {
        return Err(ApiError::validation("Invalid old password"));
    }

    let hash =
        password::hash_password(&new).map_err(|e| ApiError::internal(e, "Internal server error"))?;
    st.users.update_password(user.id, &hash).await?;
    info!(user_id = %user.id, "password changed");
    Ok(())
}

pub async fn update_account(
    st: &AppState,
    user: &User,
    req: UpdateAccountRequest,
) -> Result<PublicUser, ApiError> {
    let (Some(full_name), Some(email)) = (non_empty(req.full_name), non_empty(req.email)) else {
        return Err(ApiError::validation("All fields are required"));
    };
    let email = normalize(&email);
    if !email.contains('@') {
        return Err(ApiError::validation("Invalid email"));
    }

    let updated = st
        .users
        .update_account(user.id, full_name.trim(), &email)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;
    info!(user_id = %user.id, "account details updated");
    Ok(updated.into())
}

pub async fn update_image(
    st: &AppState,
    user: &User,
    slot: ImageSlot,
    file: Option<UploadFile>,
) -> Result<PublicUser, ApiError> {
    let label = match slot {
        ImageSlot::Avatar => "Avatar",
        ImageSlot::CoverImage => "Cover image",
    };
    let file = file
        .filter(|f| !f.body.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{label} file is missing")))?;

    let url = upload_image(st, user.id, slot, file).await.map_err(|e| {
        error!(error = %e, slot = slot.as_str(), "image upload failed");
        ApiError::Upload(format!("Error while uploading {}", label.to_lowercase()))
    })?;

    let updated = match st.users.update_image(user.id, slot, &url).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            discard_image(st, &url).await;
            return Err(ApiError::not_found("User does not exist"));
        }
        Err(e) => {
            discard_image(st, &url).await;
            return Err(e.into());
        }
    };

    let previous = match slot {
        ImageSlot::Avatar => &user.avatar,
        ImageSlot::CoverImage => &user.cover_image,
    };
    if !previous.is_empty() && *previous != url {
        discard_image(st, previous).await;
    }

    info!(user_id = %user.id, slot = slot.as_str(), "profile image updated");
    Ok(updated.into())
}
