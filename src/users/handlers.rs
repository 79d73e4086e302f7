use std::collections::HashMap;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use bytes::Bytes;
use tracing::instrument;

use super::{
    dto::{
        ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterForm,
        UpdateAccountRequest,
    },
    repo_types::{ImageSlot, PublicUser},
    services,
};
use crate::{
    auth::{cookies, extractors::AuthUser, jwt::TokenPair},
    error::ApiError,
    media::services::UploadFile,
    response::{ApiResponse, Empty},
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/update-avatar", patch(update_avatar))
        .route("/update-coverImage", patch(update_cover_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Text fields and files of a multipart body, keyed by field name.
#[derive(Default)]
struct MultipartForm {
    texts: HashMap<String, String>,
    files: HashMap<String, UploadFile>,
}

impl MultipartForm {
    async fn read(mp: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut mp = mp?;
        let mut form = Self::default();
        while let Some(field) = mp.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .map(str::to_string)
                        .unwrap_or_else(|| "application/octet-stream".into());
                    let body = field.bytes().await?;
                    form.files.insert(
                        name,
                        UploadFile {
                            file_name: Some(file_name),
                            content_type,
                            body,
                        },
                    );
                }
                None => {
                    let text = field.text().await?;
                    form.texts.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    fn text(&mut self, name: &str) -> String {
        self.texts.remove(name).unwrap_or_default()
    }

    fn file(&mut self, name: &str) -> Option<UploadFile> {
        self.files.remove(name)
    }
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), ApiError> {
    let mut mf = MultipartForm::read(mp).await?;
    let form = RegisterForm {
        full_name: mf.text("fullName"),
        email: mf.text("email"),
        username: mf.text("username"),
        password: mf.text("password"),
        avatar: mf.file("avatar"),
        cover_image: mf.file("coverImage"),
    };

    let user = services::register(&state, form).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED,
            user,
            "User registered successfully",
        )),
    ))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ApiResponse<LoginResponse>>), ApiError> {
    let Json(payload) = payload?;
    let (user, tokens) = services::login(&state, payload).await?;

    let jar = cookies::set_session(jar, &tokens);
    let body = LoginResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    Ok((jar, Json(ApiResponse::ok(body, "User logged in successfully"))))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<Empty>>), ApiError> {
    services::logout(&state, &user).await?;
    Ok((
        cookies::clear_session(jar),
        Json(ApiResponse::ok(Empty {}, "User logged out successfully")),
    ))
}

#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<ApiResponse<TokenPair>>), ApiError> {
    let presented = cookies::refresh_token(&jar).or_else(|| {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|r| r.refresh_token)
    });

    let tokens = services::refresh(&state, presented).await?;
    let jar = cookies::set_session(jar, &tokens);
    Ok((
        jar,
        Json(ApiResponse::ok(tokens, "Access token refreshed successfully")),
    ))
}

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let Json(payload) = payload?;
    services::change_password(&state, &user, payload).await?;
    Ok(Json(ApiResponse::ok(Empty {}, "Password changed successfully")))
}

#[instrument(skip_all)]
pub async fn current_user(AuthUser(user): AuthUser) -> Json<ApiResponse<PublicUser>> {
    Json(ApiResponse::ok(
        user.into(),
        "Current user fetched successfully",
    ))
}

#[instrument(skip_all)]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let Json(payload) = payload?;
    let updated = services::update_account(&state, &user, payload).await?;
    Ok(Json(ApiResponse::ok(
        updated,
        "Account details updated successfully",
    )))
}

#[instrument(skip_all)]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let file = MultipartForm::read(mp).await?.file("avatar");
    let updated = services::update_image(&state, &user, ImageSlot::Avatar, file).await?;
    Ok(Json(ApiResponse::ok(updated, "Avatar updated successfully")))
}

#[instrument(skip_all)]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let file = MultipartForm::read(mp).await?.file("coverImage");
    let updated = services::update_image(&state, &user, ImageSlot::CoverImage, file).await?;
    Ok(Json(ApiResponse::ok(
        updated,
        "Cover image updated successfully",
    )))
}
