//! JWT 认证模块
//!
//! 提供 JWT token 生成、验证，以及基于 token 的身份解析。

use std::sync::Arc;

use application::{ApplicationError, IdentityResolver, UserRepository};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApplicationError> {
        let exp = time::OffsetDateTime::now_utc()
            + time::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            sub: user_id.into(),
            exp: exp.unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| {
                ApplicationError::infrastructure_with_source("token generation failed", err)
            })
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApplicationError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "invalid token");
                ApplicationError::Authentication
            })
    }
}

/// 从 `Authorization: Bearer <token>` 中取出 token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 校验 token 并确认对应用户仍然存在
pub struct JwtIdentityResolver {
    jwt: Arc<JwtService>,
    users: Arc<dyn UserRepository>,
}

impl JwtIdentityResolver {
    pub fn new(jwt: Arc<JwtService>, users: Arc<dyn UserRepository>) -> Self {
        Self { jwt, users }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<UserId, ApplicationError> {
        let claims = self.jwt.verify_token(credential)?;
        let user_id = UserId::from(claims.sub);

        match self.users.find_by_id(user_id).await? {
            Some(_) => Ok(user_id),
            None => {
                tracing::debug!(user_id = %user_id, "token subject does not exist");
                Err(ApplicationError::Authentication)
            }
        }
    }
}

/// 已认证的调用方
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApplicationError::Authentication)?;
        let user_id = state.identity.resolve(token).await?;
        Ok(AuthUser(user_id))
    }
}
