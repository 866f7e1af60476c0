//! Caller identity supplied by the upstream identity service
//!
//! The session layer in front of this service authenticates the user and
//! forwards `x-user-id` / `x-user-role`. They are trusted as-is.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::response::ApiError;
use crate::core_types::UserId;
use crate::directory::Role;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Reject unless the caller holds one of `roles`
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "role {} may not call this endpoint",
                self.role
            )))
        }
    }

    /// Whose wallet a request acts on: admins may name anyone, others act on themselves.
    pub fn subject(&self, requested: Option<UserId>) -> Result<UserId, ApiError> {
        match requested {
            None => Ok(self.user_id),
            Some(id) if id == self.user_id || self.is_admin() => Ok(id),
            Some(_) => Err(ApiError::forbidden("cannot act on another user's wallet")),
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::unauthorized(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| ApiError::unauthorized(format!("invalid {} header", name)))
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = Uuid::parse_str(header(parts, USER_ID_HEADER)?.trim())
            .map_err(|_| ApiError::unauthorized("x-user-id is not a UUID"))?;
        let role = header(parts, USER_ROLE_HEADER)?
            .trim()
            .parse::<Role>()
            .map_err(ApiError::unauthorized)?;
        Ok(Caller { user_id, role })
    }
}
