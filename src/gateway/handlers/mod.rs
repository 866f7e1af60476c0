//! HTTP handlers, one file per resource

mod health;
mod meals;
mod settlements;
mod tokens;
mod wallet;

pub use health::*;
pub use meals::*;
pub use settlements::*;
pub use tokens::*;
pub use wallet::*;

use axum::http::StatusCode;

use super::identity::Caller;
use super::response::ApiError;
use super::state::AppState;
use crate::core_types::VendorId;
use crate::directory::{Role, Vendor};

/// Admins see every vendor; a vendor user only the vendors they operate.
pub(crate) async fn ensure_vendor_access(
    state: &AppState,
    caller: &Caller,
    vendor_id: VendorId,
) -> Result<Option<Vendor>, ApiError> {
    match caller.role {
        Role::Admin => Ok(None),
        Role::Vendor => {
            let vendor = state.store.get_vendor(vendor_id).await?.ok_or_else(|| {
                ApiError::new(StatusCode::NOT_FOUND, "VENDOR_NOT_FOUND", "Vendor not found")
            })?;
            if !vendor.is_operated_by(caller.user_id) {
                tracing::warn!(caller = %caller.user_id, vendor_id = %vendor_id, "Vendor access denied");
                return Err(ApiError::forbidden("caller does not operate this vendor"));
            }
            Ok(Some(vendor))
        }
        Role::Student => Err(ApiError::forbidden("vendor endpoint")),
    }
}
