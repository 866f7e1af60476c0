//! Signed, short-lived, single-use QR tokens
//!
//! - [`codec`]: pure sign/verify over the payload
//! - [`registry`]: issuance, ordered validation and single-use consumption
//! - [`cache`]: timed fast-path presence cache
//! - [`render`]: QR image rendering

pub mod cache;
pub mod codec;
pub mod error;
pub mod registry;
pub mod render;
pub mod types;

pub use cache::{TimedTokenCache, TokenCache};
pub use codec::{CodecError, TokenCodec, TokenPayload, code_hash};
pub use error::TokenError;
pub use registry::{
    DEFAULT_TTL_SECONDS, IssuedToken, MAX_TTL_SECONDS, TokenRegistry, TokenValidation, ValidToken,
    bounded_ttl,
};
pub use types::{Purpose, TokenReason, TokenRecord};
