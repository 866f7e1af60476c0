//! QR rendering. Runs before any row lock is taken.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::{QrCode, render::svg};

use super::error::TokenError;

/// Render `content` as an SVG QR code wrapped in a data URL.
pub fn qr_data_url(content: &str) -> Result<String, TokenError> {
    let qr = QrCode::new(content.as_bytes())
        .map_err(|e| TokenError::Render(format!("Failed to create QR code: {}", e)))?;

    let svg = qr.render::<svg::Color>().min_dimensions(200, 200).build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
}
