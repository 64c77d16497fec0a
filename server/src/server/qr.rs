//! Pairing code rendering

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encode failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("PNG encode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Render `code` as a PNG at least `width` pixels wide
pub fn render_png(code: &str, width: u32) -> Result<Vec<u8>, QrError> {
    let qr = QrCode::new(code.as_bytes())?;
    let img = qr
        .render::<Luma<u8>>()
        .min_dimensions(width, width)
        .quiet_zone(true)
        .build();

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Render `code` as block characters for log output
pub fn render_terminal(code: &str) -> Result<String, QrError> {
    let qr = QrCode::new(code.as_bytes())?;
    Ok(qr
        .render::<qrcode::render::unicode::Dense1x2>()
        .quiet_zone(true)
        .build())
}

/// Minimal page embedding the PNG as a data URI
pub fn render_html(png: &[u8]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta http-equiv="refresh" content="20"><title>Scan to pair</title></head>
<body style="display:flex;flex-direction:column;align-items:center;font-family:sans-serif">
<h2>Scan with your phone to link this session</h2>
<img alt="pairing QR code" src="data:image/png;base64,{}"/>
<p>The code expires after about a minute; this page refreshes itself.</p>
</body>
</html>"#,
        STANDARD.encode(png)
    )
}
