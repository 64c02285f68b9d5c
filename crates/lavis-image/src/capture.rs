// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Primary-display capture (`ScreenSource`, spec component C2).

use std::io::Cursor;

use crate::{resize_if_needed, EncodedImage, ImageError};

/// A single screen capture: the decoded bitmap plus logical size metadata.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: image::DynamicImage,
    pub logical_width: u32,
    pub logical_height: u32,
    pub scale_factor: f32,
}

/// Captures the primary display and produces base64-ready frames.
///
/// A trait (rather than a bare function) so `MicroExecutor` can be tested
/// against a fake source that never touches the real display.
pub trait ScreenSource: Send + Sync {
    /// Capture the primary display. Returns [`ImageError::Permission`] if the
    /// OS denies screen-recording access; never panics into the caller.
    fn capture(&self) -> Result<CapturedFrame, ImageError>;

    /// Capture and encode as base64, optionally downscaled to a thumbnail.
    fn capture_as_base64(&self, thumbnail: bool) -> Result<EncodedImage, ImageError> {
        let frame = self.capture()?;
        let img = if thumbnail {
            frame.image.thumbnail(512, 512)
        } else {
            resize_if_needed(frame.image)
        };
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        Ok(EncodedImage {
            mime_type: "image/png".into(),
            bytes: out.into_inner(),
        })
    }
}

/// [`ScreenSource`] backed by `xcap`'s cross-platform monitor capture.
pub struct XcapScreenSource;

impl ScreenSource for XcapScreenSource {
    fn capture(&self) -> Result<CapturedFrame, ImageError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| classify_xcap_error(e.to_string()))?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| xcap::Monitor::all().ok().and_then(|mut m| m.pop()))
            .ok_or_else(|| ImageError::Capture("no monitors found".into()))?;

        let rgba = monitor
            .capture_image()
            .map_err(|e| classify_xcap_error(e.to_string()))?;
        let width = rgba.width();
        let height = rgba.height();
        let scale_factor = monitor.scale_factor().unwrap_or(1.0);

        Ok(CapturedFrame {
            image: image::DynamicImage::ImageRgba8(rgba),
            logical_width: (width as f32 / scale_factor).round() as u32,
            logical_height: (height as f32 / scale_factor).round() as u32,
            scale_factor,
        })
    }
}

/// `xcap` surfaces permission failures (macOS Screen Recording,
/// Wayland portal denial) as plain error strings; match on the wording
/// rather than a typed variant so the `PERMISSION` tag still reaches callers.
fn classify_xcap_error(msg: String) -> ImageError {
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        ImageError::Permission(msg)
    } else {
        ImageError::Capture(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource {
        frame: CapturedFrame,
    }

    impl ScreenSource for FakeSource {
        fn capture(&self) -> Result<CapturedFrame, ImageError> {
            Ok(self.frame.clone())
        }
    }

    fn solid_frame(w: u32, h: u32) -> CapturedFrame {
        CapturedFrame {
            image: image::DynamicImage::ImageRgb8(image::RgbImage::new(w, h)),
            logical_width: w,
            logical_height: h,
            scale_factor: 1.0,
        }
    }

    #[test]
    fn capture_as_base64_produces_png() {
        let source = FakeSource {
            frame: solid_frame(4, 4),
        };
        let encoded = source.capture_as_base64(false).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert!(!encoded.bytes.is_empty());
    }

    #[test]
    fn capture_as_base64_thumbnail_is_smaller_than_original() {
        let source = FakeSource {
            frame: solid_frame(4000, 4000),
        };
        let full = source.capture_as_base64(false).unwrap();
        let thumb = source.capture_as_base64(true).unwrap();
        assert!(thumb.bytes.len() <= full.bytes.len());
    }

    #[test]
    fn classify_permission_error() {
        match classify_xcap_error("Permission denied by the operating system".into()) {
            ImageError::Permission(_) => {}
            other => panic!("expected Permission, got {other:?}"),
        }
    }

    #[test]
    fn classify_generic_capture_error() {
        match classify_xcap_error("no display attached".into()) {
            ImageError::Capture(_) => {}
            other => panic!("expected Capture, got {other:?}"),
        }
    }
}
