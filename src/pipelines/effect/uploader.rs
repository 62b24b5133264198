// SPDX-License-Identifier: MPL-2.0

//! Frame uploader: NV12 planes → plane textures

use super::resources::PlaneTextures;
use crate::backends::RenderBackend;
use crate::errors::FilterResult;
use crate::media::VideoFrame;

/// Upload the luma plane as a W×H single-channel texture and the interleaved
/// chroma plane as a (W/2)×(H/2) two-channel texture (U first, V second)
///
/// The frame must already be validated against the textures' size.
pub fn upload_frame(
    backend: &mut dyn RenderBackend,
    textures: PlaneTextures,
    frame: &VideoFrame<'_>,
) -> FilterResult<()> {
    let (luma, chroma) = frame.planes();
    backend.upload_plane(textures.luma, luma)?;
    backend.upload_plane(textures.chroma, chroma)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{PlaneFormat, SoftwareBackend};
    use crate::errors::FilterError;

    #[test]
    fn test_uploads_both_planes() {
        let mut backend = SoftwareBackend::new();
        let textures = PlaneTextures {
            luma: backend.create_texture(PlaneFormat::Luma, 4, 2).unwrap(),
            chroma: backend.create_texture(PlaneFormat::Chroma, 2, 1).unwrap(),
        };
        let calls = backend.device_calls();

        let mut data = vec![0u8; 12];
        let frame = VideoFrame::new(4, 2, &mut data);
        upload_frame(&mut backend, textures, &frame).unwrap();
        assert_eq!(backend.device_calls(), calls + 2);
    }

    #[test]
    fn test_mismatched_texture_is_rejected() {
        let mut backend = SoftwareBackend::new();
        let textures = PlaneTextures {
            luma: backend.create_texture(PlaneFormat::Luma, 4, 4).unwrap(),
            chroma: backend.create_texture(PlaneFormat::Chroma, 2, 2).unwrap(),
        };

        let mut data = vec![0u8; 12];
        let frame = VideoFrame::new(4, 2, &mut data);
        assert!(matches!(
            upload_frame(&mut backend, textures, &frame),
            Err(FilterError::Precondition(_))
        ));
    }
}
