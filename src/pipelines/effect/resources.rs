// SPDX-License-Identifier: MPL-2.0

//! Device resource set
//!
//! Owns every handle the filter creates on its backend: the effect program and
//! quad geometry (created once), plus the size-dependent plane textures and
//! staging ring (recreated whenever the frame size changes).

use crate::backends::{BufferId, GeometryId, PlaneFormat, ProgramId, RenderBackend, TextureId};
use crate::constants::STAGING_RING_SIZE;
use crate::errors::FilterResult;
use crate::media::FrameSize;
use crate::shaders::{NV12_EFFECT_SHADER, QUAD_INDICES, QUAD_VERTICES};
use tracing::{debug, error, info};

/// Luma and chroma textures for one frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneTextures {
    pub luma: TextureId,
    pub chroma: TextureId,
}

#[derive(Debug, Clone, Copy)]
struct SizedResources {
    size: FrameSize,
    planes: PlaneTextures,
    staging: [BufferId; STAGING_RING_SIZE],
}

/// Handles owned by one filter instance
#[derive(Debug, Default)]
pub struct DeviceResourceSet {
    program: Option<ProgramId>,
    geometry: Option<GeometryId>,
    sized: Option<SizedResources>,
}

impl DeviceResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program and geometry exist
    pub fn is_initialized(&self) -> bool {
        self.program.is_some() && self.geometry.is_some()
    }

    /// Build the effect program and quad geometry; no-op when already built
    ///
    /// # Returns
    /// * `Err(FilterError::ResourceCreation)` - The program failed to build
    pub fn initialize(&mut self, backend: &mut dyn RenderBackend) -> FilterResult<()> {
        if self.is_initialized() {
            debug!("Device resources already initialized");
            return Ok(());
        }

        let program = match self.program {
            Some(program) => program,
            None => {
                let program = backend.create_program(NV12_EFFECT_SHADER).inspect_err(|e| {
                    error!(error = %e, backend = %backend.describe(), "Failed to build effect program");
                })?;
                self.program = Some(program);
                program
            }
        };

        let geometry = backend.create_geometry(&QUAD_VERTICES, &QUAD_INDICES)?;
        self.geometry = Some(geometry);

        info!(
            program = program.raw(),
            geometry = geometry.raw(),
            backend = %backend.describe(),
            "Effect pipeline initialized"
        );
        Ok(())
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn geometry(&self) -> Option<GeometryId> {
        self.geometry
    }

    /// Size the textures and staging ring were allocated for
    pub fn size(&self) -> Option<FrameSize> {
        self.sized.map(|s| s.size)
    }

    pub fn planes(&self) -> Option<PlaneTextures> {
        self.sized.map(|s| s.planes)
    }

    /// Staging buffer of ring slot `slot`
    pub fn staging(&self, slot: usize) -> Option<BufferId> {
        self.sized.and_then(|s| s.staging.get(slot).copied())
    }

    /// Reallocate the size-dependent resources when `size` differs from the
    /// last one seen
    ///
    /// On failure everything created by this call is destroyed again and the
    /// set is left without sized resources.
    ///
    /// # Returns
    /// * `Ok(true)` - Resources were (re)created; the staging ring must be reset
    /// * `Ok(false)` - Size unchanged
    pub fn ensure_size(
        &mut self,
        backend: &mut dyn RenderBackend,
        size: FrameSize,
    ) -> FilterResult<bool> {
        if self.size() == Some(size) {
            return Ok(false);
        }

        if let Some(previous) = self.size() {
            info!(from = %previous, to = %size, "Frame size changed, re-provisioning");
        } else {
            debug!(size = %size, "Provisioning frame resources");
        }
        self.release_sized(backend);

        let mut textures: Vec<TextureId> = Vec::with_capacity(2);
        let mut buffers: Vec<BufferId> = Vec::with_capacity(STAGING_RING_SIZE);
        let result = create_sized(backend, size, &mut textures, &mut buffers);

        if let Err(e) = result {
            error!(error = %e, size = %size, "Failed to provision frame resources");
            for texture in textures {
                backend.destroy_texture(texture);
            }
            for buffer in buffers {
                backend.destroy_buffer(buffer);
            }
            return Err(e);
        }

        self.sized = Some(SizedResources {
            size,
            planes: PlaneTextures {
                luma: textures[0],
                chroma: textures[1],
            },
            staging: std::array::from_fn(|slot| buffers[slot]),
        });
        Ok(true)
    }

    /// Sizes in bytes of the staging ring buffers
    pub fn staging_buffer_sizes(&self, backend: &dyn RenderBackend) -> Vec<u64> {
        self.sized
            .map(|s| {
                s.staging
                    .iter()
                    .filter_map(|&buffer| backend.staging_buffer_size(buffer))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Extents of the (luma, chroma) textures
    pub fn texture_extents(
        &self,
        backend: &dyn RenderBackend,
    ) -> Option<((u32, u32), (u32, u32))> {
        let planes = self.planes()?;
        Some((
            backend.texture_extent(planes.luma)?,
            backend.texture_extent(planes.chroma)?,
        ))
    }

    fn release_sized(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(sized) = self.sized.take() {
            backend.destroy_texture(sized.planes.luma);
            backend.destroy_texture(sized.planes.chroma);
            for buffer in sized.staging {
                backend.destroy_buffer(buffer);
            }
        }
    }

    /// Destroy every handle
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        self.release_sized(backend);
        if let Some(geometry) = self.geometry.take() {
            backend.destroy_geometry(geometry);
        }
        if let Some(program) = self.program.take() {
            backend.destroy_program(program);
        }
    }
}

/// Create plane textures then the staging ring, collecting handles as they
/// are created
fn create_sized(
    backend: &mut dyn RenderBackend,
    size: FrameSize,
    textures: &mut Vec<TextureId>,
    buffers: &mut Vec<BufferId>,
) -> FilterResult<()> {
    let (chroma_width, chroma_height) = size.chroma_dims();
    textures.push(backend.create_texture(PlaneFormat::Luma, size.width, size.height)?);
    textures.push(backend.create_texture(PlaneFormat::Chroma, chroma_width, chroma_height)?);
    for _ in 0..STAGING_RING_SIZE {
        buffers.push(backend.create_staging_buffer(size.width, size.height)?);
    }
    Ok(())
}
