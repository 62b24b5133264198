// SPDX-License-Identifier: MPL-2.0

//! Render backend abstraction
//!
//! The effect pipeline talks to the device only through [`RenderBackend`]:
//! every device object is an opaque handle with an explicit create/destroy
//! pair, and the pipeline owns the handles it creates.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │      Nv12EffectFilter        │  ← resource set, uploader, readback ring
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │   RenderBackend trait        │  ← handles + create/destroy pairs
//! └──────┬────────────────┬──────┘
//!        │                │
//!        ▼                ▼
//!   ┌─────────┐     ┌───────────┐
//!   │  wgpu   │     │ software  │  ← CPU reference / fallback
//!   └─────────┘     └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`wgpu_backend`]: GPU implementation on wgpu
//! - [`software`]: CPU implementation of the same program

pub mod software;
pub mod wgpu_backend;

use crate::config::Config;
use crate::errors::FilterResult;
use crate::shaders::{Effect, QuadVertex};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use software::{FaultPoint, SoftwareBackend};
pub use wgpu_backend::WgpuBackend;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Raw identifier, unique per backend instance
            pub fn raw(&self) -> u32 {
                self.0
            }
        }
    };
}

resource_id!(
    /// Linked effect program
    ProgramId
);
resource_id!(
    /// Vertex + index buffer pair of the full-screen quad
    GeometryId
);
resource_id!(
    /// 2D plane texture
    TextureId
);
resource_id!(
    /// Readback staging buffer
    BufferId
);

/// Texel layout of an uploaded plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneFormat {
    /// One byte per texel (Y)
    Luma,
    /// Two bytes per texel (U, V)
    Chroma,
}

impl PlaneFormat {
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            PlaneFormat::Luma => 1,
            PlaneFormat::Chroma => 2,
        }
    }
}

/// Everything one draw of the effect program needs
#[derive(Debug, Clone, Copy)]
pub struct DrawPass {
    pub program: ProgramId,
    pub geometry: GeometryId,
    pub luma: TextureId,
    pub chroma: TextureId,
    pub width: u32,
    pub height: u32,
    pub effect: Effect,
}

/// Resource kinds tracked by [`ResourceStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Program,
    Geometry,
    Texture,
    Buffer,
}

/// Live and lifetime-total resource counts of a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub live_programs: usize,
    pub live_geometries: usize,
    pub live_textures: usize,
    pub live_buffers: usize,
    pub programs_created: usize,
    pub geometries_created: usize,
    pub textures_created: usize,
    pub buffers_created: usize,
}

impl ResourceStats {
    pub(crate) fn on_create(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::Program => {
                self.live_programs += 1;
                self.programs_created += 1;
            }
            ResourceKind::Geometry => {
                self.live_geometries += 1;
                self.geometries_created += 1;
            }
            ResourceKind::Texture => {
                self.live_textures += 1;
                self.textures_created += 1;
            }
            ResourceKind::Buffer => {
                self.live_buffers += 1;
                self.buffers_created += 1;
            }
        }
    }

    pub(crate) fn on_destroy(&mut self, kind: ResourceKind) {
        let live = match kind {
            ResourceKind::Program => &mut self.live_programs,
            ResourceKind::Geometry => &mut self.live_geometries,
            ResourceKind::Texture => &mut self.live_textures,
            ResourceKind::Buffer => &mut self.live_buffers,
        };
        *live = live.saturating_sub(1);
    }

    /// Total live device objects
    pub fn live_total(&self) -> usize {
        self.live_programs + self.live_geometries + self.live_textures + self.live_buffers
    }
}

/// Render backend type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// GPU when an adapter is available, software otherwise
    #[default]
    Auto,
    /// wgpu only; fail when no adapter is available
    Gpu,
    /// CPU reference implementation
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Auto => write!(f, "auto"),
            BackendType::Gpu => write!(f, "gpu"),
            BackendType::Software => write!(f, "software"),
        }
    }
}

/// Device operations the effect pipeline is built on
///
/// Handles returned by a backend are only valid with that backend. Passing a
/// destroyed or foreign handle yields `FilterError::Precondition`.
pub trait RenderBackend {
    // ===== Metadata =====

    /// Concrete backend type (never `Auto`)
    fn backend_type(&self) -> BackendType;

    /// Human readable device description for logs
    fn describe(&self) -> String;

    /// Resource counters
    fn stats(&self) -> ResourceStats;

    // ===== Program and geometry =====

    /// Compile and link the effect program
    ///
    /// # Returns
    /// * `Ok(ProgramId)` - Program ready to draw with
    /// * `Err(FilterError::ResourceCreation)` - Compile or link failed
    fn create_program(&mut self, source: &str) -> FilterResult<ProgramId>;

    fn destroy_program(&mut self, program: ProgramId);

    /// Upload the quad's vertex and index data
    fn create_geometry(
        &mut self,
        vertices: &[QuadVertex],
        indices: &[u16],
    ) -> FilterResult<GeometryId>;

    fn destroy_geometry(&mut self, geometry: GeometryId);

    // ===== Textures =====

    /// Allocate a plane texture sampled nearest with clamp-to-edge addressing
    fn create_texture(
        &mut self,
        format: PlaneFormat,
        width: u32,
        height: u32,
    ) -> FilterResult<TextureId>;

    fn destroy_texture(&mut self, texture: TextureId);

    /// Texture extent as (width, height)
    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)>;

    /// Overwrite a texture's content with tightly packed rows
    fn upload_plane(&mut self, texture: TextureId, data: &[u8]) -> FilterResult<()>;

    // ===== Staging buffers =====

    /// Allocate a staging buffer able to receive a `width`×`height` RGBA8 image
    fn create_staging_buffer(&mut self, width: u32, height: u32) -> FilterResult<BufferId>;

    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Allocated size in bytes
    fn staging_buffer_size(&self, buffer: BufferId) -> Option<u64>;

    // ===== Frame =====

    /// Clear the render target and draw the quad with the effect program
    fn draw(&mut self, pass: &DrawPass) -> FilterResult<()>;

    /// Queue a copy of the render target into `buffer` without waiting for it
    fn request_readback(&mut self, buffer: BufferId) -> FilterResult<()>;

    /// Copy the contents resident in `buffer` into `out` (`W*H*4` bytes)
    ///
    /// Waits for an outstanding transfer into this buffer if there is one.
    fn read_staging(&mut self, buffer: BufferId, out: &mut [u8]) -> FilterResult<()>;
}

impl<T: RenderBackend + ?Sized> RenderBackend for Box<T> {
    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn stats(&self) -> ResourceStats {
        (**self).stats()
    }

    fn create_program(&mut self, source: &str) -> FilterResult<ProgramId> {
        (**self).create_program(source)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        (**self).destroy_program(program)
    }

    fn create_geometry(
        &mut self,
        vertices: &[QuadVertex],
        indices: &[u16],
    ) -> FilterResult<GeometryId> {
        (**self).create_geometry(vertices, indices)
    }

    fn destroy_geometry(&mut self, geometry: GeometryId) {
        (**self).destroy_geometry(geometry)
    }

    fn create_texture(
        &mut self,
        format: PlaneFormat,
        width: u32,
        height: u32,
    ) -> FilterResult<TextureId> {
        (**self).create_texture(format, width, height)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        (**self).destroy_texture(texture)
    }

    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)> {
        (**self).texture_extent(texture)
    }

    fn upload_plane(&mut self, texture: TextureId, data: &[u8]) -> FilterResult<()> {
        (**self).upload_plane(texture, data)
    }

    fn create_staging_buffer(&mut self, width: u32, height: u32) -> FilterResult<BufferId> {
        (**self).create_staging_buffer(width, height)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        (**self).destroy_buffer(buffer)
    }

    fn staging_buffer_size(&self, buffer: BufferId) -> Option<u64> {
        (**self).staging_buffer_size(buffer)
    }

    fn draw(&mut self, pass: &DrawPass) -> FilterResult<()> {
        (**self).draw(pass)
    }

    fn request_readback(&mut self, buffer: BufferId) -> FilterResult<()> {
        (**self).request_readback(buffer)
    }

    fn read_staging(&mut self, buffer: BufferId, out: &mut [u8]) -> FilterResult<()> {
        (**self).read_staging(buffer, out)
    }
}

/// Create the backend selected by the configuration
///
/// `Auto` falls back to the software backend when no GPU device can be
/// created.
pub fn create_backend(config: &Config) -> FilterResult<Box<dyn RenderBackend>> {
    match config.backend {
        BackendType::Software => Ok(Box::new(SoftwareBackend::new())),
        BackendType::Gpu => Ok(Box::new(WgpuBackend::new(config.power_preference.into())?)),
        BackendType::Auto => match WgpuBackend::new(config.power_preference.into()) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                warn!(error = %e, "GPU backend unavailable, using software backend");
                Ok(Box::new(SoftwareBackend::new()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_track_live_and_total() {
        let mut stats = ResourceStats::default();
        stats.on_create(ResourceKind::Texture);
        stats.on_create(ResourceKind::Texture);
        stats.on_destroy(ResourceKind::Texture);
        stats.on_create(ResourceKind::Buffer);

        assert_eq!(stats.live_textures, 1);
        assert_eq!(stats.textures_created, 2);
        assert_eq!(stats.live_total(), 2);
    }

    #[test]
    fn test_destroy_never_underflows() {
        let mut stats = ResourceStats::default();
        stats.on_destroy(ResourceKind::Program);
        assert_eq!(stats.live_programs, 0);
    }

    #[test]
    fn test_plane_format_texel_size() {
        assert_eq!(PlaneFormat::Luma.bytes_per_texel(), 1);
        assert_eq!(PlaneFormat::Chroma.bytes_per_texel(), 2);
    }
}
