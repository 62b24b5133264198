// SPDX-License-Identifier: MPL-2.0

//! CPU render backend
//!
//! Executes the effect program pixel by pixel with the functions in
//! [`crate::shaders::colorimetry`]. Used when no GPU adapter is available and
//! as the deterministic device for tests: it counts every device call and can
//! be told to fail specific operations.
//!
//! Transfers complete immediately, so a staging buffer holds the render
//! target as of its last `request_readback`.

use super::{
    BackendType, BufferId, DrawPass, GeometryId, PlaneFormat, ProgramId, RenderBackend,
    ResourceKind, ResourceStats, TextureId,
};
use crate::constants::BYTES_PER_PIXEL;
use crate::errors::{FilterError, FilterResult};
use crate::shaders::{QuadVertex, colorimetry};
use std::collections::HashMap;
use tracing::debug;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    CreateProgram,
    CreateGeometry,
    CreateTexture,
    CreateBuffer,
    Upload,
    Draw,
    Readback,
}

#[derive(Debug)]
struct ScheduledFault {
    point: FaultPoint,
    /// Matching calls that still succeed before the failure
    skip: usize,
}

#[derive(Debug)]
struct SoftTexture {
    format: PlaneFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
struct SoftBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct RenderTarget {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// CPU implementation of [`RenderBackend`]
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    next_id: u32,
    programs: HashMap<ProgramId, ()>,
    geometries: HashMap<GeometryId, usize>,
    textures: HashMap<TextureId, SoftTexture>,
    buffers: HashMap<BufferId, SoftBuffer>,
    target: RenderTarget,
    stats: ResourceStats,
    device_calls: usize,
    draws: usize,
    faults: Vec<ScheduledFault>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of device operations issued so far (queries excluded)
    pub fn device_calls(&self) -> usize {
        self.device_calls
    }

    /// Number of completed draws
    pub fn draws(&self) -> usize {
        self.draws
    }

    /// Make the next call of `point` fail
    pub fn inject_fault(&mut self, point: FaultPoint) {
        self.inject_fault_after(point, 0);
    }

    /// Let `skip` calls of `point` succeed, then fail the next one
    pub fn inject_fault_after(&mut self, point: FaultPoint, skip: usize) {
        self.faults.push(ScheduledFault { point, skip });
    }

    fn next_raw_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Count a device call and consume a matching scheduled fault
    fn enter(&mut self, point: FaultPoint) -> bool {
        self.device_calls += 1;
        let Some(index) = self.faults.iter().position(|f| f.point == point) else {
            return false;
        };
        if self.faults[index].skip > 0 {
            self.faults[index].skip -= 1;
            return false;
        }
        self.faults.remove(index);
        true
    }

    fn injected(point: FaultPoint) -> FilterError {
        let msg = format!("injected {:?} failure", point);
        match point {
            FaultPoint::CreateProgram => FilterError::ResourceCreation(msg),
            _ => FilterError::DeviceState(msg),
        }
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        if self.target.width != width || self.target.height != height {
            debug!(width, height, "Resizing software render target");
            self.target = RenderTarget {
                width,
                height,
                pixels: vec![0; (width * height * BYTES_PER_PIXEL) as usize],
            };
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }

    fn describe(&self) -> String {
        "software (CPU reference)".to_string()
    }

    fn stats(&self) -> ResourceStats {
        self.stats
    }

    fn create_program(&mut self, source: &str) -> FilterResult<ProgramId> {
        if self.enter(FaultPoint::CreateProgram) {
            return Err(Self::injected(FaultPoint::CreateProgram));
        }
        for entry_point in ["fn vs_main", "fn fs_main"] {
            if !source.contains(entry_point) {
                return Err(FilterError::ResourceCreation(format!(
                    "program is missing entry point `{}`",
                    entry_point.trim_start_matches("fn ")
                )));
            }
        }
        let id = ProgramId::new(self.next_raw_id());
        self.programs.insert(id, ());
        self.stats.on_create(ResourceKind::Program);
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.device_calls += 1;
        if self.programs.remove(&program).is_some() {
            self.stats.on_destroy(ResourceKind::Program);
        }
    }

    fn create_geometry(
        &mut self,
        vertices: &[QuadVertex],
        indices: &[u16],
    ) -> FilterResult<GeometryId> {
        if self.enter(FaultPoint::CreateGeometry) {
            return Err(Self::injected(FaultPoint::CreateGeometry));
        }
        if indices.iter().any(|&i| i as usize >= vertices.len()) {
            return Err(FilterError::Precondition(
                "quad index out of vertex range".to_string(),
            ));
        }
        let id = GeometryId::new(self.next_raw_id());
        self.geometries.insert(id, indices.len());
        self.stats.on_create(ResourceKind::Geometry);
        Ok(id)
    }

    fn destroy_geometry(&mut self, geometry: GeometryId) {
        self.device_calls += 1;
        if self.geometries.remove(&geometry).is_some() {
            self.stats.on_destroy(ResourceKind::Geometry);
        }
    }

    fn create_texture(
        &mut self,
        format: PlaneFormat,
        width: u32,
        height: u32,
    ) -> FilterResult<TextureId> {
        if self.enter(FaultPoint::CreateTexture) {
            return Err(Self::injected(FaultPoint::CreateTexture));
        }
        let id = TextureId::new(self.next_raw_id());
        self.textures.insert(
            id,
            SoftTexture {
                format,
                width,
                height,
                data: vec![0; (width * height * format.bytes_per_texel()) as usize],
            },
        );
        self.stats.on_create(ResourceKind::Texture);
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.device_calls += 1;
        if self.textures.remove(&texture).is_some() {
            self.stats.on_destroy(ResourceKind::Texture);
        }
    }

    fn texture_extent(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn upload_plane(&mut self, texture: TextureId, data: &[u8]) -> FilterResult<()> {
        if self.enter(FaultPoint::Upload) {
            return Err(Self::injected(FaultPoint::Upload));
        }
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| FilterError::Precondition(format!("unknown texture {:?}", texture)))?;
        if data.len() != tex.data.len() {
            return Err(FilterError::Precondition(format!(
                "{:?} plane upload for {}x{} needs {} bytes, got {}",
                tex.format,
                tex.width,
                tex.height,
                tex.data.len(),
                data.len()
            )));
        }
        tex.data.copy_from_slice(data);
        Ok(())
    }

    fn create_staging_buffer(&mut self, width: u32, height: u32) -> FilterResult<BufferId> {
        if self.enter(FaultPoint::CreateBuffer) {
            return Err(Self::injected(FaultPoint::CreateBuffer));
        }
        let id = BufferId::new(self.next_raw_id());
        self.buffers.insert(
            id,
            SoftBuffer {
                width,
                height,
                data: vec![0; (width * height * BYTES_PER_PIXEL) as usize],
            },
        );
        self.stats.on_create(ResourceKind::Buffer);
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.device_calls += 1;
        if self.buffers.remove(&buffer).is_some() {
            self.stats.on_destroy(ResourceKind::Buffer);
        }
    }

    fn staging_buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.buffers.get(&buffer).map(|b| b.data.len() as u64)
    }

    fn draw(&mut self, pass: &DrawPass) -> FilterResult<()> {
        if self.enter(FaultPoint::Draw) {
            return Err(Self::injected(FaultPoint::Draw));
        }
        if !self.programs.contains_key(&pass.program) {
            return Err(FilterError::Precondition(format!(
                "unknown program {:?}",
                pass.program
            )));
        }
        if !self.geometries.contains_key(&pass.geometry) {
            return Err(FilterError::Precondition(format!(
                "unknown geometry {:?}",
                pass.geometry
            )));
        }

        let (width, height) = (pass.width, pass.height);
        let (chroma_width, chroma_height) = (width / 2, height / 2);
        match (
            self.texture_extent(pass.luma),
            self.texture_extent(pass.chroma),
        ) {
            (Some(luma), Some(chroma))
                if luma == (width, height) && chroma == (chroma_width, chroma_height) => {}
            (luma, chroma) => {
                return Err(FilterError::DeviceState(format!(
                    "plane textures {:?}/{:?} do not match a {}x{} draw",
                    luma, chroma, width, height
                )));
            }
        }

        self.resize_target(width, height);
        self.target.pixels.fill(0);

        let luma = &self.textures[&pass.luma].data;
        let chroma = &self.textures[&pass.chroma].data;
        let (w, cw) = (width as usize, chroma_width as usize);
        for (index, pixel) in self
            .target
            .pixels
            .chunks_exact_mut(BYTES_PER_PIXEL as usize)
            .enumerate()
        {
            let (x, y) = (index % w, index / w);
            let pair = 2 * ((y / 2) * cw + x / 2);
            let shaded =
                colorimetry::shade_pixel(luma[index], chroma[pair], chroma[pair + 1], pass.effect);
            pixel.copy_from_slice(&shaded);
        }

        self.draws += 1;
        Ok(())
    }

    fn request_readback(&mut self, buffer: BufferId) -> FilterResult<()> {
        if self.enter(FaultPoint::Readback) {
            return Err(Self::injected(FaultPoint::Readback));
        }
        let staging = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| FilterError::Precondition(format!("unknown buffer {:?}", buffer)))?;
        if (staging.width, staging.height) != (self.target.width, self.target.height) {
            return Err(FilterError::DeviceState(format!(
                "staging buffer sized {}x{} cannot receive a {}x{} target",
                staging.width, staging.height, self.target.width, self.target.height
            )));
        }
        staging.data.copy_from_slice(&self.target.pixels);
        Ok(())
    }

    fn read_staging(&mut self, buffer: BufferId, out: &mut [u8]) -> FilterResult<()> {
        self.device_calls += 1;
        let staging = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| FilterError::Precondition(format!("unknown buffer {:?}", buffer)))?;
        if out.len() != staging.data.len() {
            return Err(FilterError::Precondition(format!(
                "readback destination must be {} bytes, got {}",
                staging.data.len(),
                out.len()
            )));
        }
        out.copy_from_slice(&staging.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{Effect, NV12_EFFECT_SHADER, QUAD_INDICES, QUAD_VERTICES};

    fn draw_setup(backend: &mut SoftwareBackend, width: u32, height: u32) -> DrawPass {
        let program = backend.create_program(NV12_EFFECT_SHADER).unwrap();
        let geometry = backend.create_geometry(&QUAD_VERTICES, &QUAD_INDICES).unwrap();
        let luma = backend
            .create_texture(PlaneFormat::Luma, width, height)
            .unwrap();
        let chroma = backend
            .create_texture(PlaneFormat::Chroma, width / 2, height / 2)
            .unwrap();
        DrawPass {
            program,
            geometry,
            luma,
            chroma,
            width,
            height,
            effect: Effect::Identity,
        }
    }

    #[test]
    fn test_program_requires_entry_points() {
        let mut backend = SoftwareBackend::new();
        let err = backend.create_program("fn fs_main() {}").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(backend.stats().live_programs, 0);
    }

    #[test]
    fn test_draw_samples_block_chroma() {
        let mut backend = SoftwareBackend::new();
        let pass = draw_setup(&mut backend, 4, 2);
        backend.upload_plane(pass.luma, &[50, 60, 70, 80, 90, 100, 110, 120]).unwrap();
        backend.upload_plane(pass.chroma, &[100, 150, 200, 60]).unwrap();
        backend.draw(&pass).unwrap();
        assert_eq!(backend.draws(), 1);

        let buffer = backend.create_staging_buffer(4, 2).unwrap();
        backend.request_readback(buffer).unwrap();
        let mut out = vec![0u8; 32];
        backend.read_staging(buffer, &mut out).unwrap();

        // Pixel (1, 1) belongs to block 0, pixel (2, 0) to block 1
        let p = |i: usize| &out[4 * i..4 * i + 4];
        assert_eq!(p(5), colorimetry::shade_pixel(100, 100, 150, Effect::Identity));
        assert_eq!(p(2), colorimetry::shade_pixel(70, 200, 60, Effect::Identity));
    }

    #[test]
    fn test_upload_rejects_wrong_length() {
        let mut backend = SoftwareBackend::new();
        let pass = draw_setup(&mut backend, 4, 4);
        assert!(matches!(
            backend.upload_plane(pass.chroma, &[0u8; 4]),
            Err(FilterError::Precondition(_))
        ));
    }

    #[test]
    fn test_fault_after_skips() {
        let mut backend = SoftwareBackend::new();
        backend.inject_fault_after(FaultPoint::CreateTexture, 1);
        assert!(backend.create_texture(PlaneFormat::Luma, 2, 2).is_ok());
        assert!(matches!(
            backend.create_texture(PlaneFormat::Luma, 2, 2),
            Err(FilterError::DeviceState(_))
        ));
        assert!(backend.create_texture(PlaneFormat::Luma, 2, 2).is_ok());
        assert_eq!(backend.stats().live_textures, 2);
    }

    #[test]
    fn test_readback_size_mismatch_is_device_error() {
        let mut backend = SoftwareBackend::new();
        let pass = draw_setup(&mut backend, 4, 4);
        backend.draw(&pass).unwrap();
        let small = backend.create_staging_buffer(2, 2).unwrap();
        assert!(matches!(
            backend.request_readback(small),
            Err(FilterError::DeviceState(_))
        ));
    }
}
