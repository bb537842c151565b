//! Texture wrapper.
//!
//! A [`Texture`] holds the semantic description (size, format, sampling
//! parameters), the CPU-side level data and the dirty flags the upload
//! pipeline consumes. The native handle is created lazily, on the first
//! bind for drawing or rendering.

use bitflags::bitflags;

use crate::constants::{AddressMode, FilterMode, TextureCompare};
use crate::format::{self, PixelFormat};
use crate::gl::Gl;

bitflags! {
    /// Sampling parameters that changed since they were last applied.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParameterFlags: u8 {
        const MIN_FILTER = 1 << 0;
        const MAG_FILTER = 1 << 1;
        const ADDRESS_U = 1 << 2;
        const ADDRESS_V = 1 << 3;
        const ADDRESS_W = 1 << 4;
        const COMPARE = 1 << 5;
        const ANISOTROPY = 1 << 6;
    }
}

/// Pixel data for one face of one mip level.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelSource {
    /// A decoded image; uploaded with its own dimensions.
    Image(image::RgbaImage),
    /// Raw or block-compressed bytes, sized from the level extent.
    Raw(Vec<u8>),
}

/// Index of a texture target in the per-unit binding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSlot {
    Texture2D = 0,
    CubeMap = 1,
    Texture3D = 2,
}

impl TargetSlot {
    pub fn gl_target(self) -> u32 {
        match self {
            TargetSlot::Texture2D => glow::TEXTURE_2D,
            TargetSlot::CubeMap => glow::TEXTURE_CUBE_MAP,
            TargetSlot::Texture3D => glow::TEXTURE_3D,
        }
    }
}

/// Description used to create a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Depth for volume textures, 1 otherwise.
    pub depth: u32,
    pub format: PixelFormat,
    pub cubemap: bool,
    pub volume: bool,
    pub mipmaps: bool,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub compare: TextureCompare,
    pub anisotropy: f32,
    pub flip_y: bool,
    pub premultiply_alpha: bool,
    /// Initial data, indexed by level then face.
    pub levels: Vec<Vec<PixelSource>>,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            name: String::from("texture"),
            width: 4,
            height: 4,
            depth: 1,
            format: PixelFormat::Rgba8,
            cubemap: false,
            volume: false,
            mipmaps: true,
            min_filter: FilterMode::LinearMipmapLinear,
            mag_filter: FilterMode::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            compare: TextureCompare::None,
            anisotropy: 1.0,
            flip_y: false,
            premultiply_alpha: false,
            levels: Vec::new(),
        }
    }
}

impl TextureDescriptor {
    /// A 2D texture of the given size and format with default sampling.
    pub fn new_2d(name: &str, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            format,
            ..Self::default()
        }
    }
}

fn is_pow2(value: u32) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// A texture owned by a device.
#[derive(Debug)]
pub struct Texture<G: Gl> {
    name: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
    depth: u32,
    format: PixelFormat,
    cubemap: bool,
    volume: bool,
    mipmaps: bool,
    min_filter: FilterMode,
    mag_filter: FilterMode,
    address_u: AddressMode,
    address_v: AddressMode,
    address_w: AddressMode,
    compare: TextureCompare,
    anisotropy: f32,
    flip_y: bool,
    premultiply_alpha: bool,

    pub(crate) levels: Vec<Vec<Option<PixelSource>>>,
    pub(crate) levels_updated: Vec<Vec<bool>>,
    pub(crate) needs_upload: bool,
    pub(crate) needs_mipmaps_upload: bool,
    pub(crate) mipmaps_uploaded: bool,
    pub(crate) parameter_flags: ParameterFlags,
    locked: Option<(usize, usize)>,

    pub(crate) native: Option<G::Texture>,
    /// Native storage has been allocated at the current size.
    pub(crate) created: bool,
    pub(crate) gpu_size: u64,
}

impl<G: Gl> Texture<G> {
    pub(crate) fn new(descriptor: TextureDescriptor) -> Self {
        let faces = if descriptor.cubemap { 6 } else { 1 };
        let mut texture = Self {
            name: descriptor.name,
            width: descriptor.width.max(1),
            height: descriptor.height.max(1),
            depth: if descriptor.volume { descriptor.depth.max(1) } else { 1 },
            format: descriptor.format,
            cubemap: descriptor.cubemap,
            volume: descriptor.volume,
            mipmaps: descriptor.mipmaps,
            min_filter: descriptor.min_filter,
            mag_filter: descriptor.mag_filter,
            address_u: descriptor.address_u,
            address_v: descriptor.address_v,
            address_w: descriptor.address_w,
            compare: descriptor.compare,
            anisotropy: descriptor.anisotropy,
            flip_y: descriptor.flip_y,
            premultiply_alpha: descriptor.premultiply_alpha,
            levels: vec![vec![None; faces]],
            levels_updated: vec![vec![true; faces]],
            needs_upload: true,
            needs_mipmaps_upload: descriptor.mipmaps,
            mipmaps_uploaded: false,
            parameter_flags: ParameterFlags::all(),
            locked: None,
            native: None,
            created: false,
            gpu_size: 0,
        };
        for (level, faces) in descriptor.levels.into_iter().enumerate() {
            for (face, source) in faces.into_iter().enumerate() {
                texture.set_level(level, face, source);
            }
        }
        texture
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn is_cubemap(&self) -> bool {
        self.cubemap
    }

    pub fn is_volume(&self) -> bool {
        self.volume
    }

    pub fn mipmaps(&self) -> bool {
        self.mipmaps
    }

    pub fn min_filter(&self) -> FilterMode {
        self.min_filter
    }

    pub fn mag_filter(&self) -> FilterMode {
        self.mag_filter
    }

    pub fn address_u(&self) -> AddressMode {
        self.address_u
    }

    pub fn address_v(&self) -> AddressMode {
        self.address_v
    }

    pub fn address_w(&self) -> AddressMode {
        self.address_w
    }

    pub fn compare(&self) -> TextureCompare {
        self.compare
    }

    pub fn anisotropy(&self) -> f32 {
        self.anisotropy
    }

    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    pub fn premultiply_alpha(&self) -> bool {
        self.premultiply_alpha
    }

    /// Width and height are both powers of two.
    pub fn is_pot(&self) -> bool {
        is_pow2(self.width) && is_pow2(self.height)
    }

    pub fn face_count(&self) -> usize {
        if self.cubemap {
            6
        } else {
            1
        }
    }

    /// Levels in a complete chain, or 1 without mipmaps.
    pub fn required_mip_levels(&self) -> usize {
        if self.mipmaps {
            format::mip_level_count(self.width, self.height, self.depth) as usize
        } else {
            1
        }
    }

    /// Number of authored levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize, face: usize) -> Option<&PixelSource> {
        self.levels.get(level)?.get(face)?.as_ref()
    }

    pub fn slot(&self) -> TargetSlot {
        if self.cubemap {
            TargetSlot::CubeMap
        } else if self.volume {
            TargetSlot::Texture3D
        } else {
            TargetSlot::Texture2D
        }
    }

    pub fn target(&self) -> u32 {
        self.slot().gl_target()
    }

    pub fn native(&self) -> Option<G::Texture> {
        self.native
    }

    /// Last estimated GPU memory footprint in bytes.
    pub fn gpu_size(&self) -> u64 {
        self.gpu_size
    }

    /// Estimated GPU memory at the current size. Mip levels count only when
    /// a chain can exist (power of two, mipmapped, not a single-level
    /// compressed upload).
    pub fn estimate_gpu_size(&self) -> u64 {
        let mips = self.is_pot()
            && self.mipmaps
            && !(self.format.is_compressed() && self.levels.len() == 1);
        format::gpu_size(self.width, self.height, self.depth, self.format, mips, self.cubemap)
    }

    /// Anything waiting to reach the GPU.
    pub fn is_dirty(&self) -> bool {
        self.needs_upload || self.needs_mipmaps_upload || !self.parameter_flags.is_empty()
    }

    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    pub fn is_level_dirty(&self, level: usize, face: usize) -> bool {
        self.levels_updated
            .get(level)
            .and_then(|faces| faces.get(face))
            .copied()
            .unwrap_or(false)
    }

    pub fn parameter_flags(&self) -> ParameterFlags {
        self.parameter_flags
    }

    /// Stores data for one face of one level and requests an upload.
    pub fn set_level(&mut self, level: usize, face: usize, source: PixelSource) {
        let faces = self.face_count();
        if face >= faces {
            log::warn!(
                "texture '{}': face {face} out of range for {faces} face(s)",
                self.name
            );
            return;
        }
        while self.levels.len() <= level {
            self.levels.push(vec![None; faces]);
            self.levels_updated.push(vec![false; faces]);
        }
        self.levels[level][face] = Some(source);
        self.levels_updated[level][face] = true;
        self.mark_for_upload();
    }

    /// Returns writable raw storage for one face of one level, allocating a
    /// zeroed buffer of the level's size when none exists yet.
    pub fn lock(&mut self, level: usize, face: usize) -> &mut Vec<u8> {
        let faces = self.face_count();
        let face = face.min(faces - 1);
        while self.levels.len() <= level {
            self.levels.push(vec![None; faces]);
            self.levels_updated.push(vec![false; faces]);
        }
        let (w, h, d) = self.level_extent(level);
        let size = format::level_gpu_size(w, h, d, self.format) as usize;
        let slot = &mut self.levels[level][face];
        if !matches!(slot, Some(PixelSource::Raw(_))) {
            *slot = Some(PixelSource::Raw(vec![0; size]));
        }
        self.locked = Some((level, face));
        match slot {
            Some(PixelSource::Raw(bytes)) => bytes,
            _ => unreachable!("slot was just filled with raw data"),
        }
    }

    /// Ends a [`lock`](Self::lock) and requests an upload of the locked level.
    pub fn unlock(&mut self) {
        if let Some((level, face)) = self.locked.take() {
            self.levels_updated[level][face] = true;
            self.mark_for_upload();
        } else {
            log::warn!("texture '{}': unlock without lock", self.name);
        }
    }

    /// Requests an upload of the current level data.
    pub fn mark_for_upload(&mut self) {
        self.needs_upload = true;
        self.needs_mipmaps_upload = self.mipmaps;
    }

    /// Marks every level, face and parameter dirty.
    pub fn dirty_all(&mut self) {
        for faces in &mut self.levels_updated {
            faces.fill(true);
        }
        self.needs_upload = true;
        self.needs_mipmaps_upload = self.mipmaps;
        self.mipmaps_uploaded = false;
        self.parameter_flags = ParameterFlags::all();
    }

    /// Extent of `level`, never below one texel.
    pub fn level_extent(&self, level: usize) -> (u32, u32, u32) {
        let shift = level.min(31) as u32;
        (
            (self.width >> shift).max(1),
            (self.height >> shift).max(1),
            (self.depth >> shift).max(1),
        )
    }

    pub fn set_min_filter(&mut self, filter: FilterMode) {
        if self.min_filter != filter {
            self.min_filter = filter;
            self.parameter_flags |= ParameterFlags::MIN_FILTER;
        }
    }

    pub fn set_mag_filter(&mut self, filter: FilterMode) {
        if self.mag_filter != filter {
            self.mag_filter = filter;
            self.parameter_flags |= ParameterFlags::MAG_FILTER;
        }
    }

    pub fn set_address_u(&mut self, mode: AddressMode) {
        if self.address_u != mode {
            self.address_u = mode;
            self.parameter_flags |= ParameterFlags::ADDRESS_U;
        }
    }

    pub fn set_address_v(&mut self, mode: AddressMode) {
        if self.address_v != mode {
            self.address_v = mode;
            self.parameter_flags |= ParameterFlags::ADDRESS_V;
        }
    }

    pub fn set_address_w(&mut self, mode: AddressMode) {
        if self.address_w != mode {
            self.address_w = mode;
            self.parameter_flags |= ParameterFlags::ADDRESS_W;
        }
    }

    pub fn set_compare(&mut self, compare: TextureCompare) {
        if self.compare != compare {
            self.compare = compare;
            self.parameter_flags |= ParameterFlags::COMPARE;
        }
    }

    pub fn set_anisotropy(&mut self, anisotropy: f32) {
        if self.anisotropy != anisotropy {
            self.anisotropy = anisotropy;
            self.parameter_flags |= ParameterFlags::ANISOTROPY;
        }
    }

    /// Enabling or disabling mipmaps changes what the chain must hold.
    pub fn set_mipmaps(&mut self, mipmaps: bool) {
        if self.mipmaps != mipmaps {
            self.mipmaps = mipmaps;
            if mipmaps {
                self.needs_mipmaps_upload = true;
            }
            self.parameter_flags |= ParameterFlags::MIN_FILTER;
        }
    }

    pub fn set_flip_y(&mut self, flip_y: bool) {
        if self.flip_y != flip_y {
            self.flip_y = flip_y;
            self.mark_for_upload();
        }
    }

    pub fn set_premultiply_alpha(&mut self, premultiply_alpha: bool) {
        if self.premultiply_alpha != premultiply_alpha {
            self.premultiply_alpha = premultiply_alpha;
            self.mark_for_upload();
        }
    }

    /// Changes the size, dropping level data. The caller releases the
    /// native handle so storage is reallocated on the next upload.
    pub(crate) fn resize(&mut self, width: u32, height: u32, depth: u32) {
        let faces = self.face_count();
        self.width = width.max(1);
        self.height = height.max(1);
        if self.volume {
            self.depth = depth.max(1);
        }
        self.levels = vec![vec![None; faces]];
        self.levels_updated = vec![vec![true; faces]];
        self.native = None;
        self.created = false;
        self.dirty_all();
    }

    /// Forgets the native handle after context loss and marks everything
    /// dirty so the next bind re-uploads.
    pub(crate) fn forget_native(&mut self) {
        self.native = None;
        self.created = false;
        self.dirty_all();
    }

    /// Deletes the native handle.
    pub(crate) fn release(&mut self, gl: &G) {
        if let Some(native) = self.native.take() {
            gl.delete_texture(native);
        }
        self.created = false;
    }
}
