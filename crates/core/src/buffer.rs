//! Vertex formats and the vertex/index buffer wrappers.
//!
//! Buffers keep a CPU-side copy of their contents. Writes land in that copy
//! through [`VertexBuffer::lock`] or `set_data`; the device pushes it to the
//! GPU on unlock and again after a context restore.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::constants::{BufferUsage, IndexFormat, NativeEnums, VertexType};
use crate::error::DeviceError;
use crate::gl::Gl;
use crate::stats::VramStats;

/// What a vertex attribute carries. Each semantic maps to a fixed attribute
/// location so that programs and vertex arrays agree without reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    Tangent,
    BlendWeight,
    BlendIndices,
    Color,
    /// Texture coordinate set 0 to 7.
    TexCoord(u8),
    /// Generic attribute 0 to 15, aliasing the named semantics.
    Attr(u8),
}

impl VertexSemantic {
    pub fn location(self) -> u32 {
        match self {
            VertexSemantic::Position => 0,
            VertexSemantic::Normal => 1,
            VertexSemantic::BlendWeight => 2,
            VertexSemantic::BlendIndices => 3,
            VertexSemantic::Color => 4,
            VertexSemantic::TexCoord(set) => 5 + u32::from(set.min(7)),
            VertexSemantic::Tangent => 13,
            VertexSemantic::Attr(n) => u32::from(n.min(15)),
        }
    }
}

/// One element as requested by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElementDesc {
    pub semantic: VertexSemantic,
    pub components: u32,
    pub data_type: VertexType,
    pub normalize: bool,
    /// Read as an integer attribute (WebGL 2.0 `ivec`/`uvec` inputs).
    pub as_int: bool,
}

impl VertexElementDesc {
    pub fn new(semantic: VertexSemantic, components: u32, data_type: VertexType) -> Self {
        Self {
            semantic,
            components,
            data_type,
            normalize: false,
            as_int: false,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn integer(mut self) -> Self {
        self.as_int = true;
        self
    }
}

/// An element placed in an interleaved layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub semantic: VertexSemantic,
    pub components: u32,
    pub data_type: VertexType,
    pub normalize: bool,
    pub as_int: bool,
    pub offset: u32,
    pub stride: u32,
    pub size: u32,
}

/// An interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
    stride: u32,
    instancing: bool,
    rendering_hash: u64,
}

fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

impl VertexFormat {
    /// Lays `descs` out back to back, each element starting on a 4-byte
    /// boundary.
    pub fn new(descs: &[VertexElementDesc]) -> Self {
        let mut offset = 0;
        let mut elements: Vec<VertexElement> = descs
            .iter()
            .map(|d| {
                let size = d.components * d.data_type.size();
                let element = VertexElement {
                    semantic: d.semantic,
                    components: d.components,
                    data_type: d.data_type,
                    normalize: d.normalize,
                    as_int: d.as_int,
                    offset,
                    stride: 0,
                    size,
                };
                offset = align4(offset + size);
                element
            })
            .collect();
        let stride = align4(offset);
        for element in &mut elements {
            element.stride = stride;
        }
        let mut format = Self {
            elements,
            stride,
            instancing: false,
            rendering_hash: 0,
        };
        format.rendering_hash = format.compute_hash();
        format
    }

    /// Marks the format as per-instance data.
    pub fn with_instancing(mut self, instancing: bool) -> Self {
        self.instancing = instancing;
        self.rendering_hash = self.compute_hash();
        self
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.elements.hash(&mut hasher);
        self.instancing.hash(&mut hasher);
        hasher.finish()
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn instancing(&self) -> bool {
        self.instancing
    }

    /// Identifies everything about the layout that affects attribute setup.
    pub fn rendering_hash(&self) -> u64 {
        self.rendering_hash
    }

    pub fn element(&self, semantic: VertexSemantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }
}

fn sized_storage(len: usize, initial: Option<Vec<u8>>) -> Vec<u8> {
    match initial {
        Some(mut data) => {
            if data.len() != len {
                log::warn!("buffer initial data is {} bytes, expected {len}", data.len());
                data.resize(len, 0);
            }
            data
        }
        None => vec![0; len],
    }
}

/// Creates the native buffer if needed and uploads `storage` to `target`.
fn upload_storage<G: Gl>(
    gl: &G,
    native: &mut Option<G::Buffer>,
    target: u32,
    storage: &[u8],
    usage: u32,
    kind: &'static str,
) -> Result<(), DeviceError> {
    let buffer = match *native {
        Some(buffer) => buffer,
        None => {
            let buffer = gl.create_buffer().map_err(DeviceError::creation(kind))?;
            *native = Some(buffer);
            buffer
        }
    };
    gl.bind_buffer(target, Some(buffer));
    gl.buffer_data(target, storage, usage);
    Ok(())
}

/// A vertex buffer owned by a device.
#[derive(Debug)]
pub struct VertexBuffer<G: Gl> {
    format: VertexFormat,
    num_vertices: u32,
    usage: BufferUsage,
    storage: Vec<u8>,
    pub(crate) native: Option<G::Buffer>,
    /// Vertex array used when this buffer is drawn alone.
    pub(crate) vao: Option<G::VertexArray>,
    pub(crate) gpu_size: u64,
}

impl<G: Gl> VertexBuffer<G> {
    pub(crate) fn new(
        format: VertexFormat,
        num_vertices: u32,
        usage: BufferUsage,
        initial: Option<Vec<u8>>,
    ) -> Self {
        let len = (format.stride() * num_vertices) as usize;
        Self {
            storage: sized_storage(len, initial),
            format,
            num_vertices,
            usage,
            native: None,
            vao: None,
            gpu_size: 0,
        }
    }

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    pub fn num_vertices(&self) -> u32 {
        self.num_vertices
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn data(&self) -> &[u8] {
        &self.storage
    }

    pub fn native(&self) -> Option<G::Buffer> {
        self.native
    }

    /// Writable CPU-side contents. Nothing reaches the GPU until the device
    /// unlocks the buffer.
    pub fn lock(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Replaces the contents. Returns false, leaving them untouched, when
    /// `data` is not exactly the buffer's size.
    pub fn set_data(&mut self, data: &[u8]) -> bool {
        if data.len() != self.storage.len() {
            log::error!(
                "vertex buffer data is {} bytes, buffer holds {}",
                data.len(),
                self.storage.len()
            );
            return false;
        }
        self.storage.copy_from_slice(data);
        true
    }

    pub(crate) fn upload(
        &mut self,
        gl: &G,
        enums: &NativeEnums,
        vram: &mut VramStats,
    ) -> Result<(), DeviceError> {
        upload_storage(
            gl,
            &mut self.native,
            glow::ARRAY_BUFFER,
            &self.storage,
            enums.buffer_usage(self.usage),
            "vertex buffer",
        )?;
        let size = self.storage.len() as u64;
        vram.retrack_vertex_buffer(self.gpu_size, size);
        self.gpu_size = size;
        Ok(())
    }

    pub(crate) fn forget_native(&mut self) {
        self.native = None;
        self.vao = None;
    }

    /// Deletes the native buffer and its solo vertex array. Returns the
    /// deleted vertex array so the caller can forget it.
    pub(crate) fn release(&mut self, gl: &G, vram: &mut VramStats) -> Option<G::VertexArray> {
        if let Some(buffer) = self.native.take() {
            gl.delete_buffer(buffer);
        }
        let vao = self.vao.take();
        if let Some(vao) = vao {
            gl.delete_vertex_array(vao);
        }
        vram.retrack_vertex_buffer(self.gpu_size, 0);
        self.gpu_size = 0;
        vao
    }
}

/// An index buffer owned by a device.
#[derive(Debug)]
pub struct IndexBuffer<G: Gl> {
    format: IndexFormat,
    num_indices: u32,
    usage: BufferUsage,
    storage: Vec<u8>,
    pub(crate) native: Option<G::Buffer>,
    pub(crate) gpu_size: u64,
}

impl<G: Gl> IndexBuffer<G> {
    pub(crate) fn new(
        format: IndexFormat,
        num_indices: u32,
        usage: BufferUsage,
        initial: Option<Vec<u8>>,
    ) -> Self {
        let len = (format.bytes_per_index() * num_indices) as usize;
        Self {
            storage: sized_storage(len, initial),
            format,
            num_indices,
            usage,
            native: None,
            gpu_size: 0,
        }
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn bytes_per_index(&self) -> u32 {
        self.format.bytes_per_index()
    }

    pub fn num_indices(&self) -> u32 {
        self.num_indices
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn data(&self) -> &[u8] {
        &self.storage
    }

    pub fn native(&self) -> Option<G::Buffer> {
        self.native
    }

    pub fn lock(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    pub fn set_data(&mut self, data: &[u8]) -> bool {
        if data.len() != self.storage.len() {
            log::error!(
                "index buffer data is {} bytes, buffer holds {}",
                data.len(),
                self.storage.len()
            );
            return false;
        }
        self.storage.copy_from_slice(data);
        true
    }

    /// Uploads through `ELEMENT_ARRAY_BUFFER`; the caller unbinds any vertex
    /// array first, since that binding is vertex array state.
    pub(crate) fn upload(
        &mut self,
        gl: &G,
        enums: &NativeEnums,
        vram: &mut VramStats,
    ) -> Result<(), DeviceError> {
        upload_storage(
            gl,
            &mut self.native,
            glow::ELEMENT_ARRAY_BUFFER,
            &self.storage,
            enums.buffer_usage(self.usage),
            "index buffer",
        )?;
        let size = self.storage.len() as u64;
        vram.retrack_index_buffer(self.gpu_size, size);
        self.gpu_size = size;
        Ok(())
    }

    pub(crate) fn forget_native(&mut self) {
        self.native = None;
    }

    pub(crate) fn release(&mut self, gl: &G, vram: &mut VramStats) {
        if let Some(buffer) = self.native.take() {
            gl.delete_buffer(buffer);
        }
        vram.retrack_index_buffer(self.gpu_size, 0);
        self.gpu_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Capabilities;
    use crate::config::DeviceOptions;
    use crate::gl::{GlCall, RecordingGl};

    fn position_uv() -> VertexFormat {
        VertexFormat::new(&[
            VertexElementDesc::new(VertexSemantic::Position, 3, VertexType::F32),
            VertexElementDesc::new(VertexSemantic::TexCoord(0), 2, VertexType::F32),
        ])
    }

    #[test]
    fn elements_are_interleaved() {
        let format = position_uv();
        assert_eq!(format.stride(), 20);
        let offsets: Vec<u32> = format.elements().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 12]);
        assert!(format.elements().iter().all(|e| e.stride == 20));
    }

    #[test]
    fn elements_start_on_four_byte_boundaries() {
        let format = VertexFormat::new(&[
            VertexElementDesc::new(VertexSemantic::Color, 3, VertexType::U8).normalized(),
            VertexElementDesc::new(VertexSemantic::Normal, 3, VertexType::I16),
        ]);
        let offsets: Vec<u32> = format.elements().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 4]);
        assert_eq!(format.stride(), 12);
    }

    #[test]
    fn rendering_hash_tracks_layout_and_instancing() {
        assert_eq!(position_uv().rendering_hash(), position_uv().rendering_hash());
        let instanced = position_uv().with_instancing(true);
        assert_ne!(instanced.rendering_hash(), position_uv().rendering_hash());
        let other = VertexFormat::new(&[VertexElementDesc::new(VertexSemantic::Position, 4, VertexType::F32)]);
        assert_ne!(other.rendering_hash(), position_uv().rendering_hash());
    }

    #[test]
    fn semantic_locations_are_fixed() {
        assert_eq!(VertexSemantic::Position.location(), 0);
        assert_eq!(VertexSemantic::TexCoord(0).location(), 5);
        assert_eq!(VertexSemantic::TexCoord(7).location(), 12);
        assert_eq!(VertexSemantic::Tangent.location(), 13);
        assert_eq!(VertexSemantic::Attr(15).location(), 15);
        assert_eq!(VertexSemantic::Attr(40).location(), 15, "clamped to the last attribute");
    }

    #[test]
    fn storage_is_sized_from_layout() {
        let vb: VertexBuffer<RecordingGl> = VertexBuffer::new(position_uv(), 4, BufferUsage::Static, None);
        assert_eq!(vb.data().len(), 80);
        let padded: VertexBuffer<RecordingGl> =
            VertexBuffer::new(position_uv(), 2, BufferUsage::Static, Some(vec![1; 8]));
        assert_eq!(padded.data().len(), 40);
    }

    #[test]
    fn set_data_rejects_wrong_size() {
        let mut ib: IndexBuffer<RecordingGl> = IndexBuffer::new(IndexFormat::U16, 3, BufferUsage::Static, None);
        assert!(!ib.set_data(&[0; 4]));
        assert!(ib.set_data(&[1; 6]));
        assert_eq!(ib.data(), &[1; 6]);
    }

    #[test]
    fn writes_stay_on_cpu_until_upload() {
        let gl = RecordingGl::webgl2();
        let caps = Capabilities::detect(&gl, &DeviceOptions::default()).unwrap();
        let enums = NativeEnums::new(&caps);
        let mut vram = VramStats::default();
        let mut vb: VertexBuffer<RecordingGl> = VertexBuffer::new(position_uv(), 1, BufferUsage::Dynamic, None);
        vb.lock()[0] = 7;
        assert_eq!(gl.call_count(), 0);
        vb.upload(&gl, &enums, &mut vram).unwrap();
        assert_eq!(
            gl.count(|c| matches!(c, GlCall::BufferData { target: glow::ARRAY_BUFFER, bytes: 20, usage: glow::DYNAMIC_DRAW })),
            1
        );
        vb.upload(&gl, &enums, &mut vram).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateBuffer(_))), 1, "handle is reused");
        assert_eq!(vram.vertex_buffers, 20, "re-upload must not double count");
        vb.release(&gl, &mut vram);
        assert_eq!(vram.vertex_buffers, 0);
    }
}
