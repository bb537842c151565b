#![deny(unsafe_code)]
//! GPU device layer for WebGL 1.0 / WebGL 2.0 class contexts.
//!
//! A [`Device`] turns backend-neutral render state, buffers, textures and
//! draws into native calls through the [`Gl`] binding seam. It caches render
//! state to drop redundant calls, maps pixel formats per API generation,
//! uploads texture levels with mip-chain completion, reuses vertex array
//! objects and survives context loss by rebuilding every resource.
//!
//! [`RecordingGl`] is an in-memory binding that records every native call,
//! used by the tests and the CLI.

pub mod arena;
pub mod buffer;
pub mod caps;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod format;
pub mod gl;
pub mod lifecycle;
pub mod pass;
pub mod render_target;
pub mod scope;
pub mod shader;
pub mod state;
pub mod stats;
pub mod texture;
pub mod upload;
pub mod vao;

pub use arena::{IndexBufferId, RenderTargetId, ShaderId, TextureId, VertexBufferId};
pub use buffer::{IndexBuffer, VertexBuffer, VertexElementDesc, VertexFormat, VertexSemantic};
pub use caps::{Capabilities, CompressedFamily, Extensions};
pub use config::{DeviceOptions, PowerPreference};
pub use constants::{
    AddressMode, BlendEquation, BlendFactor, BufferUsage, CompareFunc, CullMode, FilterMode,
    FrontFace, IndexFormat, PrimitiveType, StencilOp, TextureCompare, VertexType,
};
pub use device::{Device, Primitive};
pub use error::DeviceError;
pub use format::{FormatTable, NativeFormat, PixelFormat};
pub use gl::{ApiGeneration, Gl, GlCall, RecordingGl, RecordingLimits};
pub use lifecycle::{ContextState, DeviceEvent, ListenerId};
pub use pass::{ClearOptions, ColorOps, DepthStencilOps, RenderPass};
pub use render_target::{RenderTarget, RenderTargetDescriptor};
pub use scope::{ScopeSpace, UniformValue};
pub use shader::{Shader, ShaderDefinition, ShaderError};
pub use stats::{FrameStats, VramStats};
pub use texture::{PixelSource, Texture, TextureDescriptor};
