//! Semantic render-state enums and their native translation.
//!
//! Collaborators speak in these enums. [`NativeEnums`] holds the lookup
//! tables that turn them into GL values for one context; it is built from the
//! detected capabilities at device creation and rebuilt on restore, since a
//! few entries (blend min/max, GPU-dynamic buffers, half-float vertex data)
//! depend on what the context offers.

use crate::caps::{Capabilities, Extensions};
use crate::gl::webgl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    SrcAlphaSaturate,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
    Front,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveType {
    /// Primitives produced by `count` vertices or indices.
    pub fn primitive_count(self, count: u32) -> u32 {
        match self {
            PrimitiveType::Points => count,
            PrimitiveType::Lines => count / 2,
            PrimitiveType::LineLoop => count,
            PrimitiveType::LineStrip => count.saturating_sub(1),
            PrimitiveType::Triangles => count / 3,
            PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan => count.saturating_sub(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    LinearMipmapLinear,
}

impl FilterMode {
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, FilterMode::Nearest | FilterMode::Linear)
    }

    /// The same filter with mip sampling removed.
    pub fn without_mipmaps(self) -> FilterMode {
        match self {
            FilterMode::Nearest | FilterMode::NearestMipmapNearest | FilterMode::NearestMipmapLinear => {
                FilterMode::Nearest
            }
            FilterMode::Linear | FilterMode::LinearMipmapNearest | FilterMode::LinearMipmapLinear => {
                FilterMode::Linear
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
    GpuDynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F16,
}

impl VertexType {
    pub fn size(self) -> u32 {
        match self {
            VertexType::I8 | VertexType::U8 => 1,
            VertexType::I16 | VertexType::U16 | VertexType::F16 => 2,
            VertexType::I32 | VertexType::U32 | VertexType::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U8,
    U16,
    U32,
}

impl IndexFormat {
    pub fn bytes_per_index(self) -> u32 {
        match self {
            IndexFormat::U8 => 1,
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Comparison applied when sampling a depth texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureCompare {
    None,
    Func(CompareFunc),
}

/// Semantic to native lookup tables for one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEnums {
    blend_factor: [u32; 15],
    blend_equation: [u32; 5],
    compare: [u32; 8],
    stencil_op: [u32; 8],
    cull: [u32; 4],
    front_face: [u32; 2],
    primitive: [u32; 7],
    filter: [u32; 6],
    address: [u32; 3],
    buffer_usage: [u32; 4],
    vertex_type: [u32; 8],
    index_format: [u32; 3],
}

impl NativeEnums {
    pub fn new(caps: &Capabilities) -> Self {
        let webgl2 = caps.is_webgl2();
        let minmax = webgl2 || caps.has(Extensions::BLEND_MINMAX);
        Self {
            blend_factor: [
                glow::ZERO,
                glow::ONE,
                glow::SRC_COLOR,
                glow::ONE_MINUS_SRC_COLOR,
                glow::DST_COLOR,
                glow::ONE_MINUS_DST_COLOR,
                glow::SRC_ALPHA,
                glow::SRC_ALPHA_SATURATE,
                glow::ONE_MINUS_SRC_ALPHA,
                glow::DST_ALPHA,
                glow::ONE_MINUS_DST_ALPHA,
                glow::CONSTANT_COLOR,
                glow::ONE_MINUS_CONSTANT_COLOR,
                glow::CONSTANT_ALPHA,
                glow::ONE_MINUS_CONSTANT_ALPHA,
            ],
            blend_equation: [
                glow::FUNC_ADD,
                glow::FUNC_SUBTRACT,
                glow::FUNC_REVERSE_SUBTRACT,
                if minmax { glow::MIN } else { glow::FUNC_ADD },
                if minmax { glow::MAX } else { glow::FUNC_ADD },
            ],
            compare: [
                glow::NEVER,
                glow::LESS,
                glow::EQUAL,
                glow::LEQUAL,
                glow::GREATER,
                glow::NOTEQUAL,
                glow::GEQUAL,
                glow::ALWAYS,
            ],
            stencil_op: [
                glow::KEEP,
                glow::ZERO,
                glow::REPLACE,
                glow::INCR,
                glow::INCR_WRAP,
                glow::DECR,
                glow::DECR_WRAP,
                glow::INVERT,
            ],
            cull: [0, glow::BACK, glow::FRONT, glow::FRONT_AND_BACK],
            front_face: [glow::CCW, glow::CW],
            primitive: [
                glow::POINTS,
                glow::LINES,
                glow::LINE_LOOP,
                glow::LINE_STRIP,
                glow::TRIANGLES,
                glow::TRIANGLE_STRIP,
                glow::TRIANGLE_FAN,
            ],
            filter: [
                glow::NEAREST,
                glow::LINEAR,
                glow::NEAREST_MIPMAP_NEAREST,
                glow::NEAREST_MIPMAP_LINEAR,
                glow::LINEAR_MIPMAP_NEAREST,
                glow::LINEAR_MIPMAP_LINEAR,
            ],
            address: [glow::REPEAT, glow::CLAMP_TO_EDGE, glow::MIRRORED_REPEAT],
            buffer_usage: [
                glow::STATIC_DRAW,
                glow::DYNAMIC_DRAW,
                glow::STREAM_DRAW,
                if webgl2 { glow::DYNAMIC_COPY } else { glow::STATIC_DRAW },
            ],
            vertex_type: [
                glow::BYTE,
                glow::UNSIGNED_BYTE,
                glow::SHORT,
                glow::UNSIGNED_SHORT,
                glow::INT,
                glow::UNSIGNED_INT,
                glow::FLOAT,
                if webgl2 { glow::HALF_FLOAT } else { webgl::HALF_FLOAT_OES },
            ],
            index_format: [glow::UNSIGNED_BYTE, glow::UNSIGNED_SHORT, glow::UNSIGNED_INT],
        }
    }

    pub fn blend_factor(&self, factor: BlendFactor) -> u32 {
        self.blend_factor[factor as usize]
    }

    pub fn blend_equation(&self, equation: BlendEquation) -> u32 {
        self.blend_equation[equation as usize]
    }

    pub fn compare(&self, func: CompareFunc) -> u32 {
        self.compare[func as usize]
    }

    pub fn stencil_op(&self, op: StencilOp) -> u32 {
        self.stencil_op[op as usize]
    }

    /// Native cull face, `None` when culling is off.
    pub fn cull(&self, mode: CullMode) -> Option<u32> {
        match mode {
            CullMode::None => None,
            other => Some(self.cull[other as usize]),
        }
    }

    pub fn front_face(&self, face: FrontFace) -> u32 {
        self.front_face[face as usize]
    }

    pub fn primitive(&self, primitive: PrimitiveType) -> u32 {
        self.primitive[primitive as usize]
    }

    pub fn filter(&self, filter: FilterMode) -> u32 {
        self.filter[filter as usize]
    }

    pub fn address(&self, mode: AddressMode) -> u32 {
        self.address[mode as usize]
    }

    pub fn buffer_usage(&self, usage: BufferUsage) -> u32 {
        self.buffer_usage[usage as usize]
    }

    pub fn vertex_type(&self, ty: VertexType) -> u32 {
        self.vertex_type[ty as usize]
    }

    pub fn index_format(&self, format: IndexFormat) -> u32 {
        self.index_format[format as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceOptions;
    use crate::gl::RecordingGl;

    fn enums(gl: &RecordingGl) -> NativeEnums {
        NativeEnums::new(&Capabilities::detect(gl, &DeviceOptions::default()).unwrap())
    }

    #[test]
    fn blend_minmax_falls_back_without_extension() {
        let gl = RecordingGl::webgl1()
            .without_extensions()
            .with_extensions(&["OES_vertex_array_object"]);
        let e = enums(&gl);
        assert_eq!(e.blend_equation(BlendEquation::Min), glow::FUNC_ADD);
        assert_eq!(e.blend_equation(BlendEquation::Max), glow::FUNC_ADD);
    }

    #[test]
    fn blend_minmax_native_on_webgl2() {
        let e = enums(&RecordingGl::webgl2());
        assert_eq!(e.blend_equation(BlendEquation::Min), glow::MIN);
        assert_eq!(e.blend_equation(BlendEquation::Max), glow::MAX);
    }

    #[test]
    fn gpu_dynamic_usage_depends_on_generation() {
        assert_eq!(
            enums(&RecordingGl::webgl2()).buffer_usage(BufferUsage::GpuDynamic),
            glow::DYNAMIC_COPY
        );
        assert_eq!(
            enums(&RecordingGl::webgl1()).buffer_usage(BufferUsage::GpuDynamic),
            glow::STATIC_DRAW
        );
    }

    #[test]
    fn half_float_vertex_type_uses_oes_value_on_webgl1() {
        assert_eq!(
            enums(&RecordingGl::webgl1()).vertex_type(VertexType::F16),
            webgl::HALF_FLOAT_OES
        );
    }

    #[test]
    fn cull_none_has_no_native_face() {
        let e = enums(&RecordingGl::webgl2());
        assert_eq!(e.cull(CullMode::None), None);
        assert_eq!(e.cull(CullMode::FrontAndBack), Some(glow::FRONT_AND_BACK));
    }

    #[test]
    fn filter_downgrade_drops_mip_sampling() {
        assert_eq!(FilterMode::LinearMipmapLinear.without_mipmaps(), FilterMode::Linear);
        assert_eq!(FilterMode::NearestMipmapLinear.without_mipmaps(), FilterMode::Nearest);
        assert!(!FilterMode::Linear.uses_mipmaps());
        assert!(FilterMode::LinearMipmapNearest.uses_mipmaps());
    }

    #[test]
    fn primitive_counts() {
        assert_eq!(PrimitiveType::Triangles.primitive_count(6), 2);
        assert_eq!(PrimitiveType::TriangleStrip.primitive_count(4), 2);
        assert_eq!(PrimitiveType::TriangleFan.primitive_count(1), 0);
        assert_eq!(PrimitiveType::Lines.primitive_count(4), 2);
    }

    #[test]
    fn index_widths() {
        assert_eq!(IndexFormat::U8.bytes_per_index(), 1);
        assert_eq!(IndexFormat::U16.bytes_per_index(), 2);
        assert_eq!(IndexFormat::U32.bytes_per_index(), 4);
    }
}
