//! Backend-neutral descriptive types
//!
//! These are what descriptions and caches hash. Every enum maps 1:1 onto the
//! Vulkan value of the same name; the mapping is part of the wire contract
//! with the driver and must not be reordered.

use ash::vk;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Texel formats understood by the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// No format
    Undefined,
    /// 8-bit single channel
    R8Unorm,
    /// 8-bit two channel
    Rg8Unorm,
    /// 8-bit RGBA, linear
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB
    Rgba8Srgb,
    /// 8-bit BGRA, linear (common swap-chain format)
    Bgra8Unorm,
    /// 8-bit BGRA, sRGB (common swap-chain format)
    Bgra8Srgb,
    /// 10:10:10:2 packed
    A2b10g10r10Unorm,
    /// Packed unsigned float HDR
    B10g11r11Ufloat,
    /// Half-float single channel
    R16Float,
    /// Half-float two channel
    Rg16Float,
    /// Half-float RGBA
    Rgba16Float,
    /// Float single channel
    R32Float,
    /// Float two channel
    Rg32Float,
    /// Float three channel
    Rgb32Float,
    /// Float RGBA
    Rgba32Float,
    /// Unsigned integer single channel
    R32Uint,
    /// 16-bit depth
    D16Unorm,
    /// 32-bit float depth
    D32Float,
    /// 24-bit depth, 8-bit stencil
    D24UnormS8Uint,
    /// 32-bit float depth, 8-bit stencil
    D32FloatS8Uint,
}

impl Format {
    /// Vulkan format value
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Undefined => vk::Format::UNDEFINED,
            Self::R8Unorm => vk::Format::R8_UNORM,
            Self::Rg8Unorm => vk::Format::R8G8_UNORM,
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::A2b10g10r10Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
            Self::B10g11r11Ufloat => vk::Format::B10G11R11_UFLOAT_PACK32,
            Self::R16Float => vk::Format::R16_SFLOAT,
            Self::Rg16Float => vk::Format::R16G16_SFLOAT,
            Self::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            Self::R32Float => vk::Format::R32_SFLOAT,
            Self::Rg32Float => vk::Format::R32G32_SFLOAT,
            Self::Rgb32Float => vk::Format::R32G32B32_SFLOAT,
            Self::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            Self::R32Uint => vk::Format::R32_UINT,
            Self::D16Unorm => vk::Format::D16_UNORM,
            Self::D32Float => vk::Format::D32_SFLOAT,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Self::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    /// Reverse mapping, used for surface formats reported by the driver
    pub fn from_vk(format: vk::Format) -> Option<Self> {
        const ALL: [Format; 21] = [
            Format::Undefined,
            Format::R8Unorm,
            Format::Rg8Unorm,
            Format::Rgba8Unorm,
            Format::Rgba8Srgb,
            Format::Bgra8Unorm,
            Format::Bgra8Srgb,
            Format::A2b10g10r10Unorm,
            Format::B10g11r11Ufloat,
            Format::R16Float,
            Format::Rg16Float,
            Format::Rgba16Float,
            Format::R32Float,
            Format::Rg32Float,
            Format::Rgb32Float,
            Format::Rgba32Float,
            Format::R32Uint,
            Format::D16Unorm,
            Format::D32Float,
            Format::D24UnormS8Uint,
            Format::D32FloatS8Uint,
        ];
        ALL.into_iter().find(|f| f.to_vk() == format)
    }

    /// Whether the format carries depth
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint
        )
    }

    /// Whether the format carries stencil
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// Whether the format is sRGB encoded
    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8Srgb | Self::Bgra8Srgb)
    }

    /// Image aspect used for views and barriers
    pub fn aspect(self) -> vk::ImageAspectFlags {
        if self.has_stencil() {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else if self.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    /// Size of one texel in bytes (packed depth/stencil reports its copy size)
    pub fn texel_size(self) -> u64 {
        match self {
            Self::Undefined => 0,
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float | Self::D16Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8Srgb
            | Self::Bgra8Unorm
            | Self::Bgra8Srgb
            | Self::A2b10g10r10Unorm
            | Self::B10g11r11Ufloat
            | Self::Rg16Float
            | Self::R32Float
            | Self::R32Uint
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::D32FloatS8Uint => 8,
            Self::Rgb32Float => 12,
            Self::Rgba32Float => 16,
        }
    }
}

/// Multisample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SampleCount {
    /// Single sample
    X1,
    /// Two samples
    X2,
    /// Four samples
    X4,
    /// Eight samples
    X8,
}

impl SampleCount {
    /// Vulkan sample-count flag
    pub fn to_vk(self) -> vk::SampleCountFlags {
        match self {
            Self::X1 => vk::SampleCountFlags::TYPE_1,
            Self::X2 => vk::SampleCountFlags::TYPE_2,
            Self::X4 => vk::SampleCountFlags::TYPE_4,
            Self::X8 => vk::SampleCountFlags::TYPE_8,
        }
    }

    /// Numeric sample count
    pub fn count(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

impl Default for SampleCount {
    fn default() -> Self {
        Self::X1
    }
}

/// Attachment load behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Preserve previous contents
    Load,
    /// Clear on pass begin
    Clear,
    /// Contents undefined
    DontCare,
}

impl LoadOp {
    pub(crate) fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            Self::Load => vk::AttachmentLoadOp::LOAD,
            Self::Clear => vk::AttachmentLoadOp::CLEAR,
            Self::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

/// Attachment store behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Keep results
    Store,
    /// Results may be discarded
    DontCare,
}

impl StoreOp {
    pub(crate) fn to_vk(self) -> vk::AttachmentStoreOp {
        match self {
            Self::Store => vk::AttachmentStoreOp::STORE,
            Self::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

/// Image layouts an attachment may start or finish a pass in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are discarded
    Undefined,
    /// General purpose (storage images)
    General,
    /// Color attachment
    ColorAttachment,
    /// Depth/stencil attachment
    DepthStencilAttachment,
    /// Read-only depth, e.g. sampled in a later pass
    DepthStencilReadOnly,
    /// Sampled in shaders
    ShaderReadOnly,
    /// Copy source
    TransferSrc,
    /// Copy destination
    TransferDst,
    /// Ready for presentation
    Present,
}

impl ImageLayout {
    /// Vulkan layout value
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::General => vk::ImageLayout::GENERAL,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

/// Primitive assembly topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Separate points
    PointList,
    /// Separate lines
    LineList,
    /// Connected lines
    LineStrip,
    /// Separate triangles
    #[default]
    TriangleList,
    /// Connected triangles
    TriangleStrip,
}

impl PrimitiveTopology {
    pub(crate) fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Self::PointList => vk::PrimitiveTopology::POINT_LIST,
            Self::LineList => vk::PrimitiveTopology::LINE_LIST,
            Self::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Self::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces
    None,
    /// Drop front faces
    Front,
    /// Drop back faces
    #[default]
    Back,
}

impl CullMode {
    pub(crate) fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding of front-facing triangles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise is front
    #[default]
    CounterClockwise,
    /// Clockwise is front
    Clockwise,
}

impl FrontFace {
    pub(crate) fn to_vk(self) -> vk::FrontFace {
        match self {
            Self::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            Self::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Solid
    #[default]
    Fill,
    /// Wireframe
    Line,
    /// Vertices only
    Point,
}

impl PolygonMode {
    pub(crate) fn to_vk(self) -> vk::PolygonMode {
        match self {
            Self::Fill => vk::PolygonMode::FILL,
            Self::Line => vk::PolygonMode::LINE,
            Self::Point => vk::PolygonMode::POINT,
        }
    }
}

/// Depth and stencil comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Never passes
    Never,
    /// Passes if less
    Less,
    /// Passes if equal
    Equal,
    /// Passes if less or equal
    LessOrEqual,
    /// Passes if greater
    Greater,
    /// Passes if not equal
    NotEqual,
    /// Passes if greater or equal
    GreaterOrEqual,
    /// Always passes
    Always,
}

impl CompareOp {
    pub(crate) fn to_vk(self) -> vk::CompareOp {
        match self {
            Self::Never => vk::CompareOp::NEVER,
            Self::Less => vk::CompareOp::LESS,
            Self::Equal => vk::CompareOp::EQUAL,
            Self::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            Self::Greater => vk::CompareOp::GREATER,
            Self::NotEqual => vk::CompareOp::NOT_EQUAL,
            Self::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            Self::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Stencil operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    /// Keep current value
    Keep,
    /// Write zero
    Zero,
    /// Write reference value
    Replace,
    /// Increment and clamp
    IncrementClamp,
    /// Decrement and clamp
    DecrementClamp,
    /// Bitwise invert
    Invert,
}

impl StencilOp {
    pub(crate) fn to_vk(self) -> vk::StencilOp {
        match self {
            Self::Keep => vk::StencilOp::KEEP,
            Self::Zero => vk::StencilOp::ZERO,
            Self::Replace => vk::StencilOp::REPLACE,
            Self::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            Self::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            Self::Invert => vk::StencilOp::INVERT,
        }
    }
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Destination color
    DstColor,
    /// 1 - destination color
    OneMinusDstColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
}

impl BlendFactor {
    pub(crate) fn to_vk(self) -> vk::BlendFactor {
        match self {
            Self::Zero => vk::BlendFactor::ZERO,
            Self::One => vk::BlendFactor::ONE,
            Self::SrcColor => vk::BlendFactor::SRC_COLOR,
            Self::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            Self::DstColor => vk::BlendFactor::DST_COLOR,
            Self::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            Self::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            Self::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            Self::DstAlpha => vk::BlendFactor::DST_ALPHA,
            Self::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src + dst
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

impl BlendOp {
    pub(crate) fn to_vk(self) -> vk::BlendOp {
        match self {
            Self::Add => vk::BlendOp::ADD,
            Self::Subtract => vk::BlendOp::SUBTRACT,
            Self::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            Self::Min => vk::BlendOp::MIN,
            Self::Max => vk::BlendOp::MAX,
        }
    }
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexFormat {
    pub(crate) fn to_vk(self) -> vk::IndexType {
        match self {
            Self::U16 => vk::IndexType::UINT16,
            Self::U32 => vk::IndexType::UINT32,
        }
    }

    /// Size of one index in bytes
    pub fn size(self) -> u64 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// `float`
    Float,
    /// `vec2`
    Float2,
    /// `vec3`
    Float3,
    /// `vec4`
    Float4,
    /// `uint`
    UInt,
    /// `uvec4`
    UInt4,
    /// normalized `u8 x4`
    UByte4Norm,
}

impl VertexFormat {
    pub(crate) fn to_vk(self) -> vk::Format {
        match self {
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Float2 => vk::Format::R32G32_SFLOAT,
            Self::Float3 => vk::Format::R32G32B32_SFLOAT,
            Self::Float4 => vk::Format::R32G32B32A32_SFLOAT,
            Self::UInt => vk::Format::R32_UINT,
            Self::UInt4 => vk::Format::R32G32B32A32_UINT,
            Self::UByte4Norm => vk::Format::R8G8B8A8_UNORM,
        }
    }

    /// Size in bytes
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::UInt | Self::UByte4Norm => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::UInt4 => 16,
        }
    }
}

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Tessellation control shader
    TessellationControl,
    /// Tessellation evaluation shader
    TessellationEvaluation,
    /// Geometry shader
    Geometry,
    /// Fragment shader
    Fragment,
    /// Compute shader
    Compute,
    /// Ray-generation shader
    RayGen,
    /// Miss shader
    Miss,
    /// Closest-hit shader
    ClosestHit,
    /// Any-hit shader
    AnyHit,
}

impl ShaderStage {
    /// Graphics stages in pipeline order
    pub const GRAPHICS: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    pub(crate) fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
            Self::RayGen => vk::ShaderStageFlags::RAYGEN_KHR,
            Self::Miss => vk::ShaderStageFlags::MISS_KHR,
            Self::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            Self::AnyHit => vk::ShaderStageFlags::ANY_HIT_KHR,
        }
    }

    /// Whether the stage belongs to a graphics pipeline
    pub fn is_graphics(self) -> bool {
        Self::GRAPHICS.contains(&self)
    }

    /// Slot of this stage inside a pipeline's stage table
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::TessellationControl => 1,
            Self::TessellationEvaluation => 2,
            Self::Geometry => 3,
            Self::Fragment => 4,
            Self::Compute => 5,
            Self::RayGen => 6,
            Self::Miss => 7,
            Self::ClosestHit => 8,
            Self::AnyHit => 9,
        }
    }
}

/// Kind of resource a bind-set slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform buffer range
    UniformBuffer,
    /// Texture with its sampler
    SampledTexture,
    /// Read/write storage image
    StorageImage,
    /// Top-level ray-tracing acceleration structure
    AccelerationStructure,
}

impl BindingType {
    /// Vulkan descriptor type
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::SampledTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        }
    }
}

/// Intermediate representation accepted by `create_shader_from_il`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderIl {
    /// SPIR-V words in little-endian byte order
    SpirV,
}

bitflags! {
    /// Shader stages a binding is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Tessellation control
        const TESSELLATION_CONTROL = 1 << 1;
        /// Tessellation evaluation
        const TESSELLATION_EVALUATION = 1 << 2;
        /// Geometry stage
        const GEOMETRY = 1 << 3;
        /// Fragment stage
        const FRAGMENT = 1 << 4;
        /// Compute stage
        const COMPUTE = 1 << 5;
        /// Ray generation stage
        const RAYGEN = 1 << 6;
        /// Closest-hit stage
        const CLOSEST_HIT = 1 << 7;
        /// Miss stage
        const MISS = 1 << 8;
        /// Any-hit stage
        const ANY_HIT = 1 << 9;
        /// All rasterization stages
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::TESSELLATION_CONTROL.bits()
            | Self::TESSELLATION_EVALUATION.bits()
            | Self::GEOMETRY.bits()
            | Self::FRAGMENT.bits();
        /// Every ray-tracing stage
        const ALL_RAY_TRACING = Self::RAYGEN.bits()
            | Self::CLOSEST_HIT.bits()
            | Self::MISS.bits()
            | Self::ANY_HIT.bits();
    }
}

impl ShaderStages {
    /// Vulkan stage flags
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        let mut flags = vk::ShaderStageFlags::empty();
        let table = [
            (Self::VERTEX, vk::ShaderStageFlags::VERTEX),
            (Self::TESSELLATION_CONTROL, vk::ShaderStageFlags::TESSELLATION_CONTROL),
            (Self::TESSELLATION_EVALUATION, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
            (Self::GEOMETRY, vk::ShaderStageFlags::GEOMETRY),
            (Self::FRAGMENT, vk::ShaderStageFlags::FRAGMENT),
            (Self::COMPUTE, vk::ShaderStageFlags::COMPUTE),
            (Self::RAYGEN, vk::ShaderStageFlags::RAYGEN_KHR),
            (Self::CLOSEST_HIT, vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            (Self::MISS, vk::ShaderStageFlags::MISS_KHR),
            (Self::ANY_HIT, vk::ShaderStageFlags::ANY_HIT_KHR),
        ];
        for (ours, theirs) in table {
            if self.contains(ours) {
                flags |= theirs;
            }
        }
        flags
    }
}

impl Default for ShaderStages {
    fn default() -> Self {
        Self::ALL_GRAPHICS | Self::COMPUTE
    }
}

bitflags! {
    /// How a texture will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Sampled in shaders
        const SAMPLED = 1 << 0;
        /// Read/written as a storage image
        const STORAGE = 1 << 1;
        /// Rendered to as a color attachment
        const COLOR_ATTACHMENT = 1 << 2;
        /// Rendered to as a depth/stencil attachment
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        /// Copy source
        const TRANSFER_SRC = 1 << 4;
        /// Copy destination
        const TRANSFER_DST = 1 << 5;
    }
}

impl TextureUsage {
    pub(crate) fn to_vk(self) -> vk::ImageUsageFlags {
        let mut flags = vk::ImageUsageFlags::empty();
        if self.contains(Self::SAMPLED) {
            flags |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(Self::STORAGE) {
            flags |= vk::ImageUsageFlags::STORAGE;
        }
        if self.contains(Self::COLOR_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if self.contains(Self::DEPTH_STENCIL_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.contains(Self::TRANSFER_SRC) {
            flags |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if self.contains(Self::TRANSFER_DST) {
            flags |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        flags
    }
}

bitflags! {
    /// Color channels written by a blend attachment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u32 {
        /// Red
        const R = 1 << 0;
        /// Green
        const G = 1 << 1;
        /// Blue
        const B = 1 << 2;
        /// Alpha
        const A = 1 << 3;
        /// All channels
        const ALL = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

impl ColorMask {
    pub(crate) fn to_vk(self) -> vk::ColorComponentFlags {
        // bit positions match VkColorComponentFlagBits
        vk::ColorComponentFlags::from_raw(self.bits())
    }
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    /// Nearest texel
    Nearest,
    /// Bilinear
    #[default]
    Linear,
}

impl Filter {
    pub(crate) fn to_vk(self) -> vk::Filter {
        match self {
            Self::Nearest => vk::Filter::NEAREST,
            Self::Linear => vk::Filter::LINEAR,
        }
    }

    pub(crate) fn to_vk_mipmap(self) -> vk::SamplerMipmapMode {
        match self {
            Self::Nearest => vk::SamplerMipmapMode::NEAREST,
            Self::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    /// Tile
    #[default]
    Repeat,
    /// Tile mirrored
    MirroredRepeat,
    /// Clamp to edge texel
    ClampToEdge,
    /// Clamp to border color
    ClampToBorder,
}

impl AddressMode {
    pub(crate) fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            Self::Repeat => vk::SamplerAddressMode::REPEAT,
            Self::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            Self::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

/// Texel arrangement in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageTiling {
    /// Driver-chosen layout
    #[default]
    Optimal,
    /// Row-major, host readable
    Linear,
}

impl ImageTiling {
    pub(crate) fn to_vk(self) -> vk::ImageTiling {
        match self {
            Self::Optimal => vk::ImageTiling::OPTIMAL,
            Self::Linear => vk::ImageTiling::LINEAR,
        }
    }
}

/// Clear value for one attachment at render-pass begin
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA color
    Color([f32; 4]),
    /// Depth and stencil
    DepthStencil {
        /// Depth value
        depth: f32,
        /// Stencil value
        stencil: u32,
    },
}

impl ClearValue {
    pub(crate) fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// Pixel-space rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    pub(crate) fn to_vk(self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: self.x, y: self.y },
            extent: vk::Extent2D { width: self.width, height: self.height },
        }
    }
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Near depth
    pub min_depth: f32,
    /// Far depth
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport with the standard [0, 1] depth range
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub(crate) fn to_vk(self) -> vk::Viewport {
        vk::Viewport {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }
}
