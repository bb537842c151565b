//! Error types for the device layer.

use thiserror::Error;

use crate::format::PixelFormat;
use crate::shader::ShaderError;

/// Errors produced by device operations.
///
/// Invalid combinations (mismatched copy formats, missing samplers) are not
/// errors: they are logged and reported through a `false` return or a skipped
/// draw. Programmer errors (nested passes, foreign ids) are debug assertions.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The pixel format has no native mapping on this context.
    #[error("pixel format {format:?} is not supported on this {generation} context")]
    UnsupportedFormat {
        format: PixelFormat,
        generation: &'static str,
    },

    /// A feature the request needs is missing on this context.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The context is lost; the request was suppressed.
    #[error("the graphics context is lost")]
    ContextLost,

    /// The device was destroyed; the request was suppressed.
    #[error("the device has been destroyed")]
    Destroyed,

    /// Shader compilation or linking failed.
    #[error(transparent)]
    Shader(#[from] ShaderError),

    /// The driver refused to create a native object.
    #[error("failed to create {kind}: {message}")]
    ResourceCreation { kind: &'static str, message: String },

    /// An id did not resolve to a live resource.
    #[error("unknown {0} id (destroyed or never created)")]
    UnknownResource(&'static str),

    /// A texture unit beyond the driver's combined unit count.
    #[error("texture unit {unit} is out of range ({available} available)")]
    TextureUnitOutOfRange { unit: u32, available: u32 },

    /// A resource description is self-contradictory.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Device options could not be parsed.
    #[error("invalid device options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

impl DeviceError {
    /// Shorthand for mapping a driver creation failure.
    pub(crate) fn creation(kind: &'static str) -> impl FnOnce(String) -> Self {
        move |message| DeviceError::ResourceCreation { kind, message }
    }
}
