use std::fmt;

use crate::descriptor_set_manager::{DescriptorResourceType, VulkanDescriptorKind};

/// Fatal and recoverable failure modes of the render graph core, per the error
/// handling policy: the frame loop itself never returns an error other than
/// the two swapchain variants and `DeviceLost`; everything else is concentrated
/// at `bake()` time and asset-load time.
#[derive(thiserror::Error, Debug)]
pub enum RenderGraphError {
    #[error("device lost")]
    DeviceLost,

    #[error("swapchain out of date")]
    SwapchainOutOfDate,

    #[error("swapchain image suboptimal")]
    Suboptimal,

    #[error("failed to compile shader '{name}': {message}")]
    ShaderCompileFailed { name: String, message: String },

    #[error("failed to reflect shader '{name}': {message}")]
    ReflectionFailed { name: String, message: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorValidationError),

    #[error("vulkan error: {0}")]
    Vulkan(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A single failed validation, as required by spec.md 4.5/7: `validate()` and
/// `bake()` report the *first* missing or incompatible binding, never a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorValidationError {
    pub set: u32,
    pub binding: u32,
    pub name: String,
    pub kind: DescriptorValidationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorValidationKind {
    Missing,
    Incompatible {
        expected: VulkanDescriptorKind,
        got: DescriptorResourceType,
    },
    NullSlotZero,
    NullImageView,
    DimensionMismatch,
}

impl fmt::Display for DescriptorValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DescriptorValidationKind::Missing => write!(
                f,
                "descriptor input '{}' missing for (set={}, binding={})",
                self.name, self.set, self.binding
            ),
            DescriptorValidationKind::Incompatible { expected, got } => write!(
                f,
                "descriptor input '{}' at (set={}, binding={}) expected {:?}, got {:?}",
                self.name, self.set, self.binding, expected, got
            ),
            DescriptorValidationKind::NullSlotZero => write!(
                f,
                "descriptor input '{}' at (set={}, binding={}) has a null resource in slot 0",
                self.name, self.set, self.binding
            ),
            DescriptorValidationKind::NullImageView => write!(
                f,
                "descriptor input '{}' at (set={}, binding={}) is an ImageView with no underlying view",
                self.name, self.set, self.binding
            ),
            DescriptorValidationKind::DimensionMismatch => write!(
                f,
                "descriptor input '{}' at (set={}, binding={}) has a dimensionality mismatch",
                self.name, self.set, self.binding
            ),
        }
    }
}

impl std::error::Error for DescriptorValidationError {}

pub type Result<T> = std::result::Result<T, RenderGraphError>;
