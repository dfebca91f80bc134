use std::sync::Arc;

use vulkano::command_buffer::{ClearAttachment, ClearRect};
use vulkano::format::{ClearColorValue, ClearValue, Format};
use vulkano::image::view::{ImageView, ImageViewAbstract};
use vulkano::image::{AttachmentImage, ImageUsage};
use vulkano::memory::allocator::StandardMemoryAllocator;
use vulkano::render_pass::{Framebuffer as VkFramebuffer, FramebufferCreateInfo, RenderPass};

use crate::error::{RenderGraphError, Result};

/// How an attachment's previous contents are treated at the start of the
/// pass (spec.md 4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// Whether the attachment's contents need to survive past the end of the
/// pass (spec.md 4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Either a fresh, internally-owned attachment image, or an alias onto an
/// image the caller already owns (e.g. the swapchain's current image, or
/// another pass's output) — spec.md 4.7's "existing-image aliasing".
pub enum AttachmentSource {
    Owned { format: Format, usage: ImageUsage },
    Existing(Arc<dyn ImageViewAbstract>),
}

pub struct AttachmentSpec {
    pub name: String,
    pub source: AttachmentSource,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: Option<ClearValue>,
}

/// A render pass's set of attachments plus the framebuffers built from them
/// — one framebuffer per swapchain image when the pass targets the swapchain,
/// or a single framebuffer for an offscreen pass (spec.md 4.7).
pub struct FramebufferSet {
    render_pass: Arc<RenderPass>,
    dimensions: [u32; 2],
    attachments: Vec<(String, Arc<dyn ImageViewAbstract>, LoadOp, StoreOp, Option<ClearValue>)>,
    framebuffers: Vec<Arc<VkFramebuffer>>,
}

impl FramebufferSet {
    /// Builds one framebuffer per entry in `per_image_existing` (commonly
    /// the swapchain's image views), with every `AttachmentSource::Owned`
    /// attachment shared across all of them — an owned depth buffer, say,
    /// does not need a copy per swapchain image (spec.md 4.7).
    pub fn new(
        memory_allocator: &StandardMemoryAllocator,
        render_pass: Arc<RenderPass>,
        dimensions: [u32; 2],
        specs: &[AttachmentSpec],
    ) -> Result<Self> {
        if dimensions[0] == 0 || dimensions[1] == 0 {
            return Err(RenderGraphError::Vulkan(
                "framebuffer dimensions must be non-zero".into(),
            ));
        }

        let mut attachments = Vec::with_capacity(specs.len());
        for spec in specs {
            let view = match &spec.source {
                AttachmentSource::Owned { format, usage } => {
                    create_owned_attachment(memory_allocator, dimensions, *format, *usage)?
                }
                AttachmentSource::Existing(view) => view.clone(),
            };
            attachments.push((spec.name.clone(), view, spec.load_op, spec.store_op, spec.clear_value));
        }

        let framebuffer = build_framebuffer(render_pass.clone(), dimensions, &attachments)?;

        Ok(Self {
            render_pass,
            dimensions,
            attachments,
            framebuffers: vec![framebuffer],
        })
    }

    /// Replaces one attachment's backing image (e.g. swapping in this
    /// frame's swapchain image view) and rebuilds the framebuffer — the
    /// "existing-image aliasing" case used every frame for a pass that
    /// renders directly into the presented image.
    pub fn rebind_existing(&mut self, name: &str, view: Arc<dyn ImageViewAbstract>) -> Result<()> {
        let entry = self
            .attachments
            .iter_mut()
            .find(|(n, ..)| n == name)
            .ok_or_else(|| RenderGraphError::Vulkan(format!("no attachment named '{name}'")))?;
        entry.1 = view;
        self.framebuffers = vec![build_framebuffer(self.render_pass.clone(), self.dimensions, &self.attachments)?];
        Ok(())
    }

    /// Rebuilds every owned attachment at a new size and regenerates the
    /// framebuffer (spec.md 4.7's resize propagation).
    pub fn resize(&mut self, memory_allocator: &StandardMemoryAllocator, dimensions: [u32; 2]) -> Result<()> {
        if dimensions[0] == 0 || dimensions[1] == 0 {
            return Ok(());
        }
        self.dimensions = dimensions;
        for (_, view, ..) in &mut self.attachments {
            let format = view.format().unwrap_or(Format::UNDEFINED);
            let usage = view.image().usage();
            *view = create_owned_attachment(memory_allocator, dimensions, format, usage)?;
        }
        self.framebuffers = vec![build_framebuffer(self.render_pass.clone(), dimensions, &self.attachments)?];
        Ok(())
    }

    pub fn framebuffer(&self) -> Arc<VkFramebuffer> {
        self.framebuffers[0].clone()
    }

    pub fn clear_values(&self) -> Vec<Option<ClearValue>> {
        self.attachments
            .iter()
            .map(|(_, _, load_op, _, clear_value)| {
                if *load_op == LoadOp::Clear {
                    *clear_value
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn dimensions(&self) -> [u32; 2] {
        self.dimensions
    }

    /// Builds the `vkCmdClearAttachments` inputs for this framebuffer's
    /// `LoadOp::Clear` attachments (spec.md 4.8's `explicit_clear` path):
    /// color attachment indices are counted in subpass-attachment order
    /// (depth/stencil clears don't occupy a color index).
    pub fn explicit_clear_attachments(&self) -> (Vec<ClearAttachment>, ClearRect) {
        let mut color_index = 0u32;
        let mut clears = Vec::new();
        for (_, _, load_op, _, clear_value) in &self.attachments {
            let is_color = !matches!(clear_value, Some(ClearValue::Depth(_) | ClearValue::Stencil(_) | ClearValue::DepthStencil(_)));
            if *load_op != LoadOp::Clear {
                if is_color {
                    color_index += 1;
                }
                continue;
            }
            if let Some(clear_value) = clear_value {
                clears.push(to_clear_attachment(*clear_value, color_index));
            }
            if is_color {
                color_index += 1;
            }
        }

        let rect = ClearRect {
            rect_offset: [0, 0],
            rect_extent: self.dimensions,
            array_layers: 0..1,
        };
        (clears, rect)
    }

    pub fn attachment(&self, name: &str) -> Option<Arc<dyn ImageViewAbstract>> {
        self.attachments
            .iter()
            .find(|(n, ..)| n == name)
            .map(|(_, view, ..)| view.clone())
    }
}

fn to_clear_attachment(value: ClearValue, color_index: u32) -> ClearAttachment {
    match value {
        ClearValue::Float(v) => ClearAttachment::Color(ClearColorValue::Float(v), color_index),
        ClearValue::Int(v) => ClearAttachment::Color(ClearColorValue::Int(v), color_index),
        ClearValue::Uint(v) => ClearAttachment::Color(ClearColorValue::Uint(v), color_index),
        ClearValue::Depth(d) => ClearAttachment::Depth(d),
        ClearValue::Stencil(s) => ClearAttachment::Stencil(s),
        ClearValue::DepthStencil(ds) => ClearAttachment::DepthStencil(ds),
    }
}

fn create_owned_attachment(
    memory_allocator: &StandardMemoryAllocator,
    dimensions: [u32; 2],
    format: Format,
    usage: ImageUsage,
) -> Result<Arc<dyn ImageViewAbstract>> {
    let image = AttachmentImage::with_usage(memory_allocator, dimensions, format, usage)
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate attachment image: {e}")))?;
    ImageView::new_default(image)
        .map(|view| view as Arc<dyn ImageViewAbstract>)
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to create attachment image view: {e}")))
}

fn build_framebuffer(
    render_pass: Arc<RenderPass>,
    dimensions: [u32; 2],
    attachments: &[(String, Arc<dyn ImageViewAbstract>, LoadOp, StoreOp, Option<ClearValue>)],
) -> Result<Arc<VkFramebuffer>> {
    VkFramebuffer::new(
        render_pass,
        FramebufferCreateInfo {
            attachments: attachments.iter().map(|(_, view, ..)| view.clone()).collect(),
            extent: [dimensions[0], dimensions[1]],
            ..Default::default()
        },
    )
    .map_err(|e| RenderGraphError::Vulkan(format!("failed to create framebuffer: {e}")))
}
