use std::sync::Arc;

use vulkano::command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer, RenderPassBeginInfo, SubpassContents};
use vulkano::descriptor_set::allocator::StandardDescriptorSetAllocator;
use vulkano::pipeline::graphics::viewport::{Scissor, Viewport};
use vulkano::pipeline::{Pipeline as _, PipelineBindPoint};
use vulkano::render_pass::{RenderPass as VkRenderPass, Subpass};

use crate::descriptor_set_manager::{BoundResource, DescriptorSetManager};
use crate::error::{RenderGraphError, Result};
use crate::framebuffer::FramebufferSet;
use crate::pipeline::Pipeline;

/// Lifecycle state of a `RenderPass` (spec.md 4.8): inputs may only be
/// declared and bound while `Constructed`/`InputsBeingSet`; `begin`/`end`
/// are only legal once `Baked` or `Prepared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPassState {
    Constructed,
    InputsBeingSet,
    Baked,
    Prepared,
}

/// Pairs a `Pipeline` with the `FramebufferSet` it renders into and the
/// `DescriptorSetManager` that feeds it resources, driving all three through
/// one state machine per spec.md 4.8.
pub struct RenderPass {
    name: String,
    vk_render_pass: Arc<VkRenderPass>,
    pipeline: Pipeline,
    framebuffers: FramebufferSet,
    descriptors: DescriptorSetManager,
    state: RenderPassState,
}

impl RenderPass {
    pub fn new(
        name: impl Into<String>,
        vk_render_pass: Arc<VkRenderPass>,
        pipeline: Pipeline,
        framebuffers: FramebufferSet,
        frames_in_flight: u32,
    ) -> Self {
        let reflection = pipeline.reflection().clone();
        Self {
            name: name.into(),
            vk_render_pass,
            pipeline,
            framebuffers,
            descriptors: DescriptorSetManager::new(reflection, frames_in_flight),
            state: RenderPassState::Constructed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn state(&self) -> RenderPassState {
        self.state
    }

    pub fn set_input(&mut self, set: u32, binding: u32, resource: BoundResource) -> Result<()> {
        self.state = RenderPassState::InputsBeingSet;
        self.descriptors.set_input(set, binding, resource)
    }

    pub fn set_input_per_slot(&mut self, set: u32, binding: u32, slot: u32, resource: BoundResource) -> Result<()> {
        self.state = RenderPassState::InputsBeingSet;
        self.descriptors.set_input_per_slot(set, binding, slot, resource)
    }

    pub fn bake(&mut self, allocator: &StandardDescriptorSetAllocator, fallback: &BoundResource) -> Result<()> {
        self.descriptors.bake(allocator, fallback)?;
        self.state = RenderPassState::Baked;
        Ok(())
    }

    /// Prepares slot `slot`'s descriptor sets for the frame about to be
    /// recorded, then transitions to `Prepared` — `begin` refuses to run
    /// outside that state (spec.md 4.8).
    pub fn prepare(&mut self, allocator: &StandardDescriptorSetAllocator, slot: u32, fallback: &BoundResource) -> Result<()> {
        if self.state != RenderPassState::Baked && self.state != RenderPassState::Prepared {
            return Err(RenderGraphError::Vulkan(format!(
                "render pass '{}' must be baked before prepare()",
                self.name
            )));
        }
        self.descriptors.prepare(allocator, slot, fallback)?;
        self.state = RenderPassState::Prepared;
        Ok(())
    }

    pub fn resize(&mut self, memory_allocator: &vulkano::memory::allocator::StandardMemoryAllocator, dimensions: [u32; 2]) -> Result<()> {
        self.framebuffers.resize(memory_allocator, dimensions)
    }

    /// Records `vkCmdBeginRenderPass`, binds the pipeline and this frame's
    /// descriptor sets, and sets the dynamic viewport/scissor state the
    /// pipeline was built with (spec.md 4.8 step 5). The viewport is
    /// Y-flipped (origin at the bottom, negative height) so vertex data
    /// authored for a top-left-origin clip space renders right-side up.
    /// When `explicit_clear` is true, also issues `vkCmdClearAttachments`
    /// over every `LoadOp::Clear` attachment (spec.md 4.8 step 4) — used
    /// when a pass must clear a region it doesn't own the `LoadOp` for,
    /// e.g. a aliased attachment shared with another pass. Must be called
    /// only when `Prepared` (spec.md 4.8); the caller records draw calls
    /// and then calls `end`.
    pub fn begin(
        &self,
        builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
        slot: u32,
        explicit_clear: bool,
    ) -> Result<()> {
        if self.state != RenderPassState::Prepared {
            return Err(RenderGraphError::Vulkan(format!(
                "render pass '{}' must be prepared before begin()",
                self.name
            )));
        }

        builder
            .begin_render_pass(
                RenderPassBeginInfo {
                    clear_values: self.framebuffers.clear_values(),
                    ..RenderPassBeginInfo::framebuffer(self.framebuffers.framebuffer())
                },
                SubpassContents::Inline,
            )
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to begin render pass '{}': {e}", self.name)))?;

        if explicit_clear {
            let (clears, rect) = self.framebuffers.explicit_clear_attachments();
            if !clears.is_empty() {
                builder
                    .clear_attachments(clears, [rect])
                    .map_err(|e| RenderGraphError::Vulkan(format!("failed to clear attachments for '{}': {e}", self.name)))?;
            }
        }

        let [width, height] = self.framebuffers.dimensions();
        builder
            .set_viewport(
                0,
                [Viewport {
                    origin: [0.0, height as f32],
                    dimensions: [width as f32, -(height as f32)],
                    depth_range: 0.0..1.0,
                }],
            )
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to set viewport for '{}': {e}", self.name)))?;
        builder
            .set_scissor(0, [Scissor { origin: [0, 0], dimensions: [width, height] }])
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to set scissor for '{}': {e}", self.name)))?;

        if let Some(graphics) = self.pipeline.graphics() {
            builder
                .bind_pipeline_graphics(graphics.clone())
                .map_err(|e| RenderGraphError::Vulkan(format!("failed to bind pipeline: {e}")))?;

            for (&set, descriptor_set) in self.descriptors.descriptor_sets(slot) {
                builder
                    .bind_descriptor_sets(
                        PipelineBindPoint::Graphics,
                        graphics.layout().clone(),
                        set,
                        descriptor_set.clone(),
                    )
                    .map_err(|e| RenderGraphError::Vulkan(format!("failed to bind descriptor set {set}: {e}")))?;
            }
        }

        Ok(())
    }

    pub fn end(&self, builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>) -> Result<()> {
        builder
            .end_render_pass()
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to end render pass '{}': {e}", self.name)))?;
        Ok(())
    }

    pub fn subpass(&self) -> Result<Subpass> {
        Subpass::from(self.vk_render_pass.clone(), 0)
            .ok_or_else(|| RenderGraphError::Vulkan("render pass has no subpass 0".into()))
    }
}
