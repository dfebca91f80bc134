use vulkano::command_buffer::{AutoCommandBufferBuilder, PrimaryAutoCommandBuffer};
use vulkano::descriptor_set::allocator::StandardDescriptorSetAllocator;
use vulkano::pipeline::{Pipeline as _, PipelineBindPoint};

use crate::descriptor_set_manager::{BoundResource, DescriptorSetManager};
use crate::error::{RenderGraphError, Result};
use crate::pipeline::Pipeline;

/// Same state machine as `RenderPass` (spec.md 4.8), minus the framebuffer:
/// a compute pass's "render target" is whatever storage images/buffers its
/// bindings reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputePassState {
    Constructed,
    InputsBeingSet,
    Baked,
    Prepared,
}

pub struct ComputePass {
    name: String,
    pipeline: Pipeline,
    descriptors: DescriptorSetManager,
    state: ComputePassState,
}

impl ComputePass {
    pub fn new(name: impl Into<String>, pipeline: Pipeline, frames_in_flight: u32) -> Self {
        let reflection = pipeline.reflection().clone();
        Self {
            name: name.into(),
            pipeline,
            descriptors: DescriptorSetManager::new(reflection, frames_in_flight),
            state: ComputePassState::Constructed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ComputePassState {
        self.state
    }

    pub fn set_input(&mut self, set: u32, binding: u32, resource: BoundResource) -> Result<()> {
        self.state = ComputePassState::InputsBeingSet;
        self.descriptors.set_input(set, binding, resource)
    }

    pub fn bake(&mut self, allocator: &StandardDescriptorSetAllocator, fallback: &BoundResource) -> Result<()> {
        self.descriptors.bake(allocator, fallback)?;
        self.state = ComputePassState::Baked;
        Ok(())
    }

    pub fn prepare(&mut self, allocator: &StandardDescriptorSetAllocator, slot: u32, fallback: &BoundResource) -> Result<()> {
        if self.state != ComputePassState::Baked && self.state != ComputePassState::Prepared {
            return Err(RenderGraphError::Vulkan(format!(
                "compute pass '{}' must be baked before prepare()",
                self.name
            )));
        }
        self.descriptors.prepare(allocator, slot, fallback)?;
        self.state = ComputePassState::Prepared;
        Ok(())
    }

    /// Binds the pipeline and this frame's descriptor sets, then dispatches
    /// `group_counts` work groups. Must be called only when `Prepared`.
    pub fn dispatch(
        &self,
        builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
        slot: u32,
        group_counts: [u32; 3],
    ) -> Result<()> {
        if self.state != ComputePassState::Prepared {
            return Err(RenderGraphError::Vulkan(format!(
                "compute pass '{}' must be prepared before dispatch()",
                self.name
            )));
        }

        let compute = self
            .pipeline
            .compute()
            .ok_or_else(|| RenderGraphError::Vulkan(format!("pass '{}' has no compute pipeline", self.name)))?;

        builder
            .bind_pipeline_compute(compute.clone())
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to bind compute pipeline: {e}")))?;

        for (&set, descriptor_set) in self.descriptors.descriptor_sets(slot) {
            builder
                .bind_descriptor_sets(
                    PipelineBindPoint::Compute,
                    compute.layout().clone(),
                    set,
                    descriptor_set.clone(),
                )
                .map_err(|e| RenderGraphError::Vulkan(format!("failed to bind descriptor set {set}: {e}")))?;
        }

        builder
            .dispatch(group_counts)
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to record dispatch: {e}")))?;

        Ok(())
    }
}
