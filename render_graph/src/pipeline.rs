use std::collections::HashMap;
use std::sync::Arc;

use vulkano::device::Device;
use vulkano::pipeline::graphics::color_blend::ColorBlendState;
use vulkano::pipeline::graphics::depth_stencil::DepthStencilState;
use vulkano::pipeline::graphics::input_assembly::{InputAssemblyState, PrimitiveTopology};
use vulkano::pipeline::graphics::rasterization::{CullMode, PolygonMode, RasterizationState};
use vulkano::pipeline::graphics::vertex_input::VertexInputState;
use vulkano::pipeline::graphics::viewport::ViewportState;
use vulkano::pipeline::layout::{PipelineLayout, PipelineLayoutCreateInfo};
use vulkano::pipeline::{ComputePipeline, GraphicsPipeline, PipelineShaderStageCreateInfo, StateMode};
use vulkano::render_pass::Subpass;
use vulkano::shader::{ShaderModule, ShaderStages};

use crate::error::{RenderGraphError, Result};
use crate::reflection::ShaderReflection;

/// Declarative description of a graphics pipeline's fixed-function state
/// (spec.md 4.6). Shaders are supplied as raw SPIR-V words rather than
/// file paths, since reflection happens at runtime rather than macro
/// expansion time (spec.md 4.3).
pub struct GraphicsPipelineSpec {
    pub name: String,
    pub vertex_spirv: Vec<u32>,
    pub fragment_spirv: Vec<u32>,
    pub vertex_input: VertexInputState,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: ColorBlendState,
}

pub struct ComputePipelineSpec {
    pub name: String,
    pub compute_spirv: Vec<u32>,
}

/// A built graphics pipeline plus the reflection it was built from, so a
/// `DescriptorSetManager` can be constructed against the same layout
/// (spec.md 4.5/4.6).
pub struct Pipeline {
    name: String,
    graphics: Option<Arc<GraphicsPipeline>>,
    compute: Option<Arc<ComputePipeline>>,
    reflection: Arc<ShaderReflection>,
    generation: u64,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reflection(&self) -> &Arc<ShaderReflection> {
        &self.reflection
    }

    pub fn graphics(&self) -> Option<Arc<GraphicsPipeline>> {
        self.graphics.clone()
    }

    pub fn compute(&self) -> Option<Arc<ComputePipeline>> {
        self.compute.clone()
    }

    /// Bumped every time `invalidate` rebuilds this pipeline from new
    /// shader bytecode. A `RenderPass`/`ComputePass` that cached this
    /// pipeline's layout pointer compares generations to know its cached
    /// descriptor sets are stale (spec.md 4.6, 4.9).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn new_graphics(device: Arc<Device>, render_pass: Subpass, spec: &GraphicsPipelineSpec) -> Result<Self> {
        let reflection = Arc::new(ShaderReflection::reflect(
            device.clone(),
            &spec.name,
            &[
                (ShaderStages::VERTEX, spec.vertex_spirv.clone()),
                (ShaderStages::FRAGMENT, spec.fragment_spirv.clone()),
            ],
        )?);

        let pipeline = build_graphics_pipeline(device, render_pass, spec, &reflection)?;

        Ok(Self {
            name: spec.name.clone(),
            graphics: Some(pipeline),
            compute: None,
            reflection,
            generation: 0,
        })
    }

    pub fn new_compute(device: Arc<Device>, spec: &ComputePipelineSpec) -> Result<Self> {
        let reflection = Arc::new(ShaderReflection::reflect(
            device.clone(),
            &spec.name,
            &[(ShaderStages::COMPUTE, spec.compute_spirv.clone())],
        )?);

        let pipeline = build_compute_pipeline(device, spec, &reflection)?;

        Ok(Self {
            name: spec.name.clone(),
            graphics: None,
            compute: Some(pipeline),
            reflection,
            generation: 0,
        })
    }

    /// Rebuilds the pipeline in place from newly-compiled shader bytecode
    /// (spec.md 4.6's hot-reload path), preserving the fixed-function spec
    /// that was last used to build it. Callers are responsible for
    /// deferring destruction of the old pipeline object until its frame
    /// slot is safe to reclaim (spec.md 4.1/4.9) — `invalidate` itself only
    /// swaps which `Arc` this `Pipeline` wraps.
    pub fn invalidate_graphics(
        &mut self,
        device: Arc<Device>,
        render_pass: Subpass,
        spec: &GraphicsPipelineSpec,
    ) -> Result<()> {
        let reflection = Arc::new(ShaderReflection::reflect(
            device.clone(),
            &spec.name,
            &[
                (ShaderStages::VERTEX, spec.vertex_spirv.clone()),
                (ShaderStages::FRAGMENT, spec.fragment_spirv.clone()),
            ],
        )?);
        let pipeline = build_graphics_pipeline(device, render_pass, spec, &reflection)?;
        self.graphics = Some(pipeline);
        self.reflection = reflection;
        self.generation += 1;
        Ok(())
    }

    pub fn invalidate_compute(&mut self, device: Arc<Device>, spec: &ComputePipelineSpec) -> Result<()> {
        let reflection = Arc::new(ShaderReflection::reflect(
            device.clone(),
            &spec.name,
            &[(ShaderStages::COMPUTE, spec.compute_spirv.clone())],
        )?);
        let pipeline = build_compute_pipeline(device, spec, &reflection)?;
        self.compute = Some(pipeline);
        self.reflection = reflection;
        self.generation += 1;
        Ok(())
    }
}

fn build_graphics_pipeline(
    device: Arc<Device>,
    render_pass: Subpass,
    spec: &GraphicsPipelineSpec,
    reflection: &ShaderReflection,
) -> Result<Arc<GraphicsPipeline>> {
    let vs_module = load_shader_module(device.clone(), &spec.name, &spec.vertex_spirv)?;
    let fs_module = load_shader_module(device.clone(), &spec.name, &spec.fragment_spirv)?;

    let vs_entry = vs_module
        .entry_point("main")
        .ok_or_else(|| reflection_entry_point_error(&spec.name))?;
    let fs_entry = fs_module
        .entry_point("main")
        .ok_or_else(|| reflection_entry_point_error(&spec.name))?;

    let layout = build_pipeline_layout(device.clone(), reflection)?;

    let mut depth_stencil = DepthStencilState::disabled();
    if spec.depth_test {
        depth_stencil = DepthStencilState::simple_depth_test();
        if !spec.depth_write {
            depth_stencil.depth.as_mut().unwrap().write_enable = StateMode::Fixed(false);
        }
    }

    GraphicsPipeline::start()
        .vertex_input_state(spec.vertex_input.clone())
        .vertex_shader(vs_entry, ())
        .input_assembly_state(InputAssemblyState::new().topology(spec.topology))
        .viewport_state(ViewportState::viewport_dynamic_scissor_dynamic())
        .fragment_shader(fs_entry, ())
        .rasterization_state(
            RasterizationState::new()
                .cull_mode(spec.cull_mode)
                .polygon_mode(spec.polygon_mode),
        )
        .depth_stencil_state(depth_stencil)
        .color_blend_state(spec.blend.clone())
        .render_pass(render_pass)
        .with_pipeline_layout(device, layout)
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to build graphics pipeline '{}': {e}", spec.name)))
}

fn build_compute_pipeline(
    device: Arc<Device>,
    spec: &ComputePipelineSpec,
    reflection: &ShaderReflection,
) -> Result<Arc<ComputePipeline>> {
    let module = load_shader_module(device.clone(), &spec.name, &spec.compute_spirv)?;
    let entry = module
        .entry_point("main")
        .ok_or_else(|| reflection_entry_point_error(&spec.name))?;
    let layout = build_pipeline_layout(device.clone(), reflection)?;

    ComputePipeline::new(
        device,
        PipelineShaderStageCreateInfo::new(entry),
        layout,
        None,
    )
    .map_err(|e| RenderGraphError::Vulkan(format!("failed to build compute pipeline '{}': {e}", spec.name)))
}

fn build_pipeline_layout(device: Arc<Device>, reflection: &ShaderReflection) -> Result<Arc<PipelineLayout>> {
    PipelineLayout::new(
        device,
        PipelineLayoutCreateInfo {
            set_layouts: reflection.descriptor_set_layouts().to_vec(),
            push_constant_ranges: reflection.push_constant_ranges().to_vec(),
            ..Default::default()
        },
    )
    .map_err(|e| RenderGraphError::Vulkan(format!("failed to build pipeline layout: {e}")))
}

fn load_shader_module(device: Arc<Device>, name: &str, spirv: &[u32]) -> Result<Arc<ShaderModule>> {
    unsafe { ShaderModule::from_words(device, spirv) }
        .map_err(|e| RenderGraphError::ShaderCompileFailed {
            name: name.to_string(),
            message: e.to_string(),
        })
}

fn reflection_entry_point_error(name: &str) -> RenderGraphError {
    RenderGraphError::ReflectionFailed {
        name: name.to_string(),
        message: "no 'main' entry point".to_string(),
    }
}

/// Tracks which pipelines depend on which shader source files (spec.md
/// 4.6): a file-watcher reload event names a path, and `pipelines_for`
/// returns every pipeline that must be rebuilt, without the watcher needing
/// to know the render graph's internal structure.
#[derive(Default)]
pub struct ShaderDependencyGraph {
    path_to_pipelines: HashMap<String, Vec<String>>,
}

impl ShaderDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, shader_path: impl Into<String>, pipeline_name: impl Into<String>) {
        let pipeline_name = pipeline_name.into();
        let entry = self.path_to_pipelines.entry(shader_path.into()).or_default();
        if !entry.contains(&pipeline_name) {
            entry.push(pipeline_name);
        }
    }

    pub fn pipelines_for(&self, shader_path: &str) -> &[String] {
        self.path_to_pipelines
            .get(shader_path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn unregister_pipeline(&mut self, pipeline_name: &str) {
        for pipelines in self.path_to_pipelines.values_mut() {
            pipelines.retain(|p| p != pipeline_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_of_shared_shader_names_every_dependent_pipeline() {
        let mut graph = ShaderDependencyGraph::new();
        graph.register("common.glsl", "opaque");
        graph.register("common.glsl", "transparent");
        graph.register("shadow.glsl", "shadow");

        let mut dependents = graph.pipelines_for("common.glsl").to_vec();
        dependents.sort();
        assert_eq!(dependents, vec!["opaque".to_string(), "transparent".to_string()]);
        assert_eq!(graph.pipelines_for("shadow.glsl"), &["shadow".to_string()]);
        assert!(graph.pipelines_for("unknown.glsl").is_empty());
    }

    #[test]
    fn unregister_removes_pipeline_from_all_paths() {
        let mut graph = ShaderDependencyGraph::new();
        graph.register("common.glsl", "opaque");
        graph.register("shadow.glsl", "opaque");
        graph.unregister_pipeline("opaque");
        assert!(graph.pipelines_for("common.glsl").is_empty());
        assert!(graph.pipelines_for("shadow.glsl").is_empty());
    }
}
