use std::sync::Arc;

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use vulkano::command_buffer::allocator::{
    StandardCommandBufferAllocator, StandardCommandBufferAllocatorCreateInfo,
};
use vulkano::command_buffer::{
    AutoCommandBufferBuilder, CommandBufferExecFuture, CommandBufferUsage, PrimaryAutoCommandBuffer,
};
use vulkano::descriptor_set::allocator::StandardDescriptorSetAllocator;
use vulkano::device::physical::{PhysicalDevice, PhysicalDeviceType};
use vulkano::device::{
    Device, DeviceCreateInfo, DeviceExtensions, Features, Queue, QueueCreateInfo, QueueFlags,
};
use vulkano::instance::{Instance, InstanceCreateInfo, InstanceExtensions};
use vulkano::memory::allocator::StandardMemoryAllocator;
use vulkano::swapchain::Surface;
use vulkano::sync::{self, GpuFuture};
use vulkano::{Version, VulkanLibrary};

use crate::error::{RenderGraphError, Result};

/// The device-and-queue side of the render graph core (spec.md 4.1). Owns
/// the logical device, the graphics queue (and a distinct compute queue
/// when the hardware exposes one), and the shared allocators every other
/// component borrows. See also https://gpuopen.com/learn/understanding-vulkan-objects/
pub struct Context {
    instance: Arc<Instance>,
    surface: Arc<Surface>,
    physical_device: Arc<PhysicalDevice>,
    device: Arc<Device>,
    graphics_queue_family_index: u32,
    graphics_queue: Arc<Queue>,
    compute_queue: Option<Arc<Queue>>,
    memory_allocator: Arc<StandardMemoryAllocator>,
    command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
    descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
}

/// Feature requirements a physical device must meet, per spec.md 4.1.
/// `dynamic_rendering` and `pipeline_statistics_query` are "if targeted" /
/// "if available" in the spec; we record what was actually granted so
/// callers (pipeline/framebuffer construction) can branch on it instead of
/// assuming.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCapabilities {
    pub sampler_anisotropy: bool,
    pub pipeline_statistics_query: bool,
    pub dynamic_rendering: bool,
}

impl Context {
    pub fn new<W>(window: &W) -> Result<Context>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let library = VulkanLibrary::new()
            .map_err(|e| RenderGraphError::Vulkan(format!("no Vulkan library: {e}")))?;

        let required = vulkano_win_like_required_extensions(&library, window);
        let instance = Instance::new(
            library,
            InstanceCreateInfo {
                enabled_extensions: required,
                max_api_version: Some(Version::major_minor(1, 3)),
                ..Default::default()
            },
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to create instance: {e}")))?;

        let surface = unsafe {
            Surface::from_window_ref(instance.clone(), window)
                .map_err(|e| RenderGraphError::Vulkan(format!("failed to create surface: {e}")))?
        };

        let device_extensions = DeviceExtensions {
            khr_swapchain: true,
            khr_dynamic_rendering: true,
            ..DeviceExtensions::empty()
        };

        let (physical_device, graphics_queue_family_index, compute_queue_family_index, caps) =
            find_physical_device(instance.clone(), surface.clone(), &device_extensions)?;

        let mut queue_create_infos = vec![QueueCreateInfo {
            queue_family_index: graphics_queue_family_index,
            ..Default::default()
        }];
        if let Some(compute_family) = compute_queue_family_index {
            queue_create_infos.push(QueueCreateInfo {
                queue_family_index: compute_family,
                ..Default::default()
            });
        }

        let enabled_extensions = DeviceExtensions {
            khr_dynamic_rendering: caps.dynamic_rendering,
            ..device_extensions
        };

        let (device, mut queues) = Device::new(
            physical_device.clone(),
            DeviceCreateInfo {
                enabled_extensions,
                enabled_features: Features {
                    sampler_anisotropy: caps.sampler_anisotropy,
                    pipeline_statistics_query: caps.pipeline_statistics_query,
                    dynamic_rendering: caps.dynamic_rendering,
                    fill_mode_non_solid: true,
                    ..Default::default()
                },
                queue_create_infos,
                ..Default::default()
            },
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to create device: {e}")))?;

        let graphics_queue = queues
            .next()
            .ok_or_else(|| RenderGraphError::Vulkan("no graphics queue returned".into()))?;
        let compute_queue = if compute_queue_family_index.is_some() {
            queues.next()
        } else {
            None
        };

        let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
        let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(
            device.clone(),
            StandardCommandBufferAllocatorCreateInfo::default(),
        ));
        let descriptor_set_allocator =
            Arc::new(StandardDescriptorSetAllocator::new(device.clone()));

        Ok(Context {
            instance,
            surface,
            physical_device,
            device,
            graphics_queue_family_index,
            graphics_queue,
            compute_queue,
            memory_allocator,
            command_buffer_allocator,
            descriptor_set_allocator,
        })
    }

    pub fn instance(&self) -> Arc<Instance> {
        self.instance.clone()
    }

    pub fn surface(&self) -> Arc<Surface> {
        self.surface.clone()
    }

    pub fn physical_device(&self) -> Arc<PhysicalDevice> {
        self.physical_device.clone()
    }

    pub fn device(&self) -> Arc<Device> {
        self.device.clone()
    }

    pub fn graphics_queue(&self) -> Arc<Queue> {
        self.graphics_queue.clone()
    }

    pub fn graphics_queue_family_index(&self) -> u32 {
        self.graphics_queue_family_index
    }

    /// Per the open question in spec.md 9: standalone compute dispatch
    /// prefers a dedicated compute queue when present, falling back to the
    /// graphics queue. Dispatches issued from within an already-recording
    /// graphics command buffer always run on the graphics queue regardless
    /// of this — that decision belongs to the caller recording the buffer,
    /// not to this accessor.
    pub fn compute_queue(&self) -> Arc<Queue> {
        self.compute_queue
            .clone()
            .unwrap_or_else(|| self.graphics_queue.clone())
    }

    pub fn has_dedicated_compute_queue(&self) -> bool {
        self.compute_queue.is_some()
    }

    pub fn memory_allocator(&self) -> Arc<StandardMemoryAllocator> {
        self.memory_allocator.clone()
    }

    pub fn command_buffer_allocator(&self) -> Arc<StandardCommandBufferAllocator> {
        self.command_buffer_allocator.clone()
    }

    pub fn descriptor_set_allocator(&self) -> Arc<StandardDescriptorSetAllocator> {
        self.descriptor_set_allocator.clone()
    }

    /// Returns a primary command buffer builder, begun or not per `begin`.
    /// `compute` selects the compute queue's family when a dedicated queue
    /// exists; otherwise both paths record against the graphics family.
    pub fn get_command_buffer(
        &self,
        compute: bool,
    ) -> Result<AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>> {
        let family = if compute && self.has_dedicated_compute_queue() {
            self.compute_queue().queue_family_index()
        } else {
            self.graphics_queue_family_index
        };

        AutoCommandBufferBuilder::primary(
            &self.command_buffer_allocator,
            family,
            CommandBufferUsage::OneTimeSubmit,
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate command buffer: {e}")))
    }

    /// The synchronous upload path (spec.md 4.1): records nothing itself,
    /// takes an already-built command buffer, submits it, and blocks until
    /// the GPU is done. Callers that care about throughput use the
    /// asynchronous staging path instead (buffers built with `Buffer::from_iter`
    /// joined into the frame's existing future chain).
    pub fn flush(
        &self,
        command_buffer: PrimaryAutoCommandBuffer,
        compute: bool,
    ) -> Result<()> {
        let queue = if compute {
            self.compute_queue()
        } else {
            self.graphics_queue.clone()
        };

        let future: CommandBufferExecFuture<_> = sync::now(self.device.clone())
            .then_execute(queue, command_buffer)
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to submit: {e}")))?;

        future
            .then_signal_fence_and_flush()
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to flush: {e}")))?
            .wait(None)
            .map_err(|e| RenderGraphError::Vulkan(format!("fence wait failed: {e}")))?;

        Ok(())
    }
}

fn vulkano_win_like_required_extensions<W>(
    library: &VulkanLibrary,
    _window: &W,
) -> InstanceExtensions
where
    W: HasRawDisplayHandle,
{
    // Mirrors vulkano-win's `required_extensions`: intersect the ideal
    // cross-platform surface extension set with what the local loader
    // actually supports, rather than asking winit to enumerate per-backend
    // extensions (the windowing backend itself is out of this core's scope).
    let ideal = InstanceExtensions {
        khr_surface: true,
        khr_xlib_surface: true,
        khr_xcb_surface: true,
        khr_wayland_surface: true,
        khr_android_surface: true,
        khr_win32_surface: true,
        mvk_ios_surface: true,
        mvk_macos_surface: true,
        khr_get_physical_device_properties2: true,
        khr_get_surface_capabilities2: true,
        ..InstanceExtensions::empty()
    };
    library.supported_extensions().intersection(&ideal)
}

fn find_physical_device(
    instance: Arc<Instance>,
    surface: Arc<Surface>,
    device_extensions: &DeviceExtensions,
) -> Result<(Arc<PhysicalDevice>, u32, Option<u32>, DeviceCapabilities)> {
    let candidate = instance
        .enumerate_physical_devices()
        .map_err(|e| RenderGraphError::Vulkan(format!("could not enumerate devices: {e}")))?
        .filter(|p| p.supported_extensions().contains(device_extensions))
        .filter_map(|p| {
            let graphics_family = p.queue_family_properties().iter().enumerate().position(
                |(i, q)| {
                    q.queue_flags.intersects(QueueFlags::GRAPHICS)
                        && p.surface_support(i as u32, &surface).unwrap_or(false)
                },
            )?;

            let compute_family = p
                .queue_family_properties()
                .iter()
                .enumerate()
                .position(|(i, q)| {
                    i != graphics_family
                        && q.queue_flags.intersects(QueueFlags::COMPUTE)
                        && !q.queue_flags.intersects(QueueFlags::GRAPHICS)
                })
                .map(|i| i as u32);

            Some((p, graphics_family as u32, compute_family))
        })
        .min_by_key(|(p, _, _)| match p.properties().device_type {
            PhysicalDeviceType::DiscreteGpu => 0,
            PhysicalDeviceType::IntegratedGpu => 1,
            PhysicalDeviceType::VirtualGpu => 2,
            PhysicalDeviceType::Cpu => 3,
            PhysicalDeviceType::Other => 4,
            _ => 5,
        })
        .ok_or(RenderGraphError::Vulkan(
            "no suitable physical device found".into(),
        ))?;

    let (physical_device, graphics_family, compute_family) = candidate;
    let features = physical_device.supported_features();
    let caps = DeviceCapabilities {
        sampler_anisotropy: features.sampler_anisotropy,
        pipeline_statistics_query: features.pipeline_statistics_query,
        dynamic_rendering: features.dynamic_rendering,
    };

    Ok((physical_device, graphics_family, compute_family, caps))
}
