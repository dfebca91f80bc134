use std::sync::Arc;

use vulkano::device::{Device, Queue};
use vulkano::format::Format;
use vulkano::image::view::ImageView;
use vulkano::image::{ImageAccess, ImageUsage, SwapchainImage};
use vulkano::swapchain::{
    self, AcquireError, ColorSpace, PresentMode, Surface, SurfaceInfo, Swapchain,
    SwapchainCreateInfo, SwapchainCreationError, SwapchainPresentInfo,
};
use vulkano::sync::{self, FlushError, GpuFuture};

use crate::error::{RenderGraphError, Result};

/// A small integer in `[0, F)` that cycles forward after each present,
/// identifying which copies of per-frame resources are currently being
/// recorded (spec.md 3, glossary).
pub type FrameSlot = u32;

/// Result of `SwapChain::begin_frame`: either a real image to render into,
/// or the "skip this frame" sentinel spec.md 4.2 mandates when the surface
/// has a zero extent (commonly caused by minimizing the window).
pub enum AcquiredFrame {
    Skip,
    Image {
        image_index: u32,
        slot: FrameSlot,
        suboptimal: bool,
        future: Box<dyn GpuFuture>,
    },
}

/// Owns the swapchain images and decouples the frame-in-flight count `F`
/// (spec.md 4.2) from the swapchain's own image count. Each slot keeps the
/// tail of the `GpuFuture` chain the previous occupant of that slot left
/// behind; waiting on it before reuse is the per-slot fence wait spec.md 4.1
/// describes.
pub struct SwapChain {
    device: Arc<Device>,
    surface: Arc<Surface>,
    swapchain: Arc<Swapchain>,
    images: Vec<Arc<ImageView<SwapchainImage>>>,
    frames_in_flight: u32,
    current_slot: FrameSlot,
    slot_futures: Vec<Option<Box<dyn GpuFuture>>>,
    vsync: bool,
}

impl SwapChain {
    pub fn new(
        device: Arc<Device>,
        surface: Arc<Surface>,
        frames_in_flight: u32,
        vsync: bool,
    ) -> Result<Self> {
        let frames_in_flight = frames_in_flight.clamp(2, 3);
        let (swapchain, images) = create_swapchain(&device, &surface, vsync, None)?;
        let slot_futures = (0..frames_in_flight)
            .map(|_| Some(sync::now(device.clone()).boxed()))
            .collect();

        Ok(Self {
            device,
            surface,
            swapchain,
            images,
            frames_in_flight,
            current_slot: 0,
            slot_futures,
            vsync,
        })
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn current_slot(&self) -> FrameSlot {
        self.current_slot
    }

    pub fn extent(&self) -> [u32; 2] {
        self.swapchain.image_extent()
    }

    pub fn format(&self) -> Format {
        self.swapchain.image_format()
    }

    pub fn image_view(&self, index: u32) -> Arc<ImageView<SwapchainImage>> {
        self.images[index as usize].clone()
    }

    pub fn images(&self) -> &[Arc<ImageView<SwapchainImage>>] {
        &self.images
    }

    /// Resizes the surface. A zero dimension is not an error: it leaves the
    /// swapchain as-is and `begin_frame` keeps returning `Skip` until a
    /// later non-zero resize succeeds (spec.md 4.2 "Failure").
    pub fn resize(&mut self, dimensions: [u32; 2]) -> Result<()> {
        if dimensions[0] == 0 || dimensions[1] == 0 {
            return Ok(());
        }

        match self.swapchain.recreate(SwapchainCreateInfo {
            image_extent: dimensions,
            ..self.swapchain.create_info()
        }) {
            Ok((new_swapchain, new_images)) => {
                self.swapchain = new_swapchain;
                self.images = new_images
                    .into_iter()
                    .map(|image| ImageView::new_default(image).unwrap())
                    .collect();
                Ok(())
            }
            Err(SwapchainCreationError::ImageExtentNotSupported { .. }) => Ok(()),
            Err(e) => Err(RenderGraphError::Vulkan(format!(
                "failed to recreate swapchain: {e}"
            ))),
        }
    }

    /// `vkAcquireNextImage` against the current slot, retrying once after a
    /// forced recreate on `OutOfDate`/`Suboptimal` per spec.md 4.2. Blocks
    /// on the slot's previous future first — the per-slot fence wait that
    /// guarantees the slot's resources are idle before it is reused.
    pub fn begin_frame(&mut self) -> Result<AcquiredFrame> {
        let extent = self.surface_extent_hint();
        if extent[0] == 0 || extent[1] == 0 {
            return Ok(AcquiredFrame::Skip);
        }

        if let Some(future) = self.slot_futures[self.current_slot as usize].as_mut() {
            future.cleanup_finished();
        }
        let previous = self.slot_futures[self.current_slot as usize]
            .take()
            .unwrap_or_else(|| sync::now(self.device.clone()).boxed());

        let acquired = swapchain::acquire_next_image(self.swapchain.clone(), None);
        let (image_index, suboptimal, acquire_future) = match acquired {
            Ok(r) => r,
            Err(AcquireError::OutOfDate) => {
                self.resize(extent)?;
                let acquired = swapchain::acquire_next_image(self.swapchain.clone(), None)
                    .map_err(|e| RenderGraphError::Vulkan(format!("acquire retry failed: {e}")))?;
                acquired
            }
            Err(e) => return Err(RenderGraphError::Vulkan(format!("acquire failed: {e}"))),
        };

        let future = previous.join(acquire_future).boxed();

        Ok(AcquiredFrame::Image {
            image_index,
            slot: self.current_slot,
            suboptimal,
            future,
        })
    }

    /// Submits `after` for presentation, stores the resulting future tail
    /// back into the current slot, then advances `slot = (slot+1) mod F`.
    pub fn present(
        &mut self,
        queue: Arc<Queue>,
        image_index: u32,
        after: Box<dyn GpuFuture>,
    ) -> Result<()> {
        let slot = self.current_slot;
        let future = after
            .then_swapchain_present(
                queue,
                SwapchainPresentInfo::swapchain_image_index(self.swapchain.clone(), image_index),
            )
            .then_signal_fence_and_flush();

        match future {
            Ok(future) => {
                self.slot_futures[slot as usize] = Some(future.boxed());
            }
            Err(FlushError::OutOfDate) => {
                self.slot_futures[slot as usize] = Some(sync::now(self.device.clone()).boxed());
                self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
                return Err(RenderGraphError::SwapchainOutOfDate);
            }
            Err(e) => {
                self.slot_futures[slot as usize] = Some(sync::now(self.device.clone()).boxed());
                return Err(RenderGraphError::Vulkan(format!("present failed: {e}")));
            }
        }

        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
        Ok(())
    }

    fn surface_extent_hint(&self) -> [u32; 2] {
        self.device
            .physical_device()
            .surface_capabilities(&self.surface, SurfaceInfo::default())
            .map(|caps| caps.current_extent.unwrap_or_else(|| self.extent()))
            .unwrap_or_else(|_| self.extent())
    }
}

fn create_swapchain(
    device: &Arc<Device>,
    surface: &Arc<Surface>,
    vsync: bool,
    previous: Option<(Arc<Swapchain>, [u32; 2])>,
) -> Result<(Arc<Swapchain>, Vec<Arc<ImageView<SwapchainImage>>>)> {
    let surface_capabilities = device
        .physical_device()
        .surface_capabilities(surface, SurfaceInfo::default())
        .map_err(|e| RenderGraphError::Vulkan(format!("surface capabilities: {e}")))?;

    let image_format = device
        .physical_device()
        .surface_formats(surface, SurfaceInfo::default())
        .map_err(|e| RenderGraphError::Vulkan(format!("surface formats: {e}")))?
        .into_iter()
        .min_by_key(|(format, color)| match (format, color) {
            (Format::B8G8R8A8_UNORM, _) => 0,
            (_, ColorSpace::SrgbNonLinear) => 1,
            _ => 2,
        })
        .map(|(format, _)| format)
        .ok_or(RenderGraphError::Vulkan("no surface formats".into()))?;

    let present_modes: Vec<_> = device
        .physical_device()
        .surface_present_modes(surface)
        .map_err(|e| RenderGraphError::Vulkan(format!("present modes: {e}")))?
        .collect();
    let present_mode = if !vsync && present_modes.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        PresentMode::Fifo
    };

    let image_extent = previous
        .as_ref()
        .map(|(_, dims)| *dims)
        .unwrap_or(surface_capabilities.current_extent.unwrap_or([1, 1]));

    let (swapchain, images) = Swapchain::new(
        device.clone(),
        surface.clone(),
        SwapchainCreateInfo {
            min_image_count: surface_capabilities.min_image_count.max(2),
            image_format: Some(image_format),
            image_extent,
            image_usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST,
            present_mode,
            composite_alpha: surface_capabilities
                .supported_composite_alpha
                .into_iter()
                .next()
                .ok_or(RenderGraphError::Vulkan("no composite alpha mode".into()))?,
            ..Default::default()
        },
    )
    .map_err(|e| RenderGraphError::Vulkan(format!("failed to create swapchain: {e}")))?;

    let images = images
        .into_iter()
        .map(|image| ImageView::new_default(image).unwrap())
        .collect();

    Ok((swapchain, images))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The frame-slot advance logic (the part of `present` that does not
    /// touch the GPU) is pure modular arithmetic; check it in isolation.
    #[test]
    fn slot_advances_modulo_frames_in_flight() {
        let frames_in_flight = 3u32;
        let mut slot: FrameSlot = 0;
        let mut history = Vec::new();
        for _ in 0..7 {
            history.push(slot);
            slot = (slot + 1) % frames_in_flight;
        }
        assert_eq!(history, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
