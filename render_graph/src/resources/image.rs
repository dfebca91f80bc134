use std::sync::Arc;

use vulkano::command_buffer::{
    AutoCommandBufferBuilder, BlitImageInfo, CommandBufferUsage, ImageBlit, PrimaryAutoCommandBuffer,
};
use vulkano::format::Format;
use vulkano::image::view::{ImageView, ImageViewCreateInfo, ImageViewType};
use vulkano::image::{ImageAccess, ImageCreateFlags, ImageDimensions, ImageSubresourceRange, ImageUsage, ImmutableImage, MipmapsCount};
use vulkano::memory::allocator::StandardMemoryAllocator;
use vulkano::sampler::Filter;
use vulkano::sync::GpuFuture;

use crate::context::Context;
use crate::error::{RenderGraphError, Result};
use crate::identity::ResourceIdentity;

/// A single 2D texture with an optional full mip chain, built from raw
/// pixel data via the synchronous staging-buffer upload path (spec.md 4.1,
/// 4.4), mirroring the teacher's `Texture::new`.
pub struct Texture2D {
    image_view: Arc<ImageView<ImmutableImage>>,
    identity: ResourceIdentity,
}

impl Texture2D {
    /// A 1x1 opaque-white placeholder, used to fill a binding that has no
    /// real resource yet (spec.md 4.5's "default/fallback asset" pattern).
    pub fn new_one_by_one(context: &Context) -> Result<Arc<Texture2D>> {
        Self::from_pixels(context, &[255u8, 255, 255, 255], 1, 1, Format::R8G8B8A8_UNORM, false)
    }

    pub fn from_pixels(
        context: &Context,
        data: &[u8],
        width: u32,
        height: u32,
        format: Format,
        generate_mips: bool,
    ) -> Result<Arc<Texture2D>> {
        let memory_allocator = context.memory_allocator();
        let mut builder = context.get_command_buffer(false)?;

        let dimensions = ImageDimensions::Dim2d {
            width,
            height,
            array_layers: 1,
        };
        let mip_levels = if generate_mips {
            MipmapsCount::Log2
        } else {
            MipmapsCount::One
        };

        let image = ImmutableImage::from_iter(
            &memory_allocator,
            data.iter().copied(),
            dimensions,
            mip_levels,
            format,
            &mut builder,
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to upload texture: {e}")))?;

        if generate_mips && image.mip_levels() > 1 {
            record_mip_chain_blit(&mut builder, &image)?;
        }

        let command_buffer = builder
            .build()
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to build upload command buffer: {e}")))?;
        context.flush(command_buffer, false)?;

        let image_view = ImageView::new_default(image)
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to create image view: {e}")))?;

        Ok(Arc::new(Self {
            identity: ResourceIdentity::of(&image_view),
            image_view,
        }))
    }

    pub fn image_view(&self) -> Arc<ImageView<ImmutableImage>> {
        self.image_view.clone()
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.identity
    }

    pub fn extent(&self) -> [u32; 2] {
        let dims = self.image_view.image().dimensions();
        [dims.width(), dims.height()]
    }

    pub fn mip_levels(&self) -> u32 {
        self.image_view.image().mip_levels()
    }
}

/// A cube map with 6 array layers, sampled as one combined-image-sampler
/// binding (spec.md 4.4). Used for skyboxes, irradiance and environment
/// maps per the "compute_environment_maps" configuration knob (spec.md 6).
pub struct TextureCube {
    image_view: Arc<ImageView<ImmutableImage>>,
    identity: ResourceIdentity,
}

impl TextureCube {
    /// Builds an empty cube of `size`x`size` faces with `mip_levels`,
    /// usable as a compute-shader write target before any face has pixels
    /// (spec.md 9: environment map baking runs as an async compute pass that
    /// fills this image in afterwards).
    pub fn new_empty(
        allocator: &StandardMemoryAllocator,
        size: u32,
        mip_levels: u32,
        format: Format,
    ) -> Result<Arc<TextureCube>> {
        let dimensions = ImageDimensions::Dim2d {
            width: size,
            height: size,
            array_layers: 6,
        };

        let (image, _) = ImmutableImage::uninitialized(
            allocator,
            dimensions,
            format,
            mip_levels,
            ImageUsage::SAMPLED | ImageUsage::STORAGE | ImageUsage::TRANSFER_DST,
            ImageCreateFlags::CUBE_COMPATIBLE,
            vulkano::image::ImageLayout::General,
            None,
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate cube image: {e}")))?;

        let image_view = ImageView::new(
            image,
            ImageViewCreateInfo {
                view_type: ImageViewType::Cube,
                ..ImageViewCreateInfo::from_image(&image)
            },
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to create cube image view: {e}")))?;

        Ok(Arc::new(Self {
            identity: ResourceIdentity::of(&image_view),
            image_view,
        }))
    }

    pub fn image_view(&self) -> Arc<ImageView<ImmutableImage>> {
        self.image_view.clone()
    }

    /// A view restricted to a single mip level, for the compute shader
    /// invocation that writes that level directly (spec.md 4.7's
    /// existing-image aliasing, applied to a subresource rather than a
    /// whole image).
    pub fn mip_view(&self, mip_level: u32) -> Result<Arc<ImageView<ImmutableImage>>> {
        let image = self.image_view.image().clone();
        ImageView::new(
            image.clone(),
            ImageViewCreateInfo {
                view_type: ImageViewType::Cube,
                subresource_range: ImageSubresourceRange {
                    mip_levels: mip_level..mip_level + 1,
                    ..ImageViewCreateInfo::from_image(&image).subresource_range
                },
                ..ImageViewCreateInfo::from_image(&image)
            },
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to create mip view: {e}")))
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.identity
    }
}

/// Blits level N into level N+1 repeatedly, halving extent each time — the
/// standard "generate full mip chain from a single base level" sequence
/// (spec.md 4.4's mip generation requirement).
fn record_mip_chain_blit(
    builder: &mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>,
    image: &Arc<ImmutableImage>,
) -> Result<()> {
    let dims = image.dimensions();
    let mip_levels = image.mip_levels();
    let mut width = dims.width() as i32;
    let mut height = dims.height() as i32;

    for level in 0..mip_levels.saturating_sub(1) {
        let src_extent = [width, height, 1];
        let dst_width = (width / 2).max(1);
        let dst_height = (height / 2).max(1);

        builder
            .blit_image(BlitImageInfo {
                regions: [ImageBlit {
                    src_subresource: image
                        .subresource_layers_at_mip_level(level)
                        .ok_or(RenderGraphError::Vulkan("invalid mip level".into()))?,
                    src_offsets: [[0, 0, 0], [src_extent[0] as u32, src_extent[1] as u32, 1]],
                    dst_subresource: image
                        .subresource_layers_at_mip_level(level + 1)
                        .ok_or(RenderGraphError::Vulkan("invalid mip level".into()))?,
                    dst_offsets: [[0, 0, 0], [dst_width as u32, dst_height as u32, 1]],
                    ..Default::default()
                }]
                .into(),
                filter: Filter::Linear,
                ..BlitImageInfo::images(image.clone(), image.clone())
            })
            .map_err(|e| RenderGraphError::Vulkan(format!("failed to record mip blit: {e}")))?;

        width = dst_width;
        height = dst_height;
    }

    Ok(())
}
