use std::sync::Arc;

use vulkano::buffer::allocator::{SubbufferAllocator, SubbufferAllocatorCreateInfo};
use vulkano::buffer::{Buffer, BufferContents, BufferCreateInfo, BufferUsage, Subbuffer};
use vulkano::memory::allocator::{AllocationCreateInfo, MemoryUsage, StandardMemoryAllocator};

use crate::error::{RenderGraphError, Result};
use crate::identity::ResourceIdentity;

/// A single device-local uniform buffer, filled once via the staging upload
/// path (spec.md 4.1, 4.4). Used for data that does not change per frame.
pub struct UniformBuffer<T: BufferContents> {
    buffer: Subbuffer<T>,
    identity: ResourceIdentity,
}

impl<T: BufferContents + Copy> UniformBuffer<T> {
    pub fn new(allocator: &StandardMemoryAllocator, data: T) -> Result<Self> {
        let buffer = Buffer::from_data(
            allocator,
            BufferCreateInfo {
                usage: BufferUsage::UNIFORM_BUFFER,
                ..Default::default()
            },
            AllocationCreateInfo {
                usage: MemoryUsage::Upload,
                ..Default::default()
            },
            data,
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate uniform buffer: {e}")))?;

        Ok(Self {
            identity: ResourceIdentity::of(&buffer.clone().into_bytes().buffer()),
            buffer,
        })
    }

    pub fn subbuffer(&self) -> Subbuffer<T> {
        self.buffer.clone()
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.identity
    }

    pub fn write(&self, data: T) -> Result<()> {
        let mut write = self
            .buffer
            .write()
            .map_err(|e| RenderGraphError::Vulkan(format!("uniform buffer write failed: {e}")))?;
        *write = data;
        Ok(())
    }
}

/// One [`UniformBuffer`] per frame slot (spec.md 4.4, 5): a descriptor set
/// bound in slot `s` must reference slot `s`'s copy so that writing into the
/// buffer for the frame currently being recorded never races a read the GPU
/// is still doing for an in-flight frame using another slot.
pub struct UniformBufferSet<T: BufferContents> {
    allocator: Arc<SubbufferAllocator>,
    slots: Vec<Subbuffer<T>>,
}

impl<T: BufferContents + Copy> UniformBufferSet<T> {
    pub fn new(memory_allocator: Arc<StandardMemoryAllocator>, frames_in_flight: u32, initial: T) -> Result<Self> {
        let allocator = Arc::new(SubbufferAllocator::new(
            memory_allocator,
            SubbufferAllocatorCreateInfo {
                buffer_usage: BufferUsage::UNIFORM_BUFFER,
                memory_usage: MemoryUsage::Upload,
                ..Default::default()
            },
        ));

        let mut slots = Vec::with_capacity(frames_in_flight as usize);
        for _ in 0..frames_in_flight {
            let subbuffer = allocator
                .allocate_sized()
                .map_err(|e| RenderGraphError::Vulkan(format!("uniform set allocation failed: {e}")))?;
            *subbuffer
                .write()
                .map_err(|e| RenderGraphError::Vulkan(format!("uniform set write failed: {e}")))? = initial;
            slots.push(subbuffer);
        }

        Ok(Self { allocator, slots })
    }

    pub fn write(&self, slot: u32, data: T) -> Result<()> {
        *self.slots[slot as usize]
            .write()
            .map_err(|e| RenderGraphError::Vulkan(format!("uniform set write failed: {e}")))? = data;
        Ok(())
    }

    pub fn subbuffer(&self, slot: u32) -> Subbuffer<T> {
        self.slots[slot as usize].clone()
    }

    pub fn identity(&self, slot: u32) -> ResourceIdentity {
        ResourceIdentity::of(&self.slots[slot as usize].clone().into_bytes().buffer())
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.slots.len() as u32
    }
}

/// A device-local, GPU-read-write storage buffer (e.g. a particle or light
/// list written by a compute pass and read by a later render pass).
pub struct StorageBuffer<T: BufferContents + ?Sized> {
    buffer: Subbuffer<T>,
    identity: ResourceIdentity,
}

impl<T: BufferContents> StorageBuffer<[T]> {
    pub fn new_array(allocator: &StandardMemoryAllocator, len: u64) -> Result<Self>
    where
        [T]: BufferContents,
    {
        let buffer = Buffer::new_slice::<T>(
            allocator,
            BufferCreateInfo {
                usage: BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_DST,
                ..Default::default()
            },
            AllocationCreateInfo {
                usage: MemoryUsage::DeviceOnly,
                ..Default::default()
            },
            len,
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate storage buffer: {e}")))?;

        Ok(Self {
            identity: ResourceIdentity::of(&buffer.clone().into_bytes().buffer()),
            buffer,
        })
    }
}

impl<T: BufferContents + ?Sized> StorageBuffer<T> {
    pub fn subbuffer(&self) -> Subbuffer<T> {
        self.buffer.clone()
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.identity
    }
}

/// Per-slot variant of [`StorageBuffer`], for data a compute pass rewrites
/// every frame (spec.md 4.4, 5) — same frame-slot isolation rationale as
/// [`UniformBufferSet`].
pub struct StorageBufferSet<T: BufferContents> {
    slots: Vec<StorageBuffer<[T]>>,
}

impl<T: BufferContents> StorageBufferSet<T>
where
    [T]: BufferContents,
{
    pub fn new(allocator: &StandardMemoryAllocator, frames_in_flight: u32, len: u64) -> Result<Self> {
        let mut slots = Vec::with_capacity(frames_in_flight as usize);
        for _ in 0..frames_in_flight {
            slots.push(StorageBuffer::new_array(allocator, len)?);
        }
        Ok(Self { slots })
    }

    pub fn subbuffer(&self, slot: u32) -> Subbuffer<[T]> {
        self.slots[slot as usize].subbuffer()
    }

    pub fn identity(&self, slot: u32) -> ResourceIdentity {
        self.slots[slot as usize].identity()
    }
}

/// Device-local vertex buffer, uploaded once via the staging path.
pub struct VertexBuffer<T: BufferContents> {
    buffer: Subbuffer<[T]>,
}

impl<T: BufferContents + Send + Sync + Clone> VertexBuffer<T> {
    pub fn from_data(allocator: &StandardMemoryAllocator, vertices: &[T]) -> Result<Self>
    where
        [T]: BufferContents,
    {
        let buffer = Buffer::from_iter(
            allocator,
            BufferCreateInfo {
                usage: BufferUsage::VERTEX_BUFFER,
                ..Default::default()
            },
            AllocationCreateInfo {
                usage: MemoryUsage::Upload,
                ..Default::default()
            },
            vertices.iter().cloned(),
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate vertex buffer: {e}")))?;

        Ok(Self { buffer })
    }

    pub fn subbuffer(&self) -> Subbuffer<[T]> {
        self.buffer.clone()
    }

    pub fn len(&self) -> u64 {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }
}

/// Device-local index buffer.
pub struct IndexBuffer {
    buffer: Subbuffer<[u32]>,
}

impl IndexBuffer {
    pub fn from_data(allocator: &StandardMemoryAllocator, indices: &[u32]) -> Result<Self> {
        let buffer = Buffer::from_iter(
            allocator,
            BufferCreateInfo {
                usage: BufferUsage::INDEX_BUFFER,
                ..Default::default()
            },
            AllocationCreateInfo {
                usage: MemoryUsage::Upload,
                ..Default::default()
            },
            indices.iter().copied(),
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to allocate index buffer: {e}")))?;

        Ok(Self { buffer })
    }

    pub fn subbuffer(&self) -> Subbuffer<[u32]> {
        self.buffer.clone()
    }

    pub fn len(&self) -> u64 {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }
}
