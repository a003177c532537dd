// Images and their backing memory.
//
// One wrapper covers every image the examples create: optimal render
// targets, linear host-visible storage images for compute, and targets
// whose memory is exported to or imported from another device via an
// OS handle.

use ash::vk;
use std::sync::Arc;

use super::context::VulkanContext;
use crate::error::SetupError;
use crate::handoff::SharedHandle;

/// An image, its memory and (when needed) a view, freed on drop.
pub struct AllocatedImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    /// Null for pure transfer targets, which never get sampled or attached.
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    ctx: Arc<VulkanContext>,
}

impl AllocatedImage {
    /// Optimal-tiling color render target, readable by transfer.
    pub fn color_target(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<Self, SetupError> {
        Self::build(
            ctx,
            width,
            height,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageLayout::UNDEFINED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            true,
            "render target image",
        )
    }

    /// Color attachment that a later subpass reads as an input attachment.
    pub fn subpass_attachment(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<Self, SetupError> {
        Self::build(
            ctx,
            width,
            height,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::ImageLayout::UNDEFINED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            true,
            "subpass attachment image",
        )
    }

    /// Linear host-visible storage image. Starts PREINITIALIZED so pixels
    /// written through the mapping survive the transition to GENERAL.
    pub fn linear_storage(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<Self, SetupError> {
        Self::build(
            ctx,
            width,
            height,
            format,
            vk::ImageTiling::LINEAR,
            vk::ImageUsageFlags::STORAGE,
            vk::ImageLayout::PREINITIALIZED,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            true,
            "storage image",
        )
    }

    /// Linear host-visible copy destination for readback. No view.
    pub fn linear_readback(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<Self, SetupError> {
        Self::build(
            ctx,
            width,
            height,
            format,
            vk::ImageTiling::LINEAR,
            vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageLayout::UNDEFINED,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            false,
            "readback image",
        )
    }

    /// Optimal-tiling blit destination that readback can copy from. No view.
    pub fn blit_target(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<Self, SetupError> {
        Self::build(
            ctx,
            width,
            height,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageLayout::UNDEFINED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
            "blit target image",
        )
    }

    /// Render target whose memory is exported as an OS handle.
    ///
    /// The returned handle can cross threads or processes; the memory stays
    /// alive on this device for as long as the image does.
    pub fn exported_target(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<(Self, SharedHandle), SetupError> {
        let what = "exported render target";
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC;

        let mut external_info = vk::ExternalMemoryImageCreateInfo::builder()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);

        let image_info = Self::image_info(width, height, format, vk::ImageTiling::OPTIMAL, usage)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .push_next(&mut external_info);

        let image = unsafe { ctx.device.create_image(&image_info, None) }
            .map_err(|e| SetupError::ResourceAllocation { what, source: e })?;

        let requirements = unsafe { ctx.device.get_image_memory_requirements(image) };
        let memory_type_index = match ctx.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            what,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { ctx.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        // Exportable allocations want a dedicated allocation tied to the
        // image, so importers can rebuild the same association.
        let mut dedicated_info = vk::MemoryDedicatedAllocateInfo::builder().image(image);
        let mut export_info = vk::ExportMemoryAllocateInfo::builder()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut dedicated_info)
            .push_next(&mut export_info);

        let memory = unsafe { ctx.device.allocate_memory(&alloc_info, None) }.map_err(|e| {
            unsafe { ctx.device.destroy_image(image, None) };
            SetupError::ResourceAllocation { what, source: e }
        })?;

        let allocated = Self::bind_and_view(ctx, image, memory, format, width, height, true, what)?;

        let fd_loader = ash::extensions::khr::ExternalMemoryFd::new(&ctx.instance, &ctx.device);
        let get_fd_info = vk::MemoryGetFdInfoKHR::builder()
            .memory(allocated.memory)
            .handle_type(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);

        let fd = unsafe { fd_loader.get_memory_fd(&get_fd_info) }
            .map_err(|e| SetupError::ResourceAllocation { what, source: e })?;

        Ok((allocated, SharedHandle(fd)))
    }

    /// Rebuild a render target around memory imported from `handle`.
    ///
    /// Consumes the handle: a successful import hands the descriptor to the
    /// driver, and on failure it is closed here.
    pub fn imported_target(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
        handle: SharedHandle,
    ) -> Result<Self, SetupError> {
        let what = "imported render target";
        // Created with the same parameters as the exporting side so the
        // memory layout matches.
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC;

        let mut external_info = vk::ExternalMemoryImageCreateInfo::builder()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD);

        let image_info = Self::image_info(width, height, format, vk::ImageTiling::OPTIMAL, usage)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .push_next(&mut external_info);

        let image = unsafe { ctx.device.create_image(&image_info, None) }.map_err(|e| {
            handle.close();
            SetupError::ResourceAllocation { what, source: e }
        })?;

        let requirements = unsafe { ctx.device.get_image_memory_requirements(image) };
        let memory_type_index = match ctx.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            what,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { ctx.device.destroy_image(image, None) };
                handle.close();
                return Err(e);
            }
        };

        let mut dedicated_info = vk::MemoryDedicatedAllocateInfo::builder().image(image);
        let mut import_info = vk::ImportMemoryFdInfoKHR::builder()
            .handle_type(vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD)
            .fd(handle.0);

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut dedicated_info)
            .push_next(&mut import_info);

        // Ownership of the descriptor moves to the driver only when the
        // import succeeds; a failed allocation leaves it with us.
        let memory = unsafe { ctx.device.allocate_memory(&alloc_info, None) }.map_err(|e| {
            unsafe { ctx.device.destroy_image(image, None) };
            handle.close();
            SetupError::ResourceAllocation { what, source: e }
        })?;

        Self::bind_and_view(ctx, image, memory, format, width, height, false, what)
    }

    pub fn subresource_layout(&self) -> vk::SubresourceLayout {
        let subresource = vk::ImageSubresource {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            array_layer: 0,
        };
        unsafe {
            self.ctx
                .device
                .get_image_subresource_layout(self.image, subresource)
        }
    }

    fn image_info<'a>(
        width: u32,
        height: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> vk::ImageCreateInfoBuilder<'a> {
        vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        ctx: &Arc<VulkanContext>,
        width: u32,
        height: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        initial_layout: vk::ImageLayout,
        memory_flags: vk::MemoryPropertyFlags,
        with_view: bool,
        what: &'static str,
    ) -> Result<Self, SetupError> {
        let image_info =
            Self::image_info(width, height, format, tiling, usage).initial_layout(initial_layout);

        let image = unsafe { ctx.device.create_image(&image_info, None) }
            .map_err(|e| SetupError::ResourceAllocation { what, source: e })?;

        let requirements = unsafe { ctx.device.get_image_memory_requirements(image) };
        let memory_type_index = match ctx.find_memory_type(
            requirements.memory_type_bits,
            memory_flags,
            what,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { ctx.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { ctx.device.allocate_memory(&alloc_info, None) }.map_err(|e| {
            unsafe { ctx.device.destroy_image(image, None) };
            SetupError::ResourceAllocation { what, source: e }
        })?;

        Self::bind_and_view(ctx, image, memory, format, width, height, with_view, what)
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_and_view(
        ctx: &Arc<VulkanContext>,
        image: vk::Image,
        memory: vk::DeviceMemory,
        format: vk::Format,
        width: u32,
        height: u32,
        with_view: bool,
        what: &'static str,
    ) -> Result<Self, SetupError> {
        let cleanup = |ctx: &Arc<VulkanContext>| unsafe {
            ctx.device.destroy_image(image, None);
            ctx.device.free_memory(memory, None);
        };

        if let Err(e) = unsafe { ctx.device.bind_image_memory(image, memory, 0) } {
            cleanup(ctx);
            return Err(SetupError::ResourceAllocation { what, source: e });
        }

        let view = if with_view {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { ctx.device.create_image_view(&view_info, None) } {
                Ok(view) => view,
                Err(e) => {
                    cleanup(ctx);
                    return Err(SetupError::ResourceAllocation { what, source: e });
                }
            }
        } else {
            vk::ImageView::null()
        };

        Ok(Self {
            image,
            memory,
            view,
            format,
            extent: vk::Extent2D { width, height },
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.ctx.device.destroy_image_view(self.view, None);
            }
            self.ctx.device.destroy_image(self.image, None);
            self.ctx.device.free_memory(self.memory, None);
        }
    }
}
