// Vulkan context - instance, device and queue shared by every example.
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Physical device selection (prefer discrete GPU)
// - Logical device + graphics queue creation
// - A submit-and-wait helper for the one-shot examples

use ash::{vk, Entry};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use crate::error::SetupError;

/// Everything that varies between the example binaries at context creation.
pub struct ContextOptions {
    pub app_name: &'static str,
    pub validation: bool,
    pub instance_extensions: Vec<&'static CStr>,
    pub device_extensions: Vec<&'static CStr>,
}

impl ContextOptions {
    /// Options for an offscreen example: no surface, no device extensions.
    pub fn headless(app_name: &'static str, validation: bool) -> Self {
        Self {
            app_name,
            validation,
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
        }
    }
}

/// Vulkan context wrapper with automatic cleanup
pub struct VulkanContext {
    // Handle order matters for drop.
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    entry: Entry,

    pub queue: vk::Queue,
    pub queue_family: u32,

    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Cached once at creation.
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanContext {
    pub fn new(options: ContextOptions) -> Result<Arc<Self>, SetupError> {
        log::info!("Creating Vulkan context: {}", options.app_name);

        let entry = unsafe { Entry::load() }.map_err(SetupError::Loader)?;

        let instance = Self::create_instance(&entry, &options)?;

        let debug_utils = if options.validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let (physical_device, queue_family) = Self::pick_physical_device(&instance)?;

        let (device, queue) =
            Self::create_logical_device(&instance, physical_device, queue_family, &options)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::debug!(
            "API version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            entry,
            queue,
            queue_family,
            debug_utils,
            properties,
            memory_properties,
        }))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    fn create_instance(entry: &Entry, options: &ContextOptions) -> Result<ash::Instance, SetupError> {
        let app_name = CString::new(options.app_name).map_err(|_| SetupError::InvalidName)?;
        let engine_name = CString::new("RAW").map_err(|_| SetupError::InvalidName)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            // 1.1 promotes VK_KHR_external_memory_capabilities, so the shared
            // memory example needs no extra instance extensions.
            .api_version(vk::API_VERSION_1_1);

        let mut extensions: Vec<*const std::os::raw::c_char> = options
            .instance_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();
        if options.validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let layer_names = if options.validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.map_err(SetupError::Instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT), SetupError> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(SetupError::Instance)?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
    ) -> Result<(vk::PhysicalDevice, u32), SetupError> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(SetupError::Instance)?;

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };

            let graphics_family = queue_families
                .iter()
                .enumerate()
                .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32);

            if let Some(graphics_family) = graphics_family {
                let score = match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                    _ => 1,
                };

                if score > best_score {
                    best_score = score;
                    best_device = Some((device, graphics_family));
                }
            }
        }

        best_device.ok_or(SetupError::DeviceSelection)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        options: &ContextOptions,
    ) -> Result<(ash::Device, vk::Queue), SetupError> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions: Vec<*const std::os::raw::c_char> = options
            .device_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(SetupError::DeviceCreation)?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Ok((device, queue))
    }

    /// Find a memory type matching `type_bits` and `flags`.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
        what: &'static str,
    ) -> Result<u32, SetupError> {
        for (i, memory_type) in self.memory_properties.memory_types
            [..self.memory_properties.memory_type_count as usize]
            .iter()
            .enumerate()
        {
            if type_bits & (1 << i) != 0 && memory_type.property_flags.contains(flags) {
                return Ok(i as u32);
            }
        }
        Err(SetupError::NoMemoryType(what))
    }

    /// Submit one command buffer and block until it finishes.
    pub fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> Result<(), SetupError> {
        let fence_info = vk::FenceCreateInfo::builder();
        let fence = unsafe { self.device.create_fence(&fence_info, None) }.map_err(|e| {
            SetupError::ResourceAllocation {
                what: "submit fence",
                source: e,
            }
        })?;

        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(std::slice::from_ref(&command_buffer))
            .build();

        let result = unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], fence)
                .and_then(|_| self.device.wait_for_fences(&[fence], true, u64::MAX))
        };

        unsafe { self.device.destroy_fence(fence, None) };
        result.map_err(SetupError::Submission)
    }

    /// Wait for the device to be idle (e.g. before teardown).
    pub fn wait_idle(&self) {
        let _ = unsafe { self.device.device_wait_idle() };
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan context");

        self.wait_idle();

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
