// vkmininfo - print what the Vulkan implementation offers.
//
// No device is created: just the loader, an instance, and the physical
// device query API. Output goes to stdout so it can be grepped.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;

fn main() -> Result<()> {
    vkdemos::init_logging();

    let entry = unsafe { ash::Entry::load() }.context("Failed to load Vulkan library")?;

    let instance_version = match entry.try_enumerate_instance_version()? {
        Some(version) => version,
        None => vk::API_VERSION_1_0,
    };
    println!(
        "Instance API version: {}.{}.{}",
        vk::api_version_major(instance_version),
        vk::api_version_minor(instance_version),
        vk::api_version_patch(instance_version)
    );

    let extensions = entry
        .enumerate_instance_extension_properties(None)
        .context("Failed to enumerate instance extensions")?;
    println!("\nInstance extensions ({}):", extensions.len());
    for ext in &extensions {
        println!(
            "  {} (rev {})",
            fixed_cstr(&ext.extension_name),
            ext.spec_version
        );
    }

    let layers = entry
        .enumerate_instance_layer_properties()
        .context("Failed to enumerate instance layers")?;
    println!("\nInstance layers ({}):", layers.len());
    for layer in &layers {
        println!(
            "  {} (spec {}.{}.{}, impl {}) - {}",
            fixed_cstr(&layer.layer_name),
            vk::api_version_major(layer.spec_version),
            vk::api_version_minor(layer.spec_version),
            vk::api_version_patch(layer.spec_version),
            layer.implementation_version,
            fixed_cstr(&layer.description)
        );
    }

    let app_name = CStr::from_bytes_with_nul(b"vkmininfo\0")?;
    let app_info = vk::ApplicationInfo::builder()
        .application_name(app_name)
        .api_version(vk::API_VERSION_1_0);
    let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .context("Failed to create Vulkan instance")?;

    let result = dump_devices(&instance);

    unsafe { instance.destroy_instance(None) };
    result
}

fn dump_devices(instance: &ash::Instance) -> Result<()> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .context("Failed to enumerate physical devices")?;
    println!("\nPhysical devices ({}):", devices.len());

    for (index, &device) in devices.iter().enumerate() {
        let props = unsafe { instance.get_physical_device_properties(device) };

        println!("\nDevice {}: {}", index, fixed_cstr(&props.device_name));
        println!("  Type: {:?}", props.device_type);
        println!(
            "  API version: {}.{}.{}",
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version)
        );
        println!("  Driver version: {:#x}", props.driver_version);
        println!(
            "  Vendor/device id: {:#06x} / {:#06x}",
            props.vendor_id, props.device_id
        );

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };
        println!("  Queue families ({}):", queue_families.len());
        for (family_index, family) in queue_families.iter().enumerate() {
            println!(
                "    {}: {} queues, {:?}",
                family_index, family.queue_count, family.queue_flags
            );
        }

        let memory = unsafe { instance.get_physical_device_memory_properties(device) };
        println!("  Memory heaps ({}):", memory.memory_heap_count);
        for heap_index in 0..memory.memory_heap_count as usize {
            let heap = memory.memory_heaps[heap_index];
            println!(
                "    {}: {} MiB {:?}",
                heap_index,
                heap.size / (1024 * 1024),
                heap.flags
            );
        }
        println!("  Memory types ({}):", memory.memory_type_count);
        for type_index in 0..memory.memory_type_count as usize {
            let memory_type = memory.memory_types[type_index];
            println!(
                "    {}: heap {} {:?}",
                type_index, memory_type.heap_index, memory_type.property_flags
            );
        }
    }

    Ok(())
}

/// Read a NUL-terminated name out of a fixed-size Vulkan char array.
fn fixed_cstr(chars: &[std::os::raw::c_char]) -> std::borrow::Cow<'_, str> {
    unsafe { CStr::from_ptr(chars.as_ptr()) }.to_string_lossy()
}
