// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface and logical device bring-up.
//!
//! Order matters: the surface is created from the instance, the physical
//! device is chosen against that surface, and the logical device last.
use std::ffi::{CStr, CString};

use anyhow::{anyhow, Context, Result};
#[cfg(debug_assertions)]
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info};
#[cfg(debug_assertions)]
use tracing::{error, trace, warn};

#[cfg(debug_assertions)]
pub(crate) type DebugState = (debug_utils::Instance, vk::DebugUtilsMessengerEXT);
#[cfg(not(debug_assertions))]
pub(crate) type DebugState = ();

pub(crate) struct InstanceBundle {
    pub entry: Entry,
    pub instance: Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub debug: DebugState,
}

pub(crate) struct DeviceBundle {
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family: u32,
    pub queue: vk::Queue,
    pub device_name: String,
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", ?types, "{msg}");
    } else {
        trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugState> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .context("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(_entry: &Entry, _instance: &Instance) -> Result<DebugState> {
    Ok(())
}

#[cfg(debug_assertions)]
pub(crate) unsafe fn destroy_debug_messenger(debug: &DebugState) {
    debug.0.destroy_debug_utils_messenger(debug.1, None);
}

#[cfg(not(debug_assertions))]
pub(crate) unsafe fn destroy_debug_messenger(_debug: &DebugState) {}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    app_name: &str,
) -> Result<Instance> {
    let app = CString::new(app_name).context("application name contains a NUL byte")?;
    let engine = c"Tessera";

    // 1.1 for negative viewport heights (maintenance1 is core there)
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: engine.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let required = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?;
    #[cfg(debug_assertions)]
    let extensions = {
        let mut v = required.to_vec();
        v.push(debug_utils::NAME.as_ptr());
        v
    };
    #[cfg(not(debug_assertions))]
    let extensions = required.to_vec();

    #[cfg(debug_assertions)]
    let layers = {
        let wanted = c"VK_LAYER_KHRONOS_validation";
        let available = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default();
        let present = available
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == wanted);
        if !present {
            warn!("validation layer not installed, running without it");
        }
        if present {
            vec![wanted.as_ptr()]
        } else {
            Vec::new()
        }
    };
    #[cfg(not(debug_assertions))]
    let layers: Vec<*const std::ffi::c_char> = Vec::new();

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    Ok(entry.create_instance(&create_info, None)?)
}

pub(crate) unsafe fn init_instance_and_surface(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    app_name: &str,
) -> Result<InstanceBundle> {
    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let wh = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();

    let entry = Entry::linked();
    let instance = create_instance(&entry, dh, app_name).context("create_instance")?;

    let surface_loader = surface::Instance::new(&entry, &instance);
    let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
        Ok(s) => s,
        Err(e) => {
            instance.destroy_instance(None);
            return Err(anyhow!("ash_window::create_surface: {e}"));
        }
    };

    let debug = match create_debug_messenger(&entry, &instance) {
        Ok(d) => d,
        Err(e) => {
            surface_loader.destroy_surface(surface, None);
            instance.destroy_instance(None);
            return Err(e);
        }
    };

    Ok(InstanceBundle {
        entry,
        instance,
        surface_loader,
        surface,
        debug,
    })
}

/// First physical device with a graphics queue family that can present to
/// `surface`. Discrete GPUs are tried before everything else.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let mut devices = instance.enumerate_physical_devices()?;
    debug!(candidates = devices.len(), "enumerated physical devices");
    devices.sort_by_key(|&phys| {
        let props = instance.get_physical_device_properties(phys);
        props.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    });

    for phys in devices {
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        for (i, q) in qprops.iter().enumerate() {
            if q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surface_loader
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false)
            {
                return Ok((phys, i as u32));
            }
        }
    }
    Err(anyhow!("no suitable physical device/queue family"))
}

pub(crate) unsafe fn create_logical_device(bundle: &InstanceBundle) -> Result<DeviceBundle> {
    let (phys, queue_family) =
        pick_device_and_queue(&bundle.instance, &bundle.surface_loader, bundle.surface)?;
    let props = bundle.instance.get_physical_device_properties(phys);
    let device_name = CStr::from_ptr(props.device_name.as_ptr())
        .to_string_lossy()
        .into_owned();

    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };

    let device = bundle
        .instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;
    let queue = device.get_device_queue(queue_family, 0);

    let api = format!(
        "{}.{}.{}",
        vk::api_version_major(props.api_version),
        vk::api_version_minor(props.api_version),
        vk::api_version_patch(props.api_version)
    );
    info!(gpu = %device_name, queue_family, %api, "Vulkan device created");

    Ok(DeviceBundle {
        phys,
        device,
        queue_family,
        queue,
        device_name,
    })
}

pub(crate) unsafe fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: queue_family,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ..Default::default()
    };
    Ok(device.create_command_pool(&pool_info, None)?)
}
