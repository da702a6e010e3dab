//! `extern "system"` entry points handed out by proc address lookups.
//!
//! Each one forwards to the process's driver returned by [`crate::driver::loaded`].

use std::{ffi::CStr, mem, os::raw::c_char};

use ash::vk;

use crate::driver::{self, VulkanDriver};

/// Which lookups may return an entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Resolvable without an instance.
    Global,
    Instance,
    Device,
}

macro_rules! entry_point {
    ($f:expr) => {
        Some(unsafe { mem::transmute::<*const (), unsafe extern "system" fn()>($f as *const ()) })
    };
}

fn lookup(name: &CStr) -> Option<(Scope, vk::PFN_vkVoidFunction)> {
    let entry = match name.to_bytes() {
        b"vkCreateInstance" => (Scope::Global, entry_point!(create_instance)),
        b"vkEnumerateInstanceExtensionProperties" => (
            Scope::Global,
            entry_point!(enumerate_instance_extension_properties),
        ),
        b"vkGetInstanceProcAddr" => (Scope::Global, entry_point!(get_instance_proc_addr)),
        b"vkCreateWin32SurfaceKHR" => (Scope::Instance, entry_point!(create_win32_surface)),
        b"vkDestroyInstance" => (Scope::Instance, entry_point!(destroy_instance)),
        b"vkDestroySurfaceKHR" => (Scope::Instance, entry_point!(destroy_surface)),
        b"vkGetPhysicalDeviceSurfaceCapabilities2KHR" => (
            Scope::Instance,
            entry_point!(get_physical_device_surface_capabilities2),
        ),
        b"vkGetPhysicalDeviceSurfaceCapabilitiesKHR" => (
            Scope::Instance,
            entry_point!(get_physical_device_surface_capabilities),
        ),
        b"vkGetPhysicalDeviceSurfaceFormats2KHR" => (
            Scope::Instance,
            entry_point!(get_physical_device_surface_formats2),
        ),
        b"vkGetPhysicalDeviceSurfaceFormatsKHR" => (
            Scope::Instance,
            entry_point!(get_physical_device_surface_formats),
        ),
        b"vkGetPhysicalDeviceSurfaceSupportKHR" => (
            Scope::Instance,
            entry_point!(get_physical_device_surface_support),
        ),
        b"vkGetDeviceProcAddr" => (Scope::Device, entry_point!(get_device_proc_addr)),
        _ => return None,
    };

    Some(entry)
}

/// The driver's own implementation of `name` for an instance level lookup.
///
/// Without an instance only global entry points resolve.
pub fn instance_proc_addr(instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction {
    match lookup(name)? {
        (Scope::Global, function) => function,
        (_, function) if instance != vk::Instance::null() => function,
        _ => None,
    }
}

/// The driver's own implementation of `name` for a device level lookup.
pub fn device_proc_addr(name: &CStr) -> vk::PFN_vkVoidFunction {
    match lookup(name)? {
        (Scope::Device, function) => function,
        _ => None,
    }
}

fn with_driver<T>(unloaded: T, f: impl FnOnce(&dyn VulkanDriver) -> T) -> T {
    match driver::loaded() {
        Some(driver) => f(driver),
        None => unloaded,
    }
}

fn into_raw<T>(result: ash::prelude::VkResult<T>, out: impl FnOnce(T)) -> vk::Result {
    match result {
        Ok(value) => {
            out(value);
            vk::Result::SUCCESS
        }
        Err(err) => err,
    }
}

unsafe fn name_arg<'a>(name: *const c_char) -> Option<&'a CStr> {
    (!name.is_null()).then(|| CStr::from_ptr(name))
}

unsafe extern "system" fn create_instance(
    create_info: *const vk::InstanceCreateInfo,
    allocator: *const vk::AllocationCallbacks,
    instance: *mut vk::Instance,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        into_raw(
            driver.create_instance(&*create_info, allocator.as_ref()),
            |created| *instance = created,
        )
    })
}

unsafe extern "system" fn create_win32_surface(
    instance: vk::Instance,
    create_info: *const vk::Win32SurfaceCreateInfoKHR,
    allocator: *const vk::AllocationCallbacks,
    surface: *mut vk::SurfaceKHR,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        into_raw(
            driver.create_win32_surface(instance, &*create_info, allocator.as_ref()),
            |created| *surface = created,
        )
    })
}

unsafe extern "system" fn destroy_instance(
    instance: vk::Instance,
    allocator: *const vk::AllocationCallbacks,
) {
    with_driver((), |driver| {
        driver.destroy_instance(instance, allocator.as_ref())
    })
}

unsafe extern "system" fn destroy_surface(
    instance: vk::Instance,
    surface: vk::SurfaceKHR,
    allocator: *const vk::AllocationCallbacks,
) {
    with_driver((), |driver| {
        driver.destroy_surface(instance, surface, allocator.as_ref())
    })
}

unsafe extern "system" fn enumerate_instance_extension_properties(
    layer_name: *const c_char,
    count: *mut u32,
    properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        driver.enumerate_instance_extension_properties(name_arg(layer_name), &mut *count, properties)
    })
}

unsafe extern "system" fn get_device_proc_addr(
    device: vk::Device,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = name_arg(name)?;
    with_driver(None, |driver| driver.get_device_proc_addr(device, name))
}

unsafe extern "system" fn get_instance_proc_addr(
    instance: vk::Instance,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = name_arg(name)?;
    with_driver(None, |driver| driver.get_instance_proc_addr(instance, name))
}

unsafe extern "system" fn get_physical_device_surface_capabilities2(
    physical_device: vk::PhysicalDevice,
    surface_info: *const vk::PhysicalDeviceSurfaceInfo2KHR,
    capabilities: *mut vk::SurfaceCapabilities2KHR,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        into_raw(
            driver.get_physical_device_surface_capabilities2(
                physical_device,
                &*surface_info,
                &mut *capabilities,
            ),
            |()| (),
        )
    })
}

unsafe extern "system" fn get_physical_device_surface_capabilities(
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    capabilities: *mut vk::SurfaceCapabilitiesKHR,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        into_raw(
            driver.get_physical_device_surface_capabilities(physical_device, surface),
            |caps| *capabilities = caps,
        )
    })
}

unsafe extern "system" fn get_physical_device_surface_formats2(
    physical_device: vk::PhysicalDevice,
    surface_info: *const vk::PhysicalDeviceSurfaceInfo2KHR,
    count: *mut u32,
    formats: *mut vk::SurfaceFormat2KHR,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        driver.get_physical_device_surface_formats2(
            physical_device,
            &*surface_info,
            &mut *count,
            formats,
        )
    })
}

unsafe extern "system" fn get_physical_device_surface_formats(
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    count: *mut u32,
    formats: *mut vk::SurfaceFormatKHR,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        driver.get_physical_device_surface_formats(physical_device, surface, &mut *count, formats)
    })
}

unsafe extern "system" fn get_physical_device_surface_support(
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    surface: vk::SurfaceKHR,
    supported: *mut vk::Bool32,
) -> vk::Result {
    with_driver(vk::Result::ERROR_INITIALIZATION_FAILED, |driver| {
        into_raw(
            driver.get_physical_device_surface_support(physical_device, queue_family_index, surface),
            |is_supported| *supported = is_supported.into(),
        )
    })
}
