use std::ffi::CStr;

use ash::{prelude::VkResult, vk};

/// Version of the [`VulkanDriver`] interface implemented by this crate.
pub const DRIVER_INTERFACE_VERSION: u32 = 11;

/// The WSI entry points a Vulkan driver provides to the Win32 side of the graphics stack.
///
/// Surface handles passed in and returned are opaque handles owned by the driver, not native
/// `VkSurfaceKHR`s. Use [`VulkanDriver::get_native_surface`] to reach the native surface.
///
/// Allocation callbacks are accepted but ignored.
pub trait VulkanDriver: Send + Sync {
    unsafe fn create_instance(
        &self,
        create_info: &vk::InstanceCreateInfo,
        allocator: Option<&vk::AllocationCallbacks>,
    ) -> VkResult<vk::Instance>;

    unsafe fn create_win32_surface(
        &self,
        instance: vk::Instance,
        create_info: &vk::Win32SurfaceCreateInfoKHR,
        allocator: Option<&vk::AllocationCallbacks>,
    ) -> VkResult<vk::SurfaceKHR>;

    unsafe fn destroy_instance(
        &self,
        instance: vk::Instance,
        allocator: Option<&vk::AllocationCallbacks>,
    );

    /// Destroying [`vk::SurfaceKHR::null()`] does nothing.
    unsafe fn destroy_surface(
        &self,
        instance: vk::Instance,
        surface: vk::SurfaceKHR,
        allocator: Option<&vk::AllocationCallbacks>,
    );

    /// Fails with [`vk::Result::ERROR_LAYER_NOT_PRESENT`] when `layer_name` is set.
    unsafe fn enumerate_instance_extension_properties(
        &self,
        layer_name: Option<&CStr>,
        count: &mut u32,
        properties: *mut vk::ExtensionProperties,
    ) -> vk::Result;

    unsafe fn get_device_proc_addr(&self, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction;

    unsafe fn get_instance_proc_addr(
        &self,
        instance: vk::Instance,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction;

    unsafe fn get_physical_device_surface_capabilities2(
        &self,
        physical_device: vk::PhysicalDevice,
        surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
        capabilities: &mut vk::SurfaceCapabilities2KHR,
    ) -> VkResult<()>;

    unsafe fn get_physical_device_surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    unsafe fn get_physical_device_surface_formats2(
        &self,
        physical_device: vk::PhysicalDevice,
        surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormat2KHR,
    ) -> vk::Result;

    unsafe fn get_physical_device_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormatKHR,
    ) -> vk::Result;

    unsafe fn get_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    /// The native surface behind `surface`, or [`vk::SurfaceKHR::null()`] for an unknown handle.
    fn get_native_surface(&self, surface: vk::SurfaceKHR) -> vk::SurfaceKHR;
}

/// Returns the process's Vulkan driver.
///
/// `version` must be exactly [`DRIVER_INTERFACE_VERSION`]. The native library is loaded on the first
/// successful call. The Wayland display may be published with [`crate::wayland::connect`] later, surface
/// creation fails until it is.
pub fn get_vulkan_driver(version: u32) -> Option<&'static dyn VulkanDriver> {
    if version != DRIVER_INTERFACE_VERSION {
        log::error!(
            "version mismatch, vulkan wants {} but driver has {}",
            version,
            DRIVER_INTERFACE_VERSION
        );
        return None;
    }

    loaded()
}

#[cfg(wayland)]
pub(crate) fn loaded() -> Option<&'static dyn VulkanDriver> {
    use std::sync::OnceLock;

    use crate::{
        config::DriverConfig,
        imp::{native::LoadedVulkan, WaylandVulkan},
    };

    // Loading runs at most once per process, even if the first calls race.
    static DRIVER: OnceLock<Option<WaylandVulkan<LoadedVulkan>>> = OnceLock::new();

    let driver = DRIVER.get_or_init(|| {
        let config = DriverConfig::from_env();
        config.init_logging();

        match unsafe { LoadedVulkan::load(&config) } {
            Ok(native) => Some(WaylandVulkan::new(native)),
            Err(err) => {
                log::error!("{}", err);
                None
            }
        }
    });

    driver.as_ref().map(|driver| driver as &dyn VulkanDriver)
}

#[cfg(not(wayland))]
pub(crate) fn loaded() -> Option<&'static dyn VulkanDriver> {
    log::error!("Built without Vulkan support");
    None
}
