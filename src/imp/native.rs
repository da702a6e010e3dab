use std::ffi::CStr;

use ash::{prelude::VkResult, vk};

use crate::OptionalEntryPoints;

/// The host's Vulkan implementation.
///
/// All allocation callbacks are dropped before reaching this layer.
pub trait NativeVulkan: Send + Sync {
    fn optional_entry_points(&self) -> OptionalEntryPoints;

    unsafe fn create_instance(&self, create_info: &vk::InstanceCreateInfo) -> VkResult<vk::Instance>;

    unsafe fn destroy_instance(&self, instance: vk::Instance);

    unsafe fn create_wayland_surface(
        &self,
        instance: vk::Instance,
        create_info: &vk::WaylandSurfaceCreateInfoKHR,
    ) -> VkResult<vk::SurfaceKHR>;

    unsafe fn destroy_surface(&self, instance: vk::Instance, surface: vk::SurfaceKHR);

    /// `properties` may be null to query the count.
    unsafe fn enumerate_instance_extension_properties(
        &self,
        count: &mut u32,
        properties: *mut vk::ExtensionProperties,
    ) -> vk::Result;

    unsafe fn get_instance_proc_addr(
        &self,
        instance: vk::Instance,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction;

    unsafe fn get_device_proc_addr(&self, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction;

    /// Returns [`None`] if the entry point is not exported.
    unsafe fn get_surface_capabilities2(
        &self,
        physical_device: vk::PhysicalDevice,
        surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
        capabilities: &mut vk::SurfaceCapabilities2KHR,
    ) -> Option<vk::Result>;

    unsafe fn get_surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        capabilities: &mut vk::SurfaceCapabilitiesKHR,
    ) -> vk::Result;

    /// Returns [`None`] if the entry point is not exported.
    unsafe fn get_surface_formats2(
        &self,
        physical_device: vk::PhysicalDevice,
        surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormat2KHR,
    ) -> Option<vk::Result>;

    unsafe fn get_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormatKHR,
    ) -> vk::Result;

    unsafe fn get_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;
}

#[cfg(wayland)]
pub use self::loaded::LoadedVulkan;

#[cfg(wayland)]
mod loaded {
    use std::{ffi::CStr, fmt, os::raw::c_char, ptr};

    use ash::{prelude::VkResult, vk};
    use libloading::Library;

    use super::NativeVulkan;
    use crate::{config::DriverConfig, LoadError, OptionalEntryPoints};

    /// Entry points resolved from the system Vulkan loader.
    pub struct LoadedVulkan {
        // Keeps the function pointers below valid.
        _library: Library,
        create_instance: vk::PFN_vkCreateInstance,
        create_wayland_surface: vk::PFN_vkCreateWaylandSurfaceKHR,
        destroy_instance: vk::PFN_vkDestroyInstance,
        destroy_surface: vk::PFN_vkDestroySurfaceKHR,
        enumerate_instance_extension_properties:
            vk::PFN_vkEnumerateInstanceExtensionProperties,
        get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
        get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
        get_surface_capabilities2:
            Option<vk::PFN_vkGetPhysicalDeviceSurfaceCapabilities2KHR>,
        get_surface_capabilities: vk::PFN_vkGetPhysicalDeviceSurfaceCapabilitiesKHR,
        get_surface_formats2: Option<vk::PFN_vkGetPhysicalDeviceSurfaceFormats2KHR>,
        get_surface_formats: vk::PFN_vkGetPhysicalDeviceSurfaceFormatsKHR,
        get_surface_support: vk::PFN_vkGetPhysicalDeviceSurfaceSupportKHR,
    }

    impl LoadedVulkan {
        /// Opens the configured library and resolves every entry point the driver forwards to.
        ///
        /// # Safety
        ///
        /// The library's initialization routines run in this process.
        pub unsafe fn load(config: &DriverConfig) -> Result<Self, LoadError> {
            let library = Library::new(&config.library).map_err(|source| LoadError::Library {
                library: config.library.to_string_lossy().into_owned(),
                source,
            })?;

            let loaded = Self {
                create_instance: required(&library, "vkCreateInstance")?,
                create_wayland_surface: required(&library, "vkCreateWaylandSurfaceKHR")?,
                destroy_instance: required(&library, "vkDestroyInstance")?,
                destroy_surface: required(&library, "vkDestroySurfaceKHR")?,
                enumerate_instance_extension_properties: required(
                    &library,
                    "vkEnumerateInstanceExtensionProperties",
                )?,
                get_device_proc_addr: required(&library, "vkGetDeviceProcAddr")?,
                get_instance_proc_addr: required(&library, "vkGetInstanceProcAddr")?,
                get_surface_capabilities2: optional(
                    &library,
                    "vkGetPhysicalDeviceSurfaceCapabilities2KHR",
                ),
                get_surface_capabilities: required(
                    &library,
                    "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
                )?,
                get_surface_formats2: optional(&library, "vkGetPhysicalDeviceSurfaceFormats2KHR"),
                get_surface_formats: required(&library, "vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                get_surface_support: required(&library, "vkGetPhysicalDeviceSurfaceSupportKHR")?,
                _library: library,
            };

            log::info!(
                "Loaded {} (optional entry points: {:?})",
                config.library.to_string_lossy(),
                loaded.optional()
            );

            Ok(loaded)
        }

        fn optional(&self) -> OptionalEntryPoints {
            let mut optional = OptionalEntryPoints::empty();
            optional.set(
                OptionalEntryPoints::SURFACE_CAPABILITIES_2,
                self.get_surface_capabilities2.is_some(),
            );
            optional.set(
                OptionalEntryPoints::SURFACE_FORMATS_2,
                self.get_surface_formats2.is_some(),
            );
            optional
        }
    }

    impl fmt::Debug for LoadedVulkan {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("LoadedVulkan")
                .field("optional", &self.optional())
                .finish_non_exhaustive()
        }
    }

    impl NativeVulkan for LoadedVulkan {
        fn optional_entry_points(&self) -> OptionalEntryPoints {
            self.optional()
        }

        unsafe fn create_instance(&self, create_info: &vk::InstanceCreateInfo) -> VkResult<vk::Instance> {
            let mut instance = vk::Instance::null();
            (self.create_instance)(create_info, ptr::null(), &mut instance)
                .result_with_success(instance)
        }

        unsafe fn destroy_instance(&self, instance: vk::Instance) {
            (self.destroy_instance)(instance, ptr::null())
        }

        unsafe fn create_wayland_surface(
            &self,
            instance: vk::Instance,
            create_info: &vk::WaylandSurfaceCreateInfoKHR,
        ) -> VkResult<vk::SurfaceKHR> {
            let mut surface = vk::SurfaceKHR::null();
            (self.create_wayland_surface)(instance, create_info, ptr::null(), &mut surface)
                .result_with_success(surface)
        }

        unsafe fn destroy_surface(&self, instance: vk::Instance, surface: vk::SurfaceKHR) {
            (self.destroy_surface)(instance, surface, ptr::null())
        }

        unsafe fn enumerate_instance_extension_properties(
            &self,
            count: &mut u32,
            properties: *mut vk::ExtensionProperties,
        ) -> vk::Result {
            (self.enumerate_instance_extension_properties)(ptr::null::<c_char>(), count, properties)
        }

        unsafe fn get_instance_proc_addr(
            &self,
            instance: vk::Instance,
            name: &CStr,
        ) -> vk::PFN_vkVoidFunction {
            (self.get_instance_proc_addr)(instance, name.as_ptr())
        }

        unsafe fn get_device_proc_addr(&self, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction {
            (self.get_device_proc_addr)(device, name.as_ptr())
        }

        unsafe fn get_surface_capabilities2(
            &self,
            physical_device: vk::PhysicalDevice,
            surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
            capabilities: &mut vk::SurfaceCapabilities2KHR,
        ) -> Option<vk::Result> {
            self.get_surface_capabilities2
                .map(|f| f(physical_device, surface_info, capabilities))
        }

        unsafe fn get_surface_capabilities(
            &self,
            physical_device: vk::PhysicalDevice,
            surface: vk::SurfaceKHR,
            capabilities: &mut vk::SurfaceCapabilitiesKHR,
        ) -> vk::Result {
            (self.get_surface_capabilities)(physical_device, surface, capabilities)
        }

        unsafe fn get_surface_formats2(
            &self,
            physical_device: vk::PhysicalDevice,
            surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
            count: &mut u32,
            formats: *mut vk::SurfaceFormat2KHR,
        ) -> Option<vk::Result> {
            self.get_surface_formats2
                .map(|f| f(physical_device, surface_info, count, formats))
        }

        unsafe fn get_surface_formats(
            &self,
            physical_device: vk::PhysicalDevice,
            surface: vk::SurfaceKHR,
            count: &mut u32,
            formats: *mut vk::SurfaceFormatKHR,
        ) -> vk::Result {
            (self.get_surface_formats)(physical_device, surface, count, formats)
        }

        unsafe fn get_surface_support(
            &self,
            physical_device: vk::PhysicalDevice,
            queue_family_index: u32,
            surface: vk::SurfaceKHR,
        ) -> VkResult<bool> {
            let mut supported = vk::FALSE;
            (self.get_surface_support)(physical_device, queue_family_index, surface, &mut supported)
                .result_with_success(supported == vk::TRUE)
        }
    }

    unsafe fn required<T: Copy>(library: &Library, name: &'static str) -> Result<T, LoadError> {
        optional(library, name).ok_or(LoadError::MissingEntryPoint(name))
    }

    unsafe fn optional<T: Copy>(library: &Library, name: &str) -> Option<T> {
        library.get::<T>(name.as_bytes()).ok().map(|symbol| *symbol)
    }
}
