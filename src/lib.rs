// Vulkan Win32 WSI on top of Wayland.
//
// Windows applications create surfaces with `VK_KHR_win32_surface`. The host only speaks
// `VK_KHR_wayland_surface`, so this driver:
// - substitutes the extension and entry point names in both directions,
// - wraps every native Wayland `VkSurfaceKHR` behind an opaque handle tied to a window,
// - rewrites surface capabilities so the extent always matches the window's client area.
//
// Everything else is forwarded to the system Vulkan loader.
//
// Q?:
// - Should more Win32 only extensions (e.g. external memory win32) be translated here?

mod imp;

pub mod config;
pub mod driver;
pub mod extensions;
pub mod handle;
pub mod wayland;

pub use driver::{get_vulkan_driver, VulkanDriver, DRIVER_INTERFACE_VERSION};

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Native entry points the driver can work without.
    pub struct OptionalEntryPoints: u8 {
        /// `vkGetPhysicalDeviceSurfaceCapabilities2KHR` is exported.
        const SURFACE_CAPABILITIES_2 = 0b0001;

        /// `vkGetPhysicalDeviceSurfaceFormats2KHR` is exported.
        const SURFACE_FORMATS_2 = 0b0010;
    }
}

/// Errors reported by the translated entry points.
///
/// Every variant maps onto a [`vk::Result`] so it can be returned through the Vulkan calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WsiError {
    /// An allocation failed, or the Win32 contract allows no other error code.
    #[error("out of host memory")]
    OutOfHostMemory,

    /// The window backing the surface no longer exists.
    #[error("surface lost")]
    SurfaceLost,

    /// Extension enumeration was scoped to a layer.
    #[error("layer enumeration is not supported by the driver")]
    LayerNotPresent,

    /// The native Vulkan implementation returned an error.
    #[error("native call failed: {0}")]
    Native(vk::Result),
}

impl From<vk::Result> for WsiError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => WsiError::OutOfHostMemory,
            vk::Result::ERROR_SURFACE_LOST_KHR => WsiError::SurfaceLost,
            vk::Result::ERROR_LAYER_NOT_PRESENT => WsiError::LayerNotPresent,
            other => WsiError::Native(other),
        }
    }
}

impl From<WsiError> for vk::Result {
    fn from(err: WsiError) -> Self {
        match err {
            WsiError::OutOfHostMemory => vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            WsiError::SurfaceLost => vk::Result::ERROR_SURFACE_LOST_KHR,
            WsiError::LayerNotPresent => vk::Result::ERROR_LAYER_NOT_PRESENT,
            WsiError::Native(result) => result,
        }
    }
}

/// Errors raised while loading the native Vulkan library.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to load {library}: {source}")]
    Library {
        library: String,
        #[source]
        source: libloading::Error,
    },

    #[error("missing required entry point {0}")]
    MissingEntryPoint(&'static str),
}
