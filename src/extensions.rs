//! Win32 and Wayland name substitution.

use std::{ffi::CStr, os::raw::c_char};

use ash::vk::{self, KhrWaylandSurfaceFn, KhrWin32SurfaceFn};

/// `VK_KHR_win32_surface`
pub const WIN32_SURFACE_EXTENSION: &CStr = KhrWin32SurfaceFn::name();

/// `VK_KHR_wayland_surface`
pub const WAYLAND_SURFACE_EXTENSION: &CStr = KhrWaylandSurfaceFn::name();

/// `VK_KHR_WIN32_SURFACE_SPEC_VERSION`, reported in place of the native Wayland extension's version.
pub const WIN32_SURFACE_SPEC_VERSION: u32 = 6;

const CREATE_WIN32_SURFACE: &[u8] = b"vkCreateWin32SurfaceKHR\0";
const CREATE_WAYLAND_SURFACE: &[u8] = b"vkCreateWaylandSurfaceKHR\0";

/// Maps an instance extension requested by the application to the one the host provides.
pub fn native_extension_name(name: &CStr) -> &CStr {
    if name == WIN32_SURFACE_EXTENSION {
        WAYLAND_SURFACE_EXTENSION
    } else {
        name
    }
}

/// Maps an entry point name to the native entry point implementing it.
pub fn native_function_name(name: &CStr) -> &CStr {
    if name.to_bytes_with_nul() == CREATE_WIN32_SURFACE {
        // Static, nul terminated, no interior nul.
        unsafe { CStr::from_bytes_with_nul_unchecked(CREATE_WAYLAND_SURFACE) }
    } else {
        name
    }
}

/// Rewrites an application's enabled extension list for the native loader.
///
/// # Safety
///
/// Every pointer in `names` must point to a nul terminated string.
pub unsafe fn native_extension_names(names: &[*const c_char]) -> Vec<*const c_char> {
    names
        .iter()
        .map(|&name| native_extension_name(CStr::from_ptr(name)).as_ptr())
        .collect()
}

/// Reports native extensions under their Win32 names.
pub fn win32_extension_properties(properties: &mut [vk::ExtensionProperties]) {
    for property in properties {
        if property_name(property) == WAYLAND_SURFACE_EXTENSION {
            log::trace!(
                "Substituting {} for {}",
                WAYLAND_SURFACE_EXTENSION.to_string_lossy(),
                WIN32_SURFACE_EXTENSION.to_string_lossy()
            );

            write_name(&mut property.extension_name, WIN32_SURFACE_EXTENSION);
            property.spec_version = WIN32_SURFACE_SPEC_VERSION;
        }
    }
}

/// The extension name stored in `property`.
pub fn property_name(property: &vk::ExtensionProperties) -> &CStr {
    let bytes = unsafe {
        std::slice::from_raw_parts(
            property.extension_name.as_ptr().cast::<u8>(),
            property.extension_name.len(),
        )
    };

    match bytes.iter().position(|&b| b == 0) {
        Some(end) => unsafe { CStr::from_bytes_with_nul_unchecked(&bytes[..=end]) },
        // Unterminated names never match a real extension.
        None => Default::default(),
    }
}

/// Stores `name` in a fixed size Vulkan string, truncating if needed.
pub fn write_name(dst: &mut [c_char; vk::MAX_EXTENSION_NAME_SIZE], name: &CStr) {
    dst.fill(0);

    let bytes = name.to_bytes();
    let len = bytes.len().min(dst.len() - 1);
    for (dst, &src) in dst.iter_mut().zip(&bytes[..len]) {
        *dst = src as c_char;
    }
}
