pub mod entry;
pub mod native;

use std::{ffi::CStr, fmt, ptr, slice, sync::Arc};

use ash::{
    prelude::VkResult,
    vk::{self, Handle},
};

use crate::{
    driver::VulkanDriver,
    extensions,
    handle::HandleTable,
    wayland::{self, ClientRef, Hwnd, ProcessWayland, WindowSurfaceGuard},
    WsiError,
};

use self::native::NativeVulkan;

/// A Win32 surface handed out to the application.
struct SurfaceRecord {
    client: ClientRef,
    native: vk::SurfaceKHR,
}

impl SurfaceRecord {
    fn hwnd(&self) -> Hwnd {
        self.client.hwnd()
    }
}

/// Where the display connection and window registry come from.
enum Connection {
    /// Looked up on every use, so a display published after the driver loaded is still found.
    Lookup(fn() -> Option<&'static ProcessWayland>),
    Fixed(ProcessWayland),
}

/// Implements the Win32 WSI on top of a native Vulkan driver with Wayland WSI.
pub struct WaylandVulkan<N> {
    native: N,
    connection: Connection,
    surfaces: HandleTable<Arc<SurfaceRecord>>,
}

impl<N: NativeVulkan> WaylandVulkan<N> {
    /// Uses the display and registry published with [`wayland::connect`], whenever that happens.
    pub fn new(native: N) -> Self {
        Self::with_connection(native, Connection::Lookup(wayland::process_wayland))
    }

    fn with_connection(native: N, connection: Connection) -> Self {
        log::debug!(
            "Native optional entry points: {:?}",
            native.optional_entry_points()
        );

        Self {
            native,
            connection,
            surfaces: HandleTable::new(),
        }
    }

    fn wayland(&self) -> Option<&ProcessWayland> {
        match &self.connection {
            Connection::Lookup(lookup) => lookup(),
            Connection::Fixed(wayland) => Some(wayland),
        }
    }

    fn lock_hwnd(&self, hwnd: Hwnd) -> Option<WindowSurfaceGuard> {
        self.wayland()?.registry().lock_hwnd(hwnd)
    }

    fn surface(&self, handle: vk::SurfaceKHR) -> Result<Arc<SurfaceRecord>, WsiError> {
        self.surfaces.get(handle.as_raw()).ok_or_else(|| {
            log::warn!("Unknown surface 0x{:x}", handle.as_raw());
            WsiError::SurfaceLost
        })
    }

    /// Looks up `handle` and checks that its window still exists.
    fn valid_surface(&self, handle: vk::SurfaceKHR) -> Result<Arc<SurfaceRecord>, WsiError> {
        let record = self.surface(handle)?;

        if !self.is_valid(&record) {
            return Err(WsiError::SurfaceLost);
        }

        Ok(record)
    }

    /// Whether the window backing `record` is still registered.
    ///
    /// The answer may be stale as soon as it is returned.
    fn is_valid(&self, record: &SurfaceRecord) -> bool {
        self.lock_hwnd(record.hwnd()).is_some()
    }

    /// Makes the extents match what the Win32 WSI would report: the window's client area.
    fn update_caps(
        &self,
        record: &SurfaceRecord,
        caps: &mut vk::SurfaceCapabilitiesKHR,
    ) -> Result<(), WsiError> {
        let hwnd = record.hwnd();
        let extent = self
            .lock_hwnd(hwnd)
            .map(|surface| surface.client_rect().extent())
            .ok_or(WsiError::SurfaceLost)?;

        caps.min_image_extent = extent;
        caps.max_image_extent = extent;
        caps.current_extent = extent;

        log::trace!(
            "hwnd={:#x} extent={}x{}",
            hwnd.as_raw(),
            extent.width,
            extent.height
        );

        Ok(())
    }

    /// Gives up a client reference, detaching the client surface from its window if this was the last
    /// one.
    ///
    /// The release happens under the window lock so that a concurrent surface creation cannot pick up a
    /// client whose last reference is going away.
    fn release_client(&self, client: &ClientRef) {
        let window = self.lock_hwnd(client.hwnd());

        if client.release() {
            if let Some(mut window) = window {
                window.detach_client();
                log::debug!("Detached client surface from hwnd={:#x}", client.hwnd().as_raw());
            }
        }
    }
}

fn warn_allocator(allocator: Option<&vk::AllocationCallbacks>) {
    if allocator.is_some() {
        log::warn!("Support for allocation callbacks not implemented yet");
    }
}

impl<N: NativeVulkan> VulkanDriver for WaylandVulkan<N> {
    unsafe fn create_instance(
        &self,
        create_info: &vk::InstanceCreateInfo,
        allocator: Option<&vk::AllocationCallbacks>,
    ) -> VkResult<vk::Instance> {
        log::trace!("create_info {:p}, allocator {}", create_info, allocator.is_some());
        warn_allocator(allocator);

        let names = if create_info.enabled_extension_count > 0 {
            slice::from_raw_parts(
                create_info.pp_enabled_extension_names,
                create_info.enabled_extension_count as usize,
            )
        } else {
            &[]
        };

        // Everything except the WSI extensions was already converted by the caller.
        let extensions = extensions::native_extension_names(names);
        let native_info = vk::InstanceCreateInfo {
            enabled_layer_count: 0,
            pp_enabled_layer_names: ptr::null(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: if extensions.is_empty() {
                ptr::null()
            } else {
                extensions.as_ptr()
            },
            ..*create_info
        };

        self.native.create_instance(&native_info).map_err(|err| {
            log::error!("Failed to create instance, res={}", err);
            err
        })
    }

    unsafe fn create_win32_surface(
        &self,
        instance: vk::Instance,
        create_info: &vk::Win32SurfaceCreateInfoKHR,
        allocator: Option<&vk::AllocationCallbacks>,
    ) -> VkResult<vk::SurfaceKHR> {
        let hwnd = Hwnd::from(create_info.hwnd);
        log::trace!("instance {:?}, hwnd={:#x}", instance, hwnd.as_raw());
        warn_allocator(allocator);

        if !create_info.flags.is_empty() {
            log::warn!("Ignoring reserved surface flags {:?}", create_info.flags);
        }

        let wayland = match self.wayland() {
            Some(wayland) => wayland,
            None => {
                log::error!(
                    "No wayland display connection, cannot create surface for hwnd={:#x}",
                    hwnd.as_raw()
                );
                return Err(WsiError::SurfaceLost.into());
            }
        };

        let client = {
            let mut window = match wayland.registry().lock_hwnd(hwnd) {
                Some(window) => window,
                None => {
                    log::error!("Failed to find wayland surface for hwnd={:#x}", hwnd.as_raw());
                    return Err(WsiError::SurfaceLost.into());
                }
            };

            window.get_client()
        };

        let client = match client {
            Some(client) => client,
            None => {
                log::error!("Failed to create client surface for hwnd={:#x}", hwnd.as_raw());
                // VK_KHR_win32_surface only allows out of host and device memory as errors.
                return Err(WsiError::OutOfHostMemory.into());
            }
        };

        let native_info = vk::WaylandSurfaceCreateInfoKHR::builder()
            .display(wayland.display().as_ptr())
            .surface(client.surface().wl_surface().as_ptr());

        let native = match self.native.create_wayland_surface(instance, &native_info) {
            Ok(native) => native,
            Err(err) => {
                log::error!("Failed to create vulkan wayland surface, res={}", err);
                self.release_client(&client);
                return Err(err);
            }
        };

        let record = Arc::new(SurfaceRecord { client, native });
        match self.surfaces.insert(Arc::clone(&record)) {
            Some(handle) => {
                log::trace!("Created surface=0x{:x}", handle);
                Ok(vk::SurfaceKHR::from_raw(handle))
            }
            None => {
                log::error!("Out of surface handles");
                self.native.destroy_surface(instance, record.native);
                self.release_client(&record.client);
                Err(WsiError::OutOfHostMemory.into())
            }
        }
    }

    unsafe fn destroy_instance(
        &self,
        instance: vk::Instance,
        allocator: Option<&vk::AllocationCallbacks>,
    ) {
        log::trace!("instance {:?}", instance);
        warn_allocator(allocator);

        self.native.destroy_instance(instance);
    }

    unsafe fn destroy_surface(
        &self,
        instance: vk::Instance,
        surface: vk::SurfaceKHR,
        allocator: Option<&vk::AllocationCallbacks>,
    ) {
        log::trace!("instance {:?}, surface=0x{:x}", instance, surface.as_raw());
        warn_allocator(allocator);

        // vkDestroySurfaceKHR must handle VK_NULL_HANDLE.
        if surface == vk::SurfaceKHR::null() {
            return;
        }

        let record = match self.surfaces.remove(surface.as_raw()) {
            Some(record) => record,
            None => {
                log::warn!("Destroying unknown surface 0x{:x}", surface.as_raw());
                return;
            }
        };

        self.native.destroy_surface(instance, record.native);
        self.release_client(&record.client);
    }

    unsafe fn enumerate_instance_extension_properties(
        &self,
        layer_name: Option<&CStr>,
        count: &mut u32,
        properties: *mut vk::ExtensionProperties,
    ) -> vk::Result {
        log::trace!("layer_name {:?}, count {}, properties {:p}", layer_name, count, properties);

        // The ICD loader never does this.
        if layer_name.is_some() {
            log::error!("Layer enumeration not supported from ICD.");
            return WsiError::LayerNotPresent.into();
        }

        // Report the host's extensions one for one, with Wayland WSI renamed to Win32. The caller
        // filters out whatever it cannot thunk.
        let res = self
            .native
            .enumerate_instance_extension_properties(count, properties);
        if properties.is_null() || res.as_raw() < 0 {
            return res;
        }

        extensions::win32_extension_properties(slice::from_raw_parts_mut(
            properties,
            *count as usize,
        ));

        log::trace!("Returning {} extensions.", count);
        res
    }

    unsafe fn get_device_proc_addr(&self, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction {
        log::trace!("{:?}, {:?}", device, name);

        // Do not return the driver function if the corresponding native function is not available.
        self.native
            .get_device_proc_addr(device, extensions::native_function_name(name))?;

        entry::device_proc_addr(name).or_else(|| self.native.get_device_proc_addr(device, name))
    }

    unsafe fn get_instance_proc_addr(
        &self,
        instance: vk::Instance,
        name: &CStr,
    ) -> vk::PFN_vkVoidFunction {
        log::trace!("{:?}, {:?}", instance, name);

        // Do not return the driver function if the corresponding native function is not available.
        self.native
            .get_instance_proc_addr(instance, extensions::native_function_name(name))?;

        entry::instance_proc_addr(instance, name)
            .or_else(|| self.native.get_instance_proc_addr(instance, name))
    }

    unsafe fn get_physical_device_surface_capabilities2(
        &self,
        physical_device: vk::PhysicalDevice,
        surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
        capabilities: &mut vk::SurfaceCapabilities2KHR,
    ) -> VkResult<()> {
        log::trace!("{:?}, surface=0x{:x}", physical_device, surface_info.surface.as_raw());

        let record = self.surface(surface_info.surface)?;
        let native_info = vk::PhysicalDeviceSurfaceInfo2KHR {
            surface: record.native,
            ..*surface_info
        };

        let res = match self
            .native
            .get_surface_capabilities2(physical_device, &native_info, capabilities)
        {
            Some(res) => res,
            None => {
                // Until loaders exporting the 2 variant are common, emulate it.
                if !surface_info.p_next.is_null() || !capabilities.p_next.is_null() {
                    log::warn!(
                        "Emulating vkGetPhysicalDeviceSurfaceCapabilities2KHR with \
                         vkGetPhysicalDeviceSurfaceCapabilitiesKHR, pNext is ignored."
                    );
                }

                self.native.get_surface_capabilities(
                    physical_device,
                    record.native,
                    &mut capabilities.surface_capabilities,
                )
            }
        };

        res.result()?;
        self.update_caps(&record, &mut capabilities.surface_capabilities)?;
        Ok(())
    }

    unsafe fn get_physical_device_surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        log::trace!("{:?}, surface=0x{:x}", physical_device, surface.as_raw());

        let record = self.surface(surface)?;
        let mut capabilities = vk::SurfaceCapabilitiesKHR::default();

        self.native
            .get_surface_capabilities(physical_device, record.native, &mut capabilities)
            .result()?;
        self.update_caps(&record, &mut capabilities)?;

        Ok(capabilities)
    }

    unsafe fn get_physical_device_surface_formats2(
        &self,
        physical_device: vk::PhysicalDevice,
        surface_info: &vk::PhysicalDeviceSurfaceInfo2KHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormat2KHR,
    ) -> vk::Result {
        log::trace!(
            "{:?}, surface=0x{:x}, count {}, formats {:p}",
            physical_device,
            surface_info.surface.as_raw(),
            count,
            formats
        );

        let record = match self.valid_surface(surface_info.surface) {
            Ok(record) => record,
            Err(err) => return err.into(),
        };
        let native_info = vk::PhysicalDeviceSurfaceInfo2KHR {
            surface: record.native,
            ..*surface_info
        };

        if let Some(res) =
            self.native
                .get_surface_formats2(physical_device, &native_info, count, formats)
        {
            return res;
        }

        // Until loaders exporting the 2 variant are common, emulate it.
        if !surface_info.p_next.is_null() {
            log::warn!(
                "Emulating vkGetPhysicalDeviceSurfaceFormats2KHR with \
                 vkGetPhysicalDeviceSurfaceFormatsKHR, pNext is ignored."
            );
        }

        if formats.is_null() {
            return self
                .native
                .get_surface_formats(physical_device, record.native, count, ptr::null_mut());
        }

        let mut native_formats = Vec::new();
        if native_formats.try_reserve_exact(*count as usize).is_err() {
            return WsiError::OutOfHostMemory.into();
        }
        native_formats.resize(*count as usize, vk::SurfaceFormatKHR::default());

        let res = self.native.get_surface_formats(
            physical_device,
            record.native,
            count,
            native_formats.as_mut_ptr(),
        );
        if res == vk::Result::SUCCESS || res == vk::Result::INCOMPLETE {
            let formats = slice::from_raw_parts_mut(formats, *count as usize);
            for (format, native) in formats.iter_mut().zip(&native_formats) {
                format.surface_format = *native;
            }
        }

        res
    }

    unsafe fn get_physical_device_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        count: &mut u32,
        formats: *mut vk::SurfaceFormatKHR,
    ) -> vk::Result {
        log::trace!(
            "{:?}, surface=0x{:x}, count {}, formats {:p}",
            physical_device,
            surface.as_raw(),
            count,
            formats
        );

        let record = match self.valid_surface(surface) {
            Ok(record) => record,
            Err(err) => return err.into(),
        };

        self.native
            .get_surface_formats(physical_device, record.native, count, formats)
    }

    unsafe fn get_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        log::trace!(
            "{:?}, {}, surface=0x{:x}",
            physical_device,
            queue_family_index,
            surface.as_raw()
        );

        let record = self.valid_surface(surface)?;
        self.native
            .get_surface_support(physical_device, queue_family_index, record.native)
    }

    fn get_native_surface(&self, surface: vk::SurfaceKHR) -> vk::SurfaceKHR {
        self.surfaces
            .get(surface.as_raw())
            .map_or_else(vk::SurfaceKHR::null, |record| record.native)
    }
}

impl<N: NativeVulkan> fmt::Debug for WaylandVulkan<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaylandVulkan")
            .field("connected", &self.wayland().is_some())
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}
