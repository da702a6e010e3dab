//! Window surfaces known to the Wayland side of the driver.
//!
//! The window manager side registers a [`WindowSurface`] for every window that has a Wayland
//! counterpart and tears it down when the window is destroyed. Vulkan surfaces borrow the window's
//! client surface through a counted [`ClientRef`].

use std::{
    collections::{HashMap, HashSet},
    ffi::c_void,
    fmt,
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use ash::vk;
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex, RwLock};

/// A Win32 window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hwnd(usize);

impl Hwnd {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }
}

impl From<vk::HWND> for Hwnd {
    fn from(hwnd: vk::HWND) -> Self {
        Self(hwnd as usize)
    }
}

/// A window's client area in window coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Size in pixels. Inverted rectangles are empty.
    pub fn extent(&self) -> vk::Extent2D {
        let width = self.right.saturating_sub(self.left).max(0);
        let height = self.bottom.saturating_sub(self.top).max(0);

        vk::Extent2D {
            width: width as u32,
            height: height as u32,
        }
    }
}

/// A `wl_display` connection.
///
/// The pointer is only handed to the native Vulkan driver, never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WlDisplay(NonNull<c_void>);

/// A `wl_surface`.
///
/// The pointer is only handed to the native Vulkan driver and the [`ClientSurfaceProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WlSurface(NonNull<c_void>);

// SAFETY: libwayland proxies may be passed between threads, and this crate never dereferences them.
unsafe impl Send for WlDisplay {}
unsafe impl Sync for WlDisplay {}
unsafe impl Send for WlSurface {}
unsafe impl Sync for WlSurface {}

impl WlDisplay {
    /// # Safety
    ///
    /// `ptr` must be a `wl_display` that stays connected for the rest of the process.
    pub unsafe fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut vk::wl_display {
        self.0.as_ptr().cast()
    }
}

impl WlSurface {
    /// # Safety
    ///
    /// `ptr` must be a `wl_surface` that stays alive until
    /// [`ClientSurfaceProvider::destroy_client_surface`] is called for it.
    pub unsafe fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut vk::wl_surface {
        self.0.as_ptr().cast()
    }
}

/// Creates and destroys the compositor surfaces that back a window's client area.
pub trait ClientSurfaceProvider: Send + Sync {
    fn create_client_surface(&self, hwnd: Hwnd) -> Option<WlSurface>;

    fn destroy_client_surface(&self, hwnd: Hwnd, surface: WlSurface);
}

/// The compositor surface drawn into by Vulkan for one window.
///
/// The `wl_surface` is destroyed through the provider once neither the window nor any [`ClientRef`]
/// holds on to it.
pub struct ClientSurface {
    hwnd: Hwnd,
    wl_surface: WlSurface,
    refs: AtomicUsize,
    provider: Arc<dyn ClientSurfaceProvider>,
}

impl ClientSurface {
    pub fn hwnd(&self) -> Hwnd {
        self.hwnd
    }

    pub fn wl_surface(&self) -> WlSurface {
        self.wl_surface
    }

    /// Number of live [`ClientRef`]s.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ClientSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSurface")
            .field("hwnd", &self.hwnd)
            .field("wl_surface", &self.wl_surface)
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}

impl Drop for ClientSurface {
    fn drop(&mut self) {
        self.provider
            .destroy_client_surface(self.hwnd, self.wl_surface);
    }
}

/// A counted reference to a [`ClientSurface`].
///
/// [`ClientRef::release`] reports whether it dropped the last reference. Dropping an unreleased
/// reference releases it silently.
#[derive(Debug)]
pub struct ClientRef {
    surface: Arc<ClientSurface>,
    released: AtomicBool,
}

impl ClientRef {
    fn acquire(surface: &Arc<ClientSurface>) -> Self {
        surface.refs.fetch_add(1, Ordering::AcqRel);
        Self {
            surface: Arc::clone(surface),
            released: AtomicBool::new(false),
        }
    }

    pub fn surface(&self) -> &Arc<ClientSurface> {
        &self.surface
    }

    pub fn hwnd(&self) -> Hwnd {
        self.surface.hwnd
    }

    /// Gives up the reference, returning `true` if it was the last one.
    ///
    /// Only the first call on a reference has any effect.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.surface.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl Drop for ClientRef {
    fn drop(&mut self) {
        self.release();
    }
}

/// Wayland state of one window.
pub struct WindowSurface {
    hwnd: Hwnd,
    client_rect: Rect,
    client: Option<Arc<ClientSurface>>,
    destroyed: bool,
    provider: Arc<dyn ClientSurfaceProvider>,
}

impl WindowSurface {
    pub fn hwnd(&self) -> Hwnd {
        self.hwnd
    }

    pub fn client_rect(&self) -> Rect {
        self.client_rect
    }

    pub fn set_client_rect(&mut self, rect: Rect) {
        self.client_rect = rect;
    }

    /// The client surface currently attached to the window.
    pub fn client(&self) -> Option<&Arc<ClientSurface>> {
        self.client.as_ref()
    }

    /// Returns a reference to the window's client surface, creating one if none is attached.
    pub fn get_client(&mut self) -> Option<ClientRef> {
        if self.client.is_none() {
            let wl_surface = self.provider.create_client_surface(self.hwnd)?;
            self.client = Some(Arc::new(ClientSurface {
                hwnd: self.hwnd,
                wl_surface,
                refs: AtomicUsize::new(0),
                provider: Arc::clone(&self.provider),
            }));
        }

        self.client.as_ref().map(ClientRef::acquire)
    }

    /// Drops the window's back-reference to its client surface.
    pub fn detach_client(&mut self) -> Option<Arc<ClientSurface>> {
        self.client.take()
    }
}

impl fmt::Debug for WindowSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowSurface")
            .field("hwnd", &self.hwnd)
            .field("client_rect", &self.client_rect)
            .field("client", &self.client)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

/// A locked [`WindowSurface`]. The lock is released on drop.
pub type WindowSurfaceGuard = ArcMutexGuard<RawMutex, WindowSurface>;

#[derive(Default)]
struct Windows {
    live: HashMap<Hwnd, Arc<Mutex<WindowSurface>>>,
    retired: HashSet<Hwnd>,
}

/// All window surfaces of the process, keyed by window handle.
///
/// Window handles are retired on destruction: once a handle stops resolving it never resolves again.
pub struct SurfaceRegistry {
    windows: RwLock<Windows>,
    provider: Arc<dyn ClientSurfaceProvider>,
}

impl SurfaceRegistry {
    pub fn new(provider: Arc<dyn ClientSurfaceProvider>) -> Self {
        Self {
            windows: RwLock::new(Windows::default()),
            provider,
        }
    }

    /// Registers the Wayland surface of a new window.
    ///
    /// Returns `false` if `hwnd` is already registered or was destroyed before.
    pub fn create_window_surface(&self, hwnd: Hwnd, client_rect: Rect) -> bool {
        let mut windows = self.windows.write();

        if windows.retired.contains(&hwnd) || windows.live.contains_key(&hwnd) {
            log::warn!("refusing to register window surface for hwnd={:#x}", hwnd.0);
            return false;
        }

        windows.live.insert(
            hwnd,
            Arc::new(Mutex::new(WindowSurface {
                hwnd,
                client_rect,
                client: None,
                destroyed: false,
                provider: Arc::clone(&self.provider),
            })),
        );

        log::debug!("registered window surface hwnd={:#x}", hwnd.0);
        true
    }

    /// Tears down the window surface of `hwnd`.
    ///
    /// Client surfaces still referenced by Vulkan surfaces stay alive until those are destroyed.
    pub fn destroy_window_surface(&self, hwnd: Hwnd) -> bool {
        let surface = {
            let mut windows = self.windows.write();
            let surface = windows.live.remove(&hwnd);
            windows.retired.insert(hwnd);
            surface
        };

        let surface = match surface {
            Some(surface) => surface,
            None => return false,
        };

        let mut surface = surface.lock();
        surface.destroyed = true;
        surface.client = None;

        log::debug!("destroyed window surface hwnd={:#x}", hwnd.0);
        true
    }

    /// Locks the window surface of `hwnd`.
    pub fn lock_hwnd(&self, hwnd: Hwnd) -> Option<WindowSurfaceGuard> {
        let surface = self.windows.read().live.get(&hwnd).cloned()?;
        let guard = surface.lock_arc();

        // Destroyed between the lookup and the lock.
        if guard.destroyed {
            return None;
        }

        Some(guard)
    }
}

impl fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let windows = self.windows.read();
        f.debug_struct("SurfaceRegistry")
            .field("live", &windows.live.len())
            .field("retired", &windows.retired.len())
            .finish_non_exhaustive()
    }
}

/// Process-wide Wayland state shared with the Vulkan driver.
#[derive(Debug)]
pub struct ProcessWayland {
    display: WlDisplay,
    registry: Arc<SurfaceRegistry>,
}

impl ProcessWayland {
    pub fn new(display: WlDisplay, registry: Arc<SurfaceRegistry>) -> Self {
        Self { display, registry }
    }

    pub fn display(&self) -> WlDisplay {
        self.display
    }

    pub fn registry(&self) -> &Arc<SurfaceRegistry> {
        &self.registry
    }
}

static PROCESS_WAYLAND: OnceLock<ProcessWayland> = OnceLock::new();

/// Publishes the process's display connection and window registry.
///
/// Only the first call has an effect; later calls return the state already published.
pub fn connect(display: WlDisplay, registry: Arc<SurfaceRegistry>) -> &'static ProcessWayland {
    let mut installed = false;
    let process = PROCESS_WAYLAND.get_or_init(|| {
        installed = true;
        ProcessWayland::new(display, registry)
    });

    if !installed {
        log::warn!("wayland display already connected, keeping the first connection");
    }

    process
}

/// The state published by [`connect`], if any.
pub fn process_wayland() -> Option<&'static ProcessWayland> {
    PROCESS_WAYLAND.get()
}
