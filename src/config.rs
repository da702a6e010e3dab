use std::{env, ffi::OsString};

/// Overrides the native Vulkan library.
pub const LIBRARY_ENV: &str = "WAYLAND_WSI_VULKAN_LIBRARY";

/// `env_logger` filter for the driver's diagnostics.
pub const LOG_ENV: &str = "WAYLAND_WSI_LOG";

/// soname of the system Vulkan loader.
pub const DEFAULT_LIBRARY: &str = "libvulkan.so.1";

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Settings read once when the driver is first requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Library the native entry points are resolved from.
    pub library: OsString,

    pub log_filter: String,
}

impl DriverConfig {
    pub fn from_env() -> Self {
        Self::from_vars(env::var_os(LIBRARY_ENV), env::var(LOG_ENV).ok())
    }

    fn from_vars(library: Option<OsString>, log_filter: Option<String>) -> Self {
        let default = Self::default();

        Self {
            library: library
                .filter(|library| !library.is_empty())
                .unwrap_or(default.library),
            log_filter: log_filter
                .filter(|filter| !filter.trim().is_empty())
                .unwrap_or(default.log_filter),
        }
    }

    /// Installs `env_logger` with this configuration's filter.
    ///
    /// Does nothing if the host process already installed a logger.
    pub fn init_logging(&self) {
        let _ = env_logger::Builder::new()
            .parse_filters(&self.log_filter)
            .try_init();
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            library: OsString::from(DEFAULT_LIBRARY),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{DriverConfig, DEFAULT_LIBRARY, DEFAULT_LOG_FILTER};

    #[test]
    fn defaults_to_system_loader() {
        let config = DriverConfig::from_vars(None, None);
        assert_eq!(config.library, OsString::from(DEFAULT_LIBRARY));
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = DriverConfig::from_vars(Some(OsString::new()), Some("  ".into()));
        assert_eq!(config, DriverConfig::default());
    }

    #[test]
    fn overrides_are_used() {
        let config = DriverConfig::from_vars(
            Some("/opt/vulkan/libvulkan.so".into()),
            Some("wayland_win32_wsi=trace".into()),
        );
        assert_eq!(config.library, OsString::from("/opt/vulkan/libvulkan.so"));
        assert_eq!(config.log_filter, "wayland_win32_wsi=trace");
    }

    #[test]
    fn logging_can_be_initialized_twice() {
        let config = DriverConfig::default();
        config.init_logging();
        config.init_logging();
    }
}
