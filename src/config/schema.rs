use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::gadget::configfs::{CONFIGFS_PATH, UDC_CLASS_PATH};

/// Settings read once at process start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Gadget used when a command names none and more than one exists
    pub default_gadget: Option<String>,
    /// ConfigFS gadget root (e.g., /sys/kernel/config/usb_gadget)
    pub configfs_path: PathBuf,
    /// UDC class directory (e.g., /sys/class/udc)
    pub udc_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_gadget: None,
            configfs_path: PathBuf::from(CONFIGFS_PATH),
            udc_path: PathBuf::from(UDC_CLASS_PATH),
        }
    }
}

impl Settings {
    /// Apply environment overrides, looking variables up through `var`
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = var(super::ENV_DEFAULT_GADGET).filter(|s| !s.is_empty()) {
            self.default_gadget = Some(name);
        }
    }
}
