//! ConfigFS-backed descriptor store
//!
//! Layout under the gadget root (normally `/sys/kernel/config/usb_gadget`):
//! ```text
//! <gadget>/
//!     idVendor, idProduct, bcdUSB, ...   device attributes
//!     strings/0x409/{manufacturer,product,serialnumber}
//!     configs/<c.N>/                     function links + strings/<lang>
//!     functions/<type.instance>/
//!     UDC                                bound controller name, empty if unbound
//! ```
//! Controllers are the entries of the UDC class directory (`/sys/class/udc`).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::attrs::{parse_number, AttributeSnapshot, GadgetAttr};
use super::backend::{
    validate_name, BackendError, BackendErrorKind, BackendResult, ControllerHandle, GadgetBackend,
    GadgetHandle,
};
use super::strings::{lang_dir, GadgetStr, GadgetStrings};

/// ConfigFS base path for USB gadgets
pub const CONFIGFS_PATH: &str = "/sys/kernel/config/usb_gadget";

/// Sysfs class directory listing UDCs
pub const UDC_CLASS_PATH: &str = "/sys/class/udc";

const UDC_FILE: &str = "UDC";

fn io_error(op: &str, path: &Path, e: io::Error) -> BackendError {
    let kind = match e.raw_os_error() {
        Some(libc::EEXIST) => BackendErrorKind::Exists,
        Some(libc::ENOENT) | Some(libc::ENODEV) => BackendErrorKind::NotFound,
        Some(libc::EBUSY) => BackendErrorKind::Busy,
        Some(libc::EINVAL) | Some(libc::ERANGE) => BackendErrorKind::InvalidValue,
        Some(libc::ENOTEMPTY) => BackendErrorKind::NotEmpty,
        _ => BackendErrorKind::Io,
    };
    BackendError::new(kind, format!("Failed to {} {}: {}", op, path.display(), e))
}

/// Open an attribute for writing
///
/// Regular files are truncated so a shorter value leaves no stale tail. If the
/// truncating open is refused (write-only sysfs attributes), plain O_WRONLY is
/// used. Missing files are created, as on a plain directory tree.
fn open_for_write(path: &Path) -> io::Result<File> {
    match path.metadata() {
        Ok(meta) if meta.is_file() => OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .or_else(|_| OpenOptions::new().write(true).open(path)),
        Ok(_) => OpenOptions::new().write(true).open(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => File::create(path),
        Err(e) => Err(e),
    }
}

/// Write string content to a configfs attribute
///
/// The kernel handles the value on the first write() call, so the whole
/// buffer (including the trailing newline) goes out in one syscall.
pub fn write_file(path: &Path, content: &str) -> BackendResult<()> {
    let mut file = open_for_write(path).map_err(|e| io_error("open", path, e))?;

    let data: std::borrow::Cow<[u8]> = if content.ends_with('\n') {
        content.as_bytes().into()
    } else {
        let mut buf = content.as_bytes().to_vec();
        buf.push(b'\n');
        buf.into()
    };

    file.write_all(&data)
        .map_err(|e| io_error("write to", path, e))?;
    file.flush().map_err(|e| io_error("flush", path, e))?;

    Ok(())
}

/// Read string content from a configfs attribute
pub fn read_file(path: &Path) -> BackendResult<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| io_error("read", path, e))
}

/// Create directory if not exists
pub fn create_dir(path: &Path) -> BackendResult<()> {
    fs::create_dir_all(path).map_err(|e| io_error("create directory", path, e))
}

/// Remove directory
pub fn remove_dir(path: &Path) -> BackendResult<()> {
    if path.exists() {
        fs::remove_dir(path).map_err(|e| io_error("remove directory", path, e))?;
    }
    Ok(())
}

/// Remove file or symlink
pub fn remove_file(path: &Path) -> BackendResult<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path).map_err(|e| io_error("remove file", path, e))?;
    }
    Ok(())
}

/// Sorted entry names of a directory; a missing directory has none
fn list_dir(path: &Path) -> BackendResult<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = fs::read_dir(path)
        .map_err(|e| io_error("read directory", path, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    Ok(names)
}

/// Remove a group directory that only holds what the kernel created with its parent
///
/// On configfs these default groups cannot be removed and go away with the
/// parent, so failures are only logged.
fn remove_default_group(path: &Path) {
    if path.is_dir() {
        if let Err(e) = fs::remove_dir(path) {
            debug!("Left default group {}: {}", path.display(), e);
        }
    }
}

/// Remove every symlink directly inside a directory
fn remove_links(path: &Path) -> BackendResult<()> {
    for entry in list_dir(path)? {
        let entry_path = path.join(entry);
        if is_symlink(&entry_path) {
            remove_file(&entry_path)?;
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Descriptor store on a mounted configfs
#[derive(Debug, Clone)]
pub struct ConfigfsBackend {
    gadget_root: PathBuf,
    udc_root: PathBuf,
}

impl ConfigfsBackend {
    pub fn new(gadget_root: impl Into<PathBuf>, udc_root: impl Into<PathBuf>) -> Self {
        Self {
            gadget_root: gadget_root.into(),
            udc_root: udc_root.into(),
        }
    }

    /// Check if ConfigFS is available
    pub fn is_available(&self) -> bool {
        self.gadget_root.exists()
    }

    fn gadget_path(&self, gadget: &GadgetHandle) -> PathBuf {
        self.gadget_root.join(gadget.name())
    }

    /// Find the first available UDC
    fn find_udc(&self) -> Option<String> {
        list_dir(&self.udc_root).ok()?.into_iter().next()
    }

    /// Controller currently named in the gadget's UDC file
    fn bound_udc(&self, gadget_path: &Path) -> Option<String> {
        let udc_file = gadget_path.join(UDC_FILE);
        fs::read_to_string(udc_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Remove every config of a gadget: function links, config strings, the config itself
    fn remove_configs(&self, gadget_path: &Path) -> BackendResult<()> {
        let configs_path = gadget_path.join("configs");
        for config in list_dir(&configs_path)? {
            let config_path = configs_path.join(&config);
            remove_links(&config_path)?;

            let strings_path = config_path.join("strings");
            for lang in list_dir(&strings_path)? {
                remove_dir(&strings_path.join(lang))?;
            }
            remove_default_group(&strings_path);

            remove_dir(&config_path)?;
            debug!("Removed config {}", config);
        }
        Ok(())
    }

    /// Remove every function of a gadget, including extra mass storage LUNs
    fn remove_functions(&self, gadget_path: &Path) -> BackendResult<()> {
        let functions_path = gadget_path.join("functions");
        for function in list_dir(&functions_path)? {
            let function_path = functions_path.join(&function);
            for entry in list_dir(&function_path)? {
                // lun.0 is created by the kernel and goes away with the function
                if entry.starts_with("lun.") && entry != "lun.0" {
                    remove_dir(&function_path.join(entry))?;
                }
            }
            remove_dir(&function_path)?;
            debug!("Removed function {}", function);
        }
        Ok(())
    }
}

impl Default for ConfigfsBackend {
    fn default() -> Self {
        Self::new(CONFIGFS_PATH, UDC_CLASS_PATH)
    }
}

impl GadgetBackend for ConfigfsBackend {
    fn create_gadget(&self, name: &str) -> BackendResult<GadgetHandle> {
        validate_name(name)?;
        if !self.is_available() {
            return Err(BackendError::not_found(format!(
                "ConfigFS not available at {}. Is it mounted?",
                self.gadget_root.display()
            )));
        }

        let path = self.gadget_root.join(name);
        fs::create_dir(&path).map_err(|e| io_error("create gadget", &path, e))?;
        debug!("Created gadget directory {}", path.display());
        Ok(GadgetHandle::new(name))
    }

    fn remove_gadget(&self, gadget: &GadgetHandle, recursive: bool) -> BackendResult<()> {
        let path = self.gadget_path(gadget);
        if !path.is_dir() {
            return Err(BackendError::not_found(format!(
                "gadget {} does not exist",
                gadget.name()
            )));
        }
        if let Some(udc) = self.bound_udc(&path) {
            return Err(BackendError::busy(format!(
                "gadget {} is bound to {}",
                gadget.name(),
                udc
            )));
        }

        if recursive {
            // os_desc links point at configs, drop them first
            remove_links(&path.join("os_desc"))?;
            self.remove_configs(&path)?;
            self.remove_functions(&path)?;
        } else if !list_dir(&path.join("configs"))?.is_empty()
            || !list_dir(&path.join("functions"))?.is_empty()
        {
            return Err(BackendError::not_empty(format!(
                "gadget {} still has configs or functions",
                gadget.name()
            )));
        }

        let strings_path = path.join("strings");
        for lang in list_dir(&strings_path)? {
            remove_dir(&strings_path.join(lang))?;
        }
        for group in ["configs", "functions", "strings", "os_desc"] {
            remove_default_group(&path.join(group));
        }

        remove_dir(&path)?;
        debug!("Removed gadget directory {}", path.display());
        Ok(())
    }

    fn get_gadget(&self, name: &str) -> Option<GadgetHandle> {
        validate_name(name).ok()?;
        self.gadget_root
            .join(name)
            .is_dir()
            .then(|| GadgetHandle::new(name))
    }

    fn list_gadgets(&self) -> BackendResult<Vec<GadgetHandle>> {
        Ok(list_dir(&self.gadget_root)?
            .into_iter()
            .filter(|name| self.gadget_root.join(name).is_dir())
            .map(GadgetHandle::new)
            .collect())
    }

    fn set_attribute(
        &self,
        gadget: &GadgetHandle,
        attr: GadgetAttr,
        value: u16,
    ) -> BackendResult<()> {
        if !attr.accepts(value) {
            return Err(BackendError::invalid(format!(
                "{:#x} out of range for {}",
                value, attr
            )));
        }
        write_file(
            &self.gadget_path(gadget).join(attr.name()),
            &attr.format_raw(value),
        )
    }

    fn get_attributes(&self, gadget: &GadgetHandle) -> BackendResult<AttributeSnapshot> {
        let path = self.gadget_path(gadget);
        let mut snapshot = AttributeSnapshot::default();

        for attr in GadgetAttr::ALL {
            let file = path.join(attr.name());
            let raw = read_file(&file)?;
            let value = parse_number(&raw)
                .filter(|v| *v <= attr.max() as u64)
                .ok_or_else(|| {
                    BackendError::io(format!("Unexpected content '{}' in {}", raw, file.display()))
                })?;
            snapshot.set(attr, value as u16);
        }

        Ok(snapshot)
    }

    fn set_string(
        &self,
        gadget: &GadgetHandle,
        field: GadgetStr,
        lang: u16,
        value: &str,
    ) -> BackendResult<()> {
        let strings_path = self.gadget_path(gadget).join("strings").join(lang_dir(lang));
        create_dir(&strings_path)?;
        write_file(&strings_path.join(field.name()), value)
    }

    fn get_strings(&self, gadget: &GadgetHandle, lang: u16) -> BackendResult<GadgetStrings> {
        let strings_path = self.gadget_path(gadget).join("strings").join(lang_dir(lang));
        let mut strings = GadgetStrings::default();

        for field in GadgetStr::ALL {
            let file = strings_path.join(field.name());
            if !file.exists() {
                continue;
            }
            let value = read_file(&file)?;
            if !value.is_empty() {
                strings.set(field, value);
            }
        }

        Ok(strings)
    }

    fn enable_gadget(
        &self,
        gadget: &GadgetHandle,
        udc: Option<&ControllerHandle>,
    ) -> BackendResult<()> {
        let path = self.gadget_path(gadget);
        if let Some(current) = self.bound_udc(&path) {
            return Err(BackendError::busy(format!(
                "gadget {} already bound to {}",
                gadget.name(),
                current
            )));
        }

        let udc = match udc {
            Some(u) => u.name().to_string(),
            None => self
                .find_udc()
                .ok_or_else(|| BackendError::not_found("No USB Device Controller (UDC) found"))?,
        };

        if let Some(other) = self.get_controller_gadget(&ControllerHandle::new(&udc)) {
            return Err(BackendError::busy(format!(
                "UDC {} in use by gadget {}",
                udc,
                other.name()
            )));
        }

        debug!("Binding gadget {} to UDC {}", gadget.name(), udc);
        write_file(&path.join(UDC_FILE), &udc)
    }

    fn disable_gadget(&self, gadget: &GadgetHandle) -> BackendResult<()> {
        let path = self.gadget_path(gadget);
        if self.bound_udc(&path).is_some() {
            write_file(&path.join(UDC_FILE), "")?;
            debug!("Unbound gadget {}", gadget.name());
        }
        Ok(())
    }

    fn get_gadget_controller(&self, gadget: &GadgetHandle) -> Option<ControllerHandle> {
        self.bound_udc(&self.gadget_path(gadget))
            .map(ControllerHandle::new)
    }

    fn get_controller(&self, name: &str) -> Option<ControllerHandle> {
        validate_name(name).ok()?;
        self.udc_root
            .join(name)
            .exists()
            .then(|| ControllerHandle::new(name))
    }

    fn get_controller_gadget(&self, udc: &ControllerHandle) -> Option<GadgetHandle> {
        let gadgets = match self.list_gadgets() {
            Ok(gadgets) => gadgets,
            Err(e) => {
                warn!("Failed to list gadgets: {}", e);
                return None;
            }
        };

        gadgets
            .into_iter()
            .find(|g| self.bound_udc(&self.gadget_path(g)).as_deref() == Some(udc.name()))
    }

    fn list_controllers(&self) -> BackendResult<Vec<ControllerHandle>> {
        Ok(list_dir(&self.udc_root)?
            .into_iter()
            .map(ControllerHandle::new)
            .collect())
    }
}
