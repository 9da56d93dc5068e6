//! Descriptor store interface consumed by the lifecycle layer

use std::fmt;

use thiserror::Error;

use super::attrs::{AttributeSnapshot, GadgetAttr};
use super::strings::{GadgetStr, GadgetStrings};

/// Failure class reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    Exists,
    Busy,
    InvalidValue,
    NotEmpty,
    Io,
}

impl BackendErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendErrorKind::NotFound => "not found",
            BackendErrorKind::Exists => "already exists",
            BackendErrorKind::Busy => "busy",
            BackendErrorKind::InvalidValue => "invalid value",
            BackendErrorKind::NotEmpty => "not empty",
            BackendErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a backend primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({kind})")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Exists, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Busy, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidValue, message)
    }

    pub fn not_empty(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotEmpty, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Io, message)
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Check a gadget or controller name
///
/// Names are single directory entries: empty names, `.`, `..` and anything
/// containing `/` are rejected.
pub fn validate_name(name: &str) -> BackendResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(BackendError::invalid(format!("invalid name '{}'", name)));
    }
    Ok(())
}

/// Reference to a gadget known to a backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GadgetHandle {
    name: String,
}

impl GadgetHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Reference to a USB device controller (UDC)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerHandle {
    name: String,
}

impl ControllerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Persistent gadget descriptor store
///
/// Implementations own uniqueness of gadget names, range checks on attribute
/// values and the one-gadget-per-controller rule. No locking is expected:
/// callers serialize access to a store.
pub trait GadgetBackend: Send + Sync {
    /// Create an empty gadget
    fn create_gadget(&self, name: &str) -> BackendResult<GadgetHandle>;

    /// Remove a gadget; `recursive` also removes configs and functions it owns
    fn remove_gadget(&self, gadget: &GadgetHandle, recursive: bool) -> BackendResult<()>;

    fn get_gadget(&self, name: &str) -> Option<GadgetHandle>;

    /// All gadgets; order carries no meaning beyond first/only checks
    fn list_gadgets(&self) -> BackendResult<Vec<GadgetHandle>>;

    fn set_attribute(&self, gadget: &GadgetHandle, attr: GadgetAttr, value: u16)
        -> BackendResult<()>;

    fn get_attributes(&self, gadget: &GadgetHandle) -> BackendResult<AttributeSnapshot>;

    fn set_string(
        &self,
        gadget: &GadgetHandle,
        field: GadgetStr,
        lang: u16,
        value: &str,
    ) -> BackendResult<()>;

    fn get_strings(&self, gadget: &GadgetHandle, lang: u16) -> BackendResult<GadgetStrings>;

    /// Bind a gadget; `None` lets the backend pick a controller
    fn enable_gadget(
        &self,
        gadget: &GadgetHandle,
        udc: Option<&ControllerHandle>,
    ) -> BackendResult<()>;

    /// Unbind a gadget; unbinding an unbound gadget is a no-op
    fn disable_gadget(&self, gadget: &GadgetHandle) -> BackendResult<()>;

    fn get_gadget_controller(&self, gadget: &GadgetHandle) -> Option<ControllerHandle>;

    fn get_controller(&self, name: &str) -> Option<ControllerHandle>;

    fn get_controller_gadget(&self, udc: &ControllerHandle) -> Option<GadgetHandle>;

    fn list_controllers(&self) -> BackendResult<Vec<ControllerHandle>>;
}
