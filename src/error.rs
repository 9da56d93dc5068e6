use thiserror::Error;

use crate::gadget::attrs::GadgetAttr;
use crate::gadget::backend::BackendError;
use crate::gadget::strings::GadgetStr;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum GadgetError {
    #[error("Gadget '{0}' not found")]
    GadgetNotFound(String),

    #[error("UDC '{0}' not found")]
    ControllerNotFound(String),

    #[error("Gadget '{0}' already exists")]
    NameConflict(String),

    #[error("Unable to set attribute {attr}: {source}")]
    AttributeRejected {
        attr: GadgetAttr,
        #[source]
        source: BackendError,
    },

    #[error("Unable to set string {field}: {source}")]
    StringRejected {
        field: GadgetStr,
        #[source]
        source: BackendError,
    },

    #[error("Gadget '{0}' is enabled, disable it first or use --force option")]
    StillEnabled(String),

    #[error("Error on disable gadget '{gadget}': {source}")]
    DisableFailed {
        gadget: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to enable gadget '{gadget}': {source}")]
    BindConflict {
        gadget: String,
        #[source]
        source: BackendError,
    },

    #[error("Gadget not specified and no implicit gadget could be selected")]
    AmbiguousGadget,

    #[error("No gadget enabled on UDC '{0}'")]
    NoGadgetBound(String),

    #[error("Backend error on {op}: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GadgetError {
    /// Wrap a backend failure with the name of the operation that hit it
    pub fn backend(op: &'static str, source: BackendError) -> Self {
        Self::Backend { op, source }
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, GadgetError>;
