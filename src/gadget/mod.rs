//! USB gadget descriptor management
//!
//! Architecture:
//! ```text
//! GadgetManager (lifecycle: create / rm / enable / disable / get)
//!     ├── GadgetResolver (implicit gadget selection)
//!     ├── GadgetAttr / GADGET_STRS (closed descriptor tables)
//!     └── dyn GadgetBackend (descriptor store)
//!             ├── ConfigfsBackend (/sys/kernel/config/usb_gadget)
//!             └── MemoryBackend (in-process)
//! ```

pub mod attrs;
pub mod backend;
pub mod configfs;
pub mod lifecycle;
pub mod memory;
pub mod resolver;
pub mod strings;

pub use attrs::{AttrMask, AttributeSnapshot, GadgetAttr};
pub use backend::{
    validate_name, BackendError, BackendErrorKind, ControllerHandle, GadgetBackend, GadgetHandle,
};
pub use configfs::ConfigfsBackend;
pub use lifecycle::{
    ControllerSummary, CreateRequest, DisableRequest, EnableRequest, GadgetManager,
    GadgetSummary, GetRequest, RemoveRequest,
};
pub use memory::MemoryBackend;
pub use resolver::GadgetResolver;
pub use strings::{GadgetStr, GadgetStrings, LANG_US_ENG};
