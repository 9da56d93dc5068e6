//! Localized string descriptors of a gadget

use std::fmt;

use serde::{Deserialize, Serialize};

use super::backend::{BackendResult, GadgetBackend, GadgetHandle};

/// US English language id
pub const LANG_US_ENG: u16 = 0x0409;

/// Number of string fields in the table
pub const STR_COUNT: usize = 3;

/// Gadget string field, declared in table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GadgetStr {
    Manufacturer,
    Product,
    SerialNumber,
}

/// Setter capability bound to one string field
pub type StrSetFn = fn(&dyn GadgetBackend, &GadgetHandle, u16, &str) -> BackendResult<()>;

/// Entry of the string descriptor table
pub struct GadgetStrDesc {
    pub field: GadgetStr,
    pub name: &'static str,
    pub set_fn: StrSetFn,
}

fn set_manufacturer(
    backend: &dyn GadgetBackend,
    gadget: &GadgetHandle,
    lang: u16,
    value: &str,
) -> BackendResult<()> {
    backend.set_string(gadget, GadgetStr::Manufacturer, lang, value)
}

fn set_product(
    backend: &dyn GadgetBackend,
    gadget: &GadgetHandle,
    lang: u16,
    value: &str,
) -> BackendResult<()> {
    backend.set_string(gadget, GadgetStr::Product, lang, value)
}

fn set_serial_number(
    backend: &dyn GadgetBackend,
    gadget: &GadgetHandle,
    lang: u16,
    value: &str,
) -> BackendResult<()> {
    backend.set_string(gadget, GadgetStr::SerialNumber, lang, value)
}

/// String descriptor table, in table order
pub static GADGET_STRS: [GadgetStrDesc; STR_COUNT] = [
    GadgetStrDesc {
        field: GadgetStr::Manufacturer,
        name: "manufacturer",
        set_fn: set_manufacturer,
    },
    GadgetStrDesc {
        field: GadgetStr::Product,
        name: "product",
        set_fn: set_product,
    },
    GadgetStrDesc {
        field: GadgetStr::SerialNumber,
        name: "serialnumber",
        set_fn: set_serial_number,
    },
];

impl GadgetStr {
    pub const ALL: [GadgetStr; STR_COUNT] = [
        GadgetStr::Manufacturer,
        GadgetStr::Product,
        GadgetStr::SerialNumber,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn desc(self) -> &'static GadgetStrDesc {
        &GADGET_STRS[self.index()]
    }

    /// Field name, also the configfs file name
    pub fn name(self) -> &'static str {
        self.desc().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        GADGET_STRS.iter().find(|d| d.name == name).map(|d| d.field)
    }

    /// Set this field through its setter capability
    pub fn apply(
        self,
        backend: &dyn GadgetBackend,
        gadget: &GadgetHandle,
        lang: u16,
        value: &str,
    ) -> BackendResult<()> {
        (self.desc().set_fn)(backend, gadget, lang, value)
    }
}

impl fmt::Display for GadgetStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// String descriptors of one gadget under one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GadgetStrings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(rename = "serialnumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl GadgetStrings {
    pub fn get(&self, field: GadgetStr) -> Option<&str> {
        match field {
            GadgetStr::Manufacturer => self.manufacturer.as_deref(),
            GadgetStr::Product => self.product.as_deref(),
            GadgetStr::SerialNumber => self.serial_number.as_deref(),
        }
    }

    pub fn set(&mut self, field: GadgetStr, value: impl Into<String>) {
        let slot = match field {
            GadgetStr::Manufacturer => &mut self.manufacturer,
            GadgetStr::Product => &mut self.product,
            GadgetStr::SerialNumber => &mut self.serial_number,
        };
        *slot = Some(value.into());
    }
}

/// Directory name of a language under `strings/`
pub fn lang_dir(lang: u16) -> String {
    format!("0x{:x}", lang)
}
