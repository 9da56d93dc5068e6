//! Device-level descriptor attributes of a gadget
//!
//! The table is closed and ordered: `GadgetAttr::ALL` lists every attribute
//! in ascending id order, and every place that applies or prints attributes
//! walks that order rather than the order a caller supplied them in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GadgetError, Result};

/// Number of attributes in the table
pub const ATTR_COUNT: usize = 8;

/// Storage width of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrWidth {
    Byte,
    Word,
}

/// Device descriptor attribute, declared in ascending id order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GadgetAttr {
    /// USB specification release (BCD)
    BcdUsb,
    BDeviceClass,
    BDeviceSubClass,
    BDeviceProtocol,
    /// Max packet size of endpoint 0
    BMaxPacketSize0,
    IdVendor,
    IdProduct,
    /// Device release number (BCD)
    BcdDevice,
}

impl GadgetAttr {
    /// All attributes, ascending id order
    pub const ALL: [GadgetAttr; ATTR_COUNT] = [
        GadgetAttr::BcdUsb,
        GadgetAttr::BDeviceClass,
        GadgetAttr::BDeviceSubClass,
        GadgetAttr::BDeviceProtocol,
        GadgetAttr::BMaxPacketSize0,
        GadgetAttr::IdVendor,
        GadgetAttr::IdProduct,
        GadgetAttr::BcdDevice,
    ];

    /// Position in the table
    pub fn index(self) -> usize {
        self as usize
    }

    /// Descriptor field name, also the configfs file name
    pub fn name(self) -> &'static str {
        match self {
            GadgetAttr::BcdUsb => "bcdUSB",
            GadgetAttr::BDeviceClass => "bDeviceClass",
            GadgetAttr::BDeviceSubClass => "bDeviceSubClass",
            GadgetAttr::BDeviceProtocol => "bDeviceProtocol",
            GadgetAttr::BMaxPacketSize0 => "bMaxPacketSize0",
            GadgetAttr::IdVendor => "idVendor",
            GadgetAttr::IdProduct => "idProduct",
            GadgetAttr::BcdDevice => "bcdDevice",
        }
    }

    /// Look up an attribute by its descriptor field name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn width(self) -> AttrWidth {
        match self {
            GadgetAttr::BcdUsb
            | GadgetAttr::IdVendor
            | GadgetAttr::IdProduct
            | GadgetAttr::BcdDevice => AttrWidth::Word,
            GadgetAttr::BDeviceClass
            | GadgetAttr::BDeviceSubClass
            | GadgetAttr::BDeviceProtocol
            | GadgetAttr::BMaxPacketSize0 => AttrWidth::Byte,
        }
    }

    /// Largest value the attribute accepts
    pub fn max(self) -> u16 {
        match self.width() {
            AttrWidth::Byte => u8::MAX as u16,
            AttrWidth::Word => u16::MAX,
        }
    }

    /// Whether `value` fits the attribute's range
    pub fn accepts(self, value: u16) -> bool {
        value <= self.max()
    }

    /// Human-readable rendering of a value
    pub fn format(self, value: u16) -> String {
        match self {
            GadgetAttr::BcdUsb | GadgetAttr::BcdDevice => {
                format!("{:x}.{:02x}", value >> 8, value & 0x00ff)
            }
            GadgetAttr::BDeviceClass | GadgetAttr::BDeviceSubClass | GadgetAttr::BDeviceProtocol => {
                format!("0x{:02x}", value)
            }
            GadgetAttr::BMaxPacketSize0 => value.to_string(),
            GadgetAttr::IdVendor | GadgetAttr::IdProduct => format!("0x{:04x}", value),
        }
    }

    /// Rendering used when writing the value to a descriptor store
    pub fn format_raw(self, value: u16) -> String {
        match self.width() {
            AttrWidth::Byte => format!("0x{:02x}", value),
            AttrWidth::Word => format!("0x{:04x}", value),
        }
    }

    /// Parse user text into a value for this attribute, enforcing its range
    pub fn parse_value(self, text: &str) -> Result<u16> {
        let value = parse_number(text).ok_or_else(|| {
            GadgetError::InvalidArgument(format!("{}: '{}' is not a number", self.name(), text))
        })?;

        if value > self.max() as u64 {
            return Err(GadgetError::InvalidArgument(format!(
                "{}: value {:#x} out of range (max {:#x})",
                self.name(),
                value,
                self.max()
            )));
        }

        Ok(value as u16)
    }
}

impl fmt::Display for GadgetAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an unsigned integer with C-style base detection (0x hex, leading 0 octal)
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Selection of attributes to include in a snapshot listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttrMask(u8);

impl AttrMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self(u8::MAX)
    }

    /// Build a mask from a selection; an empty selection selects everything
    pub fn from_attrs<I: IntoIterator<Item = GadgetAttr>>(attrs: I) -> Self {
        let mask = attrs.into_iter().fold(Self::empty(), Self::with);
        if mask.is_empty() {
            Self::all()
        } else {
            mask
        }
    }

    pub fn with(self, attr: GadgetAttr) -> Self {
        Self(self.0 | (1 << attr.index()))
    }

    pub fn contains(self, attr: GadgetAttr) -> bool {
        self.0 & (1 << attr.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Values of every device attribute of one gadget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    #[serde(rename = "bcdUSB")]
    pub bcd_usb: u16,
    #[serde(rename = "bDeviceClass")]
    pub device_class: u8,
    #[serde(rename = "bDeviceSubClass")]
    pub device_subclass: u8,
    #[serde(rename = "bDeviceProtocol")]
    pub device_protocol: u8,
    #[serde(rename = "bMaxPacketSize0")]
    pub max_packet_size0: u8,
    #[serde(rename = "idVendor")]
    pub vendor_id: u16,
    #[serde(rename = "idProduct")]
    pub product_id: u16,
    #[serde(rename = "bcdDevice")]
    pub bcd_device: u16,
}

impl AttributeSnapshot {
    pub fn get(&self, attr: GadgetAttr) -> u16 {
        match attr {
            GadgetAttr::BcdUsb => self.bcd_usb,
            GadgetAttr::BDeviceClass => self.device_class as u16,
            GadgetAttr::BDeviceSubClass => self.device_subclass as u16,
            GadgetAttr::BDeviceProtocol => self.device_protocol as u16,
            GadgetAttr::BMaxPacketSize0 => self.max_packet_size0 as u16,
            GadgetAttr::IdVendor => self.vendor_id,
            GadgetAttr::IdProduct => self.product_id,
            GadgetAttr::BcdDevice => self.bcd_device,
        }
    }

    /// Store a value; byte-wide attributes keep the low byte only
    pub fn set(&mut self, attr: GadgetAttr, value: u16) {
        match attr {
            GadgetAttr::BcdUsb => self.bcd_usb = value,
            GadgetAttr::BDeviceClass => self.device_class = value as u8,
            GadgetAttr::BDeviceSubClass => self.device_subclass = value as u8,
            GadgetAttr::BDeviceProtocol => self.device_protocol = value as u8,
            GadgetAttr::BMaxPacketSize0 => self.max_packet_size0 = value as u8,
            GadgetAttr::IdVendor => self.vendor_id = value,
            GadgetAttr::IdProduct => self.product_id = value,
            GadgetAttr::BcdDevice => self.bcd_device = value,
        }
    }

    /// Selected attributes with their values, ascending id order
    pub fn entries(&self, mask: AttrMask) -> Vec<(GadgetAttr, u16)> {
        GadgetAttr::ALL
            .into_iter()
            .filter(|a| mask.contains(*a))
            .map(|a| (a, self.get(a)))
            .collect()
    }
}
