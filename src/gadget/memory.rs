//! In-process descriptor store
//!
//! Mirrors the rules the kernel applies to configfs gadgets: unique names,
//! 8-bit range checks, one gadget per UDC, and removal refusing to drop
//! owned configs/functions unless asked to recurse.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use super::attrs::{AttributeSnapshot, GadgetAttr};
use super::backend::{
    validate_name, BackendError, BackendResult, ControllerHandle, GadgetBackend, GadgetHandle,
};
use super::strings::{GadgetStr, GadgetStrings};

/// USB 2.0, the value a fresh gadget reports for bcdUSB
const DEFAULT_BCD_USB: u16 = 0x0200;

#[derive(Debug, Clone)]
struct MemGadget {
    name: String,
    attrs: AttributeSnapshot,
    strings: BTreeMap<u16, GadgetStrings>,
    udc: Option<String>,
    configs: Vec<String>,
    functions: Vec<String>,
}

impl MemGadget {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: AttributeSnapshot {
                bcd_usb: DEFAULT_BCD_USB,
                ..Default::default()
            },
            strings: BTreeMap::new(),
            udc: None,
            configs: Vec::new(),
            functions: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemState {
    /// Creation order is kept so "first gadget" is stable
    gadgets: Vec<MemGadget>,
    controllers: Vec<String>,
}

impl MemState {
    fn gadget(&self, name: &str) -> BackendResult<&MemGadget> {
        self.gadgets
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| BackendError::not_found(format!("gadget {} does not exist", name)))
    }

    fn gadget_mut(&mut self, name: &str) -> BackendResult<&mut MemGadget> {
        self.gadgets
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| BackendError::not_found(format!("gadget {} does not exist", name)))
    }

    fn bound_to(&self, udc: &str) -> Option<&MemGadget> {
        self.gadgets.iter().find(|g| g.udc.as_deref() == Some(udc))
    }
}

/// Descriptor store kept in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store exposing the given controllers
    pub fn with_controllers<I, S>(controllers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        for udc in controllers {
            backend.add_controller(udc);
        }
        backend
    }

    pub fn add_controller(&self, name: impl Into<String>) {
        self.state.lock().controllers.push(name.into());
    }

    /// Attach a configuration to a gadget
    pub fn add_config(&self, gadget: &GadgetHandle, name: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.gadget_mut(gadget.name())?.configs.push(name.to_string());
        Ok(())
    }

    /// Attach a function to a gadget
    pub fn add_function(&self, gadget: &GadgetHandle, name: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.gadget_mut(gadget.name())?.functions.push(name.to_string());
        Ok(())
    }
}

impl GadgetBackend for MemoryBackend {
    fn create_gadget(&self, name: &str) -> BackendResult<GadgetHandle> {
        validate_name(name)?;

        let mut state = self.state.lock();
        if state.gadgets.iter().any(|g| g.name == name) {
            return Err(BackendError::exists(format!("gadget {} already exists", name)));
        }
        state.gadgets.push(MemGadget::new(name));
        debug!("Created gadget {}", name);
        Ok(GadgetHandle::new(name))
    }

    fn remove_gadget(&self, gadget: &GadgetHandle, recursive: bool) -> BackendResult<()> {
        let mut state = self.state.lock();
        let g = state.gadget(gadget.name())?;

        if g.udc.is_some() {
            return Err(BackendError::busy(format!("gadget {} is bound", g.name)));
        }
        if !recursive && (!g.configs.is_empty() || !g.functions.is_empty()) {
            return Err(BackendError::not_empty(format!(
                "gadget {} still has configs or functions",
                g.name
            )));
        }

        state.gadgets.retain(|g| g.name != gadget.name());
        debug!("Removed gadget {}", gadget.name());
        Ok(())
    }

    fn get_gadget(&self, name: &str) -> Option<GadgetHandle> {
        let state = self.state.lock();
        state.gadget(name).ok().map(|g| GadgetHandle::new(&g.name))
    }

    fn list_gadgets(&self) -> BackendResult<Vec<GadgetHandle>> {
        let state = self.state.lock();
        Ok(state.gadgets.iter().map(|g| GadgetHandle::new(&g.name)).collect())
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

        let mut state = self.state.lock();
        state.gadget_mut(gadget.name())?.attrs.set(attr, value);
        Ok(())
    }

    fn get_attributes(&self, gadget: &GadgetHandle) -> BackendResult<AttributeSnapshot> {
        let state = self.state.lock();
        Ok(state.gadget(gadget.name())?.attrs)
    }

    fn set_string(
        &self,
        gadget: &GadgetHandle,
        field: GadgetStr,
        lang: u16,
        value: &str,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        state
            .gadget_mut(gadget.name())?
            .strings
            .entry(lang)
            .or_default()
            .set(field, value);
        Ok(())
    }

    fn get_strings(&self, gadget: &GadgetHandle, lang: u16) -> BackendResult<GadgetStrings> {
        let state = self.state.lock();
        Ok(state
            .gadget(gadget.name())?
            .strings
            .get(&lang)
            .cloned()
            .unwrap_or_default())
    }

    fn enable_gadget(
        &self,
        gadget: &GadgetHandle,
        udc: Option<&ControllerHandle>,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();

        let udc = match udc {
            Some(u) => u.name().to_string(),
            None => state
                .controllers
                .first()
                .cloned()
                .ok_or_else(|| BackendError::not_found("no UDC available"))?,
        };
        if !state.controllers.contains(&udc) {
            return Err(BackendError::not_found(format!("UDC {} does not exist", udc)));
        }

        let g = state.gadget(gadget.name())?;
        if let Some(current) = &g.udc {
            return Err(BackendError::busy(format!(
                "gadget {} already bound to {}",
                g.name, current
            )));
        }
        if let Some(other) = state.bound_to(&udc) {
            return Err(BackendError::busy(format!(
                "UDC {} in use by gadget {}",
                udc, other.name
            )));
        }

        state.gadget_mut(gadget.name())?.udc = Some(udc.clone());
        debug!("Bound gadget {} to {}", gadget.name(), udc);
        Ok(())
    }

    fn disable_gadget(&self, gadget: &GadgetHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        let g = state.gadget_mut(gadget.name())?;
        if let Some(udc) = g.udc.take() {
            debug!("Unbound gadget {} from {}", gadget.name(), udc);
        }
        Ok(())
    }

    fn get_gadget_controller(&self, gadget: &GadgetHandle) -> Option<ControllerHandle> {
        let state = self.state.lock();
        state
            .gadget(gadget.name())
            .ok()
            .and_then(|g| g.udc.as_deref())
            .map(ControllerHandle::new)
    }

    fn get_controller(&self, name: &str) -> Option<ControllerHandle> {
        let state = self.state.lock();
        state
            .controllers
            .iter()
            .find(|u| u.as_str() == name)
            .map(ControllerHandle::new)
    }

    fn get_controller_gadget(&self, udc: &ControllerHandle) -> Option<GadgetHandle> {
        let state = self.state.lock();
        state.bound_to(udc.name()).map(|g| GadgetHandle::new(&g.name))
    }

    fn list_controllers(&self) -> BackendResult<Vec<ControllerHandle>> {
        let state = self.state.lock();
        Ok(state.controllers.iter().map(ControllerHandle::new).collect())
    }
}
