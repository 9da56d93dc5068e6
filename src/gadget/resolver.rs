//! Implicit gadget selection

use tracing::debug;

use super::backend::{GadgetBackend, GadgetHandle};
use crate::error::{GadgetError, Result};

/// Picks the gadget an operation targets when none is named
#[derive(Debug, Clone, Default)]
pub struct GadgetResolver {
    default_gadget: Option<String>,
}

impl GadgetResolver {
    /// Create a resolver with the configured default gadget name, if any
    pub fn new(default_gadget: Option<String>) -> Self {
        Self { default_gadget }
    }

    /// Resolve the implicit gadget
    ///
    /// The only gadget in the store wins. Otherwise the configured default is
    /// looked up by name, failing `GadgetNotFound` when it no longer exists.
    /// With neither, fails `AmbiguousGadget`.
    pub fn resolve_implicit(&self, backend: &dyn GadgetBackend) -> Result<GadgetHandle> {
        let gadgets = backend
            .list_gadgets()
            .map_err(|e| GadgetError::backend("list gadgets", e))?;

        if let [only] = gadgets.as_slice() {
            debug!("Implicit gadget: {} (only gadget)", only.name());
            return Ok(only.clone());
        }

        match &self.default_gadget {
            Some(name) => {
                let gadget = backend
                    .get_gadget(name)
                    .ok_or_else(|| GadgetError::GadgetNotFound(name.clone()))?;
                debug!("Implicit gadget: {} (configured default)", name);
                Ok(gadget)
            }
            None => Err(GadgetError::AmbiguousGadget),
        }
    }
}
