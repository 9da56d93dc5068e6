//! Gadget lifecycle: create, remove, enable, disable and inspect
//!
//! Every operation runs to completion against the backend before returning.
//! Only `create` builds multi-step state, so it is the only operation that
//! rolls back on failure; the others leave the store untouched when they fail.

use serde::Serialize;
use tracing::{debug, error, info};

use super::attrs::{AttrMask, GadgetAttr, ATTR_COUNT};
use super::backend::{BackendErrorKind, GadgetBackend, GadgetHandle};
use super::resolver::GadgetResolver;
use super::strings::{GadgetStr, GadgetStrings, LANG_US_ENG, STR_COUNT};
use crate::error::{GadgetError, Result};

/// Parameters of a gadget creation
///
/// Unset attributes keep the backend default, unset strings stay unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    attrs: [Option<u16>; ATTR_COUNT],
    strings: [Option<String>; STR_COUNT],
}

impl CreateRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, attr: GadgetAttr, value: u16) -> Self {
        self.attrs[attr.index()] = Some(value);
        self
    }

    pub fn with_string(mut self, field: GadgetStr, value: impl Into<String>) -> Self {
        self.strings[field.index()] = Some(value.into());
        self
    }

    pub fn attr(&self, attr: GadgetAttr) -> Option<u16> {
        self.attrs[attr.index()]
    }

    pub fn string(&self, field: GadgetStr) -> Option<&str> {
        self.strings[field.index()].as_deref()
    }
}

/// Parameters of a gadget removal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveRequest {
    pub name: String,
    /// Unbind first if the gadget is enabled
    pub force: bool,
    /// Also remove configs and functions owned by the gadget
    pub recursive: bool,
}

/// Parameters of a bind; unset fields are resolved implicitly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnableRequest {
    pub gadget: Option<String>,
    pub udc: Option<String>,
}

/// Parameters of an unbind; the gadget name wins over the UDC name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisableRequest {
    pub gadget: Option<String>,
    pub udc: Option<String>,
}

/// Parameters of an attribute query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub name: String,
    pub mask: AttrMask,
}

/// A gadget and the UDC it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GadgetSummary {
    pub name: String,
    pub udc: Option<String>,
}

/// A UDC and the gadget bound to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSummary {
    pub name: String,
    pub gadget: Option<String>,
}

/// Gadget lifecycle controller
pub struct GadgetManager<B: GadgetBackend> {
    backend: B,
    resolver: GadgetResolver,
}

impl<B: GadgetBackend> GadgetManager<B> {
    pub fn new(backend: B, resolver: GadgetResolver) -> Self {
        Self { backend, resolver }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create a gadget and apply the requested attributes and strings
    ///
    /// Attributes are applied in ascending table order, then strings in table
    /// order under US English. If any field is rejected the gadget is removed
    /// recursively and the field error is returned.
    pub fn create(&self, req: &CreateRequest) -> Result<()> {
        let gadget = self
            .backend
            .create_gadget(&req.name)
            .map_err(|e| match e.kind {
                BackendErrorKind::Exists => GadgetError::NameConflict(req.name.clone()),
                _ => GadgetError::backend("create gadget", e),
            })?;

        if let Err(e) = self.apply_descriptors(&gadget, req) {
            self.rollback(&gadget);
            return Err(e);
        }

        info!("Created gadget {}", req.name);
        Ok(())
    }

    fn apply_descriptors(&self, gadget: &GadgetHandle, req: &CreateRequest) -> Result<()> {
        for attr in GadgetAttr::ALL {
            let Some(value) = req.attr(attr) else {
                continue;
            };
            self.backend
                .set_attribute(gadget, attr, value)
                .map_err(|source| GadgetError::AttributeRejected { attr, source })?;
            debug!("Set {} = {}", attr, attr.format(value));
        }

        for field in GadgetStr::ALL {
            let Some(value) = req.string(field) else {
                continue;
            };
            field
                .apply(&self.backend, gadget, LANG_US_ENG, value)
                .map_err(|source| GadgetError::StringRejected { field, source })?;
            debug!("Set string {} = {:?}", field, value);
        }

        Ok(())
    }

    /// Best-effort removal of a half-configured gadget
    fn rollback(&self, gadget: &GadgetHandle) {
        match self.backend.remove_gadget(gadget, true) {
            Ok(()) => debug!("Rolled back gadget {}", gadget.name()),
            Err(e) => error!("Failed to roll back gadget {}: {}", gadget.name(), e),
        }
    }

    /// Remove a gadget, unbinding it first when forced
    pub fn remove(&self, req: &RemoveRequest) -> Result<()> {
        let gadget = self
            .backend
            .get_gadget(&req.name)
            .ok_or_else(|| GadgetError::GadgetNotFound(req.name.clone()))?;

        if let Some(udc) = self.backend.get_gadget_controller(&gadget) {
            if !req.force {
                return Err(GadgetError::StillEnabled(req.name.clone()));
            }
            self.backend
                .disable_gadget(&gadget)
                .map_err(|source| GadgetError::DisableFailed {
                    gadget: req.name.clone(),
                    source,
                })?;
            info!("Disabled gadget {} (was bound to {})", req.name, udc.name());
        }

        self.backend
            .remove_gadget(&gadget, req.recursive)
            .map_err(|e| GadgetError::backend("remove gadget", e))?;

        info!("Removed gadget {}", req.name);
        Ok(())
    }

    /// Bind a gadget to a UDC
    pub fn enable(&self, req: &EnableRequest) -> Result<()> {
        let udc = match &req.udc {
            Some(name) => Some(
                self.backend
                    .get_controller(name)
                    .ok_or_else(|| GadgetError::ControllerNotFound(name.clone()))?,
            ),
            None => None,
        };

        let gadget = match &req.gadget {
            Some(name) => self.lookup(name)?,
            None => self.resolver.resolve_implicit(&self.backend)?,
        };

        self.backend
            .enable_gadget(&gadget, udc.as_ref())
            .map_err(|e| match e.kind {
                BackendErrorKind::Busy => GadgetError::BindConflict {
                    gadget: gadget.name().to_string(),
                    source: e,
                },
                _ => GadgetError::backend("enable gadget", e),
            })?;

        match self.backend.get_gadget_controller(&gadget) {
            Some(bound) => info!("Enabled gadget {} on {}", gadget.name(), bound.name()),
            None => info!("Enabled gadget {}", gadget.name()),
        }
        Ok(())
    }

    /// Unbind a gadget from its UDC
    pub fn disable(&self, req: &DisableRequest) -> Result<()> {
        let gadget = if let Some(name) = &req.gadget {
            self.lookup(name)?
        } else if let Some(udc_name) = &req.udc {
            let udc = self
                .backend
                .get_controller(udc_name)
                .ok_or_else(|| GadgetError::ControllerNotFound(udc_name.clone()))?;
            self.backend
                .get_controller_gadget(&udc)
                .ok_or_else(|| GadgetError::NoGadgetBound(udc_name.clone()))?
        } else {
            self.resolver.resolve_implicit(&self.backend)?
        };

        self.backend
            .disable_gadget(&gadget)
            .map_err(|e| GadgetError::backend("disable gadget", e))?;

        info!("Disabled gadget {}", gadget.name());
        Ok(())
    }

    /// Selected attributes of a gadget, ascending table order
    pub fn get_attributes(&self, req: &GetRequest) -> Result<Vec<(GadgetAttr, u16)>> {
        let gadget = self.lookup(&req.name)?;
        let snapshot = self
            .backend
            .get_attributes(&gadget)
            .map_err(|e| GadgetError::backend("get attributes", e))?;
        Ok(snapshot.entries(req.mask))
    }

    /// String descriptors of a gadget under one language
    pub fn get_strings(&self, name: &str, lang: u16) -> Result<GadgetStrings> {
        let gadget = self.lookup(name)?;
        self.backend
            .get_strings(&gadget, lang)
            .map_err(|e| GadgetError::backend("get strings", e))
    }

    /// All gadgets with their bindings, sorted by name
    pub fn list(&self) -> Result<Vec<GadgetSummary>> {
        let mut gadgets: Vec<GadgetSummary> = self
            .backend
            .list_gadgets()
            .map_err(|e| GadgetError::backend("list gadgets", e))?
            .into_iter()
            .map(|g| GadgetSummary {
                udc: self
                    .backend
                    .get_gadget_controller(&g)
                    .map(|u| u.name().to_string()),
                name: g.name().to_string(),
            })
            .collect();
        gadgets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(gadgets)
    }

    /// All UDCs with the gadget bound to each
    pub fn controllers(&self) -> Result<Vec<ControllerSummary>> {
        Ok(self
            .backend
            .list_controllers()
            .map_err(|e| GadgetError::backend("list UDCs", e))?
            .into_iter()
            .map(|u| ControllerSummary {
                gadget: self
                    .backend
                    .get_controller_gadget(&u)
                    .map(|g| g.name().to_string()),
                name: u.name().to_string(),
            })
            .collect())
    }

    fn lookup(&self, name: &str) -> Result<GadgetHandle> {
        self.backend
            .get_gadget(name)
            .ok_or_else(|| GadgetError::GadgetNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gadget::attrs::AttributeSnapshot;
    use crate::gadget::backend::{BackendError, BackendResult, ControllerHandle};
    use crate::gadget::configfs::ConfigfsBackend;
    use crate::gadget::memory::MemoryBackend;
    use parking_lot::Mutex;

    /// Records mutating calls and injects failures on top of `MemoryBackend`
    #[derive(Default)]
    struct SpyBackend {
        inner: MemoryBackend,
        calls: Mutex<Vec<String>>,
        fail_attr: Option<GadgetAttr>,
        fail_string: Option<GadgetStr>,
        fail_remove: bool,
        fail_disable: bool,
    }

    impl SpyBackend {
        fn with_controllers(udcs: &[&str]) -> Self {
            Self {
                inner: MemoryBackend::with_controllers(udcs.iter().copied()),
                ..Default::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl GadgetBackend for SpyBackend {
        fn create_gadget(&self, name: &str) -> BackendResult<GadgetHandle> {
            self.record(format!("create {}", name));
            self.inner.create_gadget(name)
        }

        fn remove_gadget(&self, gadget: &GadgetHandle, recursive: bool) -> BackendResult<()> {
            self.record(format!("remove {} recursive={}", gadget.name(), recursive));
            if self.fail_remove {
                return Err(BackendError::io("injected remove failure"));
            }
            self.inner.remove_gadget(gadget, recursive)
        }

        fn get_gadget(&self, name: &str) -> Option<GadgetHandle> {
            self.inner.get_gadget(name)
        }

        fn list_gadgets(&self) -> BackendResult<Vec<GadgetHandle>> {
            self.inner.list_gadgets()
        }

        fn set_attribute(
            &self,
            gadget: &GadgetHandle,
            attr: GadgetAttr,
            value: u16,
        ) -> BackendResult<()> {
            self.record(format!("attr {}", attr));
            if self.fail_attr == Some(attr) {
                return Err(BackendError::invalid("injected attribute failure"));
            }
            self.inner.set_attribute(gadget, attr, value)
        }

        fn get_attributes(&self, gadget: &GadgetHandle) -> BackendResult<AttributeSnapshot> {
            self.inner.get_attributes(gadget)
        }

        fn set_string(
            &self,
            gadget: &GadgetHandle,
            field: GadgetStr,
            lang: u16,
            value: &str,
        ) -> BackendResult<()> {
            self.record(format!("string {} lang={:#x}", field, lang));
            if self.fail_string == Some(field) {
                return Err(BackendError::invalid("injected string failure"));
            }
            self.inner.set_string(gadget, field, lang, value)
        }

        fn get_strings(&self, gadget: &GadgetHandle, lang: u16) -> BackendResult<GadgetStrings> {
            self.inner.get_strings(gadget, lang)
        }

        fn enable_gadget(
            &self,
            gadget: &GadgetHandle,
            udc: Option<&ControllerHandle>,
        ) -> BackendResult<()> {
            self.record(format!(
                "enable {} on {}",
                gadget.name(),
                udc.map(|u| u.name()).unwrap_or("auto")
            ));
            self.inner.enable_gadget(gadget, udc)
        }

        fn disable_gadget(&self, gadget: &GadgetHandle) -> BackendResult<()> {
            self.record(format!("disable {}", gadget.name()));
            if self.fail_disable {
                return Err(BackendError::io("injected disable failure"));
            }
            self.inner.disable_gadget(gadget)
        }

        fn get_gadget_controller(&self, gadget: &GadgetHandle) -> Option<ControllerHandle> {
            self.inner.get_gadget_controller(gadget)
        }

        fn get_controller(&self, name: &str) -> Option<ControllerHandle> {
            self.inner.get_controller(name)
        }

        fn get_controller_gadget(&self, udc: &ControllerHandle) -> Option<GadgetHandle> {
            self.inner.get_controller_gadget(udc)
        }

        fn list_controllers(&self) -> BackendResult<Vec<ControllerHandle>> {
            self.inner.list_controllers()
        }
    }

    fn manager(backend: SpyBackend) -> GadgetManager<SpyBackend> {
        GadgetManager::new(backend, GadgetResolver::default())
    }

    fn bound_udc(m: &GadgetManager<SpyBackend>, name: &str) -> Option<String> {
        let g = m.backend().get_gadget(name)?;
        m.backend()
            .get_gadget_controller(&g)
            .map(|u| u.name().to_string())
    }

    #[test]
    fn test_create_applies_attributes_in_table_order() {
        let m = manager(SpyBackend::default());
        let req = CreateRequest::new("g1")
            .with_string(GadgetStr::SerialNumber, "0123456789")
            .with_attr(GadgetAttr::BcdDevice, 0x0100)
            .with_attr(GadgetAttr::IdProduct, 0x0104)
            .with_string(GadgetStr::Manufacturer, "Linux Foundation")
            .with_attr(GadgetAttr::IdVendor, 0x1d6b)
            .with_attr(GadgetAttr::BDeviceClass, 0xef);
        m.create(&req).unwrap();

        assert_eq!(
            m.backend().calls(),
            vec![
                "create g1",
                "attr bDeviceClass",
                "attr idVendor",
                "attr idProduct",
                "attr bcdDevice",
                "string manufacturer lang=0x409",
                "string serialnumber lang=0x409",
            ]
        );
    }

    #[test]
    fn test_create_round_trip() {
        let m = manager(SpyBackend::default());
        let req = CreateRequest::new("g1")
            .with_attr(GadgetAttr::IdVendor, 0x1d6b)
            .with_attr(GadgetAttr::BMaxPacketSize0, 64)
            .with_string(GadgetStr::Product, "Composite Gadget");
        m.create(&req).unwrap();

        let all = GetRequest {
            name: "g1".to_string(),
            mask: AttrMask::all(),
        };
        let attrs = m.get_attributes(&all).unwrap();
        assert!(attrs.contains(&(GadgetAttr::IdVendor, 0x1d6b)));
        assert!(attrs.contains(&(GadgetAttr::BMaxPacketSize0, 64)));

        let strings = m.get_strings("g1", LANG_US_ENG).unwrap();
        assert_eq!(strings.get(GadgetStr::Product), Some("Composite Gadget"));
        assert_eq!(strings.get(GadgetStr::Manufacturer), None);
    }

    #[test]
    fn test_create_name_conflict() {
        let m = manager(SpyBackend::default());
        m.create(&CreateRequest::new("g1")).unwrap();
        let err = m.create(&CreateRequest::new("g1")).unwrap_err();
        assert!(matches!(err, GadgetError::NameConflict(name) if name == "g1"));
        // The existing gadget is untouched
        assert!(m.backend().get_gadget("g1").is_some());
    }

    #[test]
    fn test_create_rolls_back_rejected_attribute() {
        let m = manager(SpyBackend::default());
        let req = CreateRequest::new("g1")
            .with_attr(GadgetAttr::IdVendor, 0x1d6b)
            .with_attr(GadgetAttr::BDeviceSubClass, 0x100)
            .with_string(GadgetStr::Product, "never set");

        let err = m.create(&req).unwrap_err();
        assert!(matches!(
            err,
            GadgetError::AttributeRejected {
                attr: GadgetAttr::BDeviceSubClass,
                ..
            }
        ));
        assert!(m.backend().get_gadget("g1").is_none());
        assert_eq!(
            m.backend().calls(),
            vec!["create g1", "attr bDeviceSubClass", "remove g1 recursive=true"]
        );
    }

    #[test]
    fn test_create_rolls_back_rejected_string() {
        let backend = SpyBackend {
            fail_string: Some(GadgetStr::Product),
            ..Default::default()
        };
        let m = manager(backend);
        let req = CreateRequest::new("g1")
            .with_attr(GadgetAttr::IdVendor, 0x1d6b)
            .with_string(GadgetStr::Manufacturer, "ACME")
            .with_string(GadgetStr::Product, "Widget");

        let err = m.create(&req).unwrap_err();
        assert!(matches!(
            err,
            GadgetError::StringRejected {
                field: GadgetStr::Product,
                ..
            }
        ));
        assert!(m.backend().get_gadget("g1").is_none());
        assert_eq!(m.backend().calls().last().unwrap(), "remove g1 recursive=true");
    }

    #[test]
    fn test_failed_rollback_keeps_field_error() {
        let backend = SpyBackend {
            fail_attr: Some(GadgetAttr::IdProduct),
            fail_remove: true,
            ..Default::default()
        };
        let m = manager(backend);
        let req = CreateRequest::new("g1").with_attr(GadgetAttr::IdProduct, 0x0104);

        let err = m.create(&req).unwrap_err();
        assert!(matches!(
            err,
            GadgetError::AttributeRejected {
                attr: GadgetAttr::IdProduct,
                ..
            }
        ));
    }

    #[test]
    fn test_remove_missing_gadget() {
        let m = manager(SpyBackend::default());
        let req = RemoveRequest {
            name: "nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            m.remove(&req).unwrap_err(),
            GadgetError::GadgetNotFound(_)
        ));
    }

    #[test]
    fn test_remove_passes_recursive_flag() {
        let m = manager(SpyBackend::default());
        m.create(&CreateRequest::new("g1")).unwrap();
        m.create(&CreateRequest::new("g2")).unwrap();

        m.remove(&RemoveRequest {
            name: "g1".to_string(),
            ..Default::default()
        })
        .unwrap();
        m.remove(&RemoveRequest {
            name: "g2".to_string(),
            recursive: true,
            ..Default::default()
        })
        .unwrap();

        let calls = m.backend().calls();
        assert!(calls.contains(&"remove g1 recursive=false".to_string()));
        assert!(calls.contains(&"remove g2 recursive=true".to_string()));
    }

    #[test]
    fn test_remove_non_recursive_with_owned_objects() {
        let m = manager(SpyBackend::default());
        m.create(&CreateRequest::new("g1")).unwrap();
        let g = m.backend().get_gadget("g1").unwrap();
        m.backend().inner.add_config(&g, "c.1").unwrap();

        let err = m
            .remove(&RemoveRequest {
                name: "g1".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            GadgetError::Backend { source, .. } if source.kind == BackendErrorKind::NotEmpty
        ));
        assert!(m.backend().get_gadget("g1").is_some());
    }

    #[test]
    fn test_force_remove_disable_failure() {
        let backend = SpyBackend {
            fail_disable: true,
            ..SpyBackend::with_controllers(&["udc0"])
        };
        let m = manager(backend);
        m.create(&CreateRequest::new("g1")).unwrap();
        m.enable(&EnableRequest::default()).unwrap();

        let err = m
            .remove(&RemoveRequest {
                name: "g1".to_string(),
                force: true,
                recursive: true,
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::DisableFailed { .. }));
        assert!(m.backend().get_gadget("g1").is_some());
    }

    #[test]
    fn test_enable_unknown_controller() {
        let m = manager(SpyBackend::with_controllers(&["udc0"]));
        m.create(&CreateRequest::new("g1")).unwrap();
        let err = m
            .enable(&EnableRequest {
                gadget: Some("g1".to_string()),
                udc: Some("udc9".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::ControllerNotFound(name) if name == "udc9"));
    }

    #[test]
    fn test_enable_unknown_gadget() {
        let m = manager(SpyBackend::with_controllers(&["udc0"]));
        let err = m
            .enable(&EnableRequest {
                gadget: Some("g1".to_string()),
                udc: None,
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::GadgetNotFound(_)));
    }

    #[test]
    fn test_enable_implicit_ambiguous() {
        let m = manager(SpyBackend::with_controllers(&["udc0"]));
        m.create(&CreateRequest::new("g1")).unwrap();
        m.create(&CreateRequest::new("g2")).unwrap();
        let err = m.enable(&EnableRequest::default()).unwrap_err();
        assert!(matches!(err, GadgetError::AmbiguousGadget));
    }

    #[test]
    fn test_enable_implicit_uses_configured_default() {
        let backend = SpyBackend::with_controllers(&["udc0"]);
        let m = GadgetManager::new(backend, GadgetResolver::new(Some("g2".to_string())));
        m.create(&CreateRequest::new("g1")).unwrap();
        m.create(&CreateRequest::new("g2")).unwrap();

        m.enable(&EnableRequest::default()).unwrap();
        assert_eq!(bound_udc(&m, "g2").as_deref(), Some("udc0"));
        assert_eq!(bound_udc(&m, "g1"), None);
        assert!(m.backend().calls().contains(&"enable g2 on auto".to_string()));
    }

    #[test]
    fn test_enable_bind_conflicts() {
        let m = manager(SpyBackend::with_controllers(&["udc0"]));
        m.create(&CreateRequest::new("g1")).unwrap();
        m.create(&CreateRequest::new("g2")).unwrap();
        let on_udc0 = |g: &str| EnableRequest {
            gadget: Some(g.to_string()),
            udc: Some("udc0".to_string()),
        };

        m.enable(&on_udc0("g1")).unwrap();
        assert!(matches!(
            m.enable(&on_udc0("g1")).unwrap_err(),
            GadgetError::BindConflict { .. }
        ));
        assert!(matches!(
            m.enable(&on_udc0("g2")).unwrap_err(),
            GadgetError::BindConflict { .. }
        ));
        assert_eq!(bound_udc(&m, "g1").as_deref(), Some("udc0"));
        assert_eq!(bound_udc(&m, "g2"), None);
    }

    #[test]
    fn test_disable_by_controller() {
        let m = manager(SpyBackend::with_controllers(&["udc0", "udc1"]));
        m.create(&CreateRequest::new("g1")).unwrap();
        m.enable(&EnableRequest {
            gadget: None,
            udc: Some("udc1".to_string()),
        })
        .unwrap();

        let err = m
            .disable(&DisableRequest {
                gadget: None,
                udc: Some("udc0".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::NoGadgetBound(name) if name == "udc0"));

        let err = m
            .disable(&DisableRequest {
                gadget: None,
                udc: Some("udc7".to_string()),
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::ControllerNotFound(_)));

        m.disable(&DisableRequest {
            gadget: None,
            udc: Some("udc1".to_string()),
        })
        .unwrap();
        assert_eq!(bound_udc(&m, "g1"), None);
    }

    #[test]
    fn test_disable_gadget_name_wins_over_controller() {
        let m = manager(SpyBackend::with_controllers(&["udc0", "udc1"]));
        m.create(&CreateRequest::new("g1")).unwrap();
        m.create(&CreateRequest::new("g2")).unwrap();
        for (g, u) in [("g1", "udc0"), ("g2", "udc1")] {
            m.enable(&EnableRequest {
                gadget: Some(g.to_string()),
                udc: Some(u.to_string()),
            })
            .unwrap();
        }

        m.disable(&DisableRequest {
            gadget: Some("g2".to_string()),
            udc: Some("udc0".to_string()),
        })
        .unwrap();
        assert_eq!(bound_udc(&m, "g1").as_deref(), Some("udc0"));
        assert_eq!(bound_udc(&m, "g2"), None);
    }

    #[test]
    fn test_disable_is_idempotent() {
        let m = manager(SpyBackend::with_controllers(&["udc0", "udc1"]));
        m.create(&CreateRequest::new("g1")).unwrap();
        m.create(&CreateRequest::new("g2")).unwrap();
        m.enable(&EnableRequest {
            gadget: Some("g2".to_string()),
            udc: Some("udc1".to_string()),
        })
        .unwrap();

        let req = DisableRequest {
            gadget: Some("g1".to_string()),
            udc: None,
        };
        m.disable(&req).unwrap();
        m.disable(&req).unwrap();
        assert_eq!(bound_udc(&m, "g2").as_deref(), Some("udc1"));
    }

    #[test]
    fn test_disable_implicit() {
        let m = manager(SpyBackend::with_controllers(&["udc0"]));
        let err = m.disable(&DisableRequest::default()).unwrap_err();
        assert!(matches!(err, GadgetError::AmbiguousGadget));

        m.create(&CreateRequest::new("g1")).unwrap();
        m.enable(&EnableRequest::default()).unwrap();
        m.disable(&DisableRequest::default()).unwrap();
        assert_eq!(bound_udc(&m, "g1"), None);
    }

    #[test]
    fn test_get_attributes_missing_gadget() {
        let m = manager(SpyBackend::default());
        let req = GetRequest {
            name: "g1".to_string(),
            mask: AttrMask::all(),
        };
        assert!(matches!(
            m.get_attributes(&req).unwrap_err(),
            GadgetError::GadgetNotFound(_)
        ));
    }

    #[test]
    fn test_get_attributes_masked() {
        let m = manager(SpyBackend::default());
        m.create(
            &CreateRequest::new("g1")
                .with_attr(GadgetAttr::IdVendor, 0x1d6b)
                .with_attr(GadgetAttr::IdProduct, 0x0104),
        )
        .unwrap();

        let req = GetRequest {
            name: "g1".to_string(),
            mask: AttrMask::empty()
                .with(GadgetAttr::IdProduct)
                .with(GadgetAttr::BcdUsb),
        };
        assert_eq!(
            m.get_attributes(&req).unwrap(),
            vec![(GadgetAttr::BcdUsb, 0x0200), (GadgetAttr::IdProduct, 0x0104)]
        );
    }

    #[test]
    fn test_list_and_controllers() {
        let m = manager(SpyBackend::with_controllers(&["udc0", "udc1"]));
        m.create(&CreateRequest::new("zeta")).unwrap();
        m.create(&CreateRequest::new("alpha")).unwrap();
        m.enable(&EnableRequest {
            gadget: Some("zeta".to_string()),
            udc: Some("udc1".to_string()),
        })
        .unwrap();

        assert_eq!(
            m.list().unwrap(),
            vec![
                GadgetSummary {
                    name: "alpha".to_string(),
                    udc: None,
                },
                GadgetSummary {
                    name: "zeta".to_string(),
                    udc: Some("udc1".to_string()),
                },
            ]
        );
        assert_eq!(
            m.controllers().unwrap(),
            vec![
                ControllerSummary {
                    name: "udc0".to_string(),
                    gadget: None,
                },
                ControllerSummary {
                    name: "udc1".to_string(),
                    gadget: Some("zeta".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_enable_then_force_remove_scenario() {
        let m = manager(SpyBackend::with_controllers(&["udc0"]));
        m.create(
            &CreateRequest::new("g1")
                .with_attr(GadgetAttr::IdVendor, 0x1d6b)
                .with_attr(GadgetAttr::IdProduct, 0x0104),
        )
        .unwrap();
        m.enable(&EnableRequest {
            gadget: Some("g1".to_string()),
            udc: Some("udc0".to_string()),
        })
        .unwrap();

        let mut req = RemoveRequest {
            name: "g1".to_string(),
            force: false,
            recursive: false,
        };
        let err = m.remove(&req).unwrap_err();
        assert!(matches!(err, GadgetError::StillEnabled(_)));
        assert_eq!(bound_udc(&m, "g1").as_deref(), Some("udc0"));

        req.force = true;
        m.remove(&req).unwrap();
        assert!(m.backend().get_gadget("g1").is_none());
        let udc = m.backend().get_controller("udc0").unwrap();
        assert!(m.backend().get_controller_gadget(&udc).is_none());
    }

    fn configfs_manager(dir: &tempfile::TempDir) -> GadgetManager<ConfigfsBackend> {
        let gadget_root = dir.path().join("usb_gadget");
        let udc_root = dir.path().join("udc");
        std::fs::create_dir_all(&gadget_root).unwrap();
        std::fs::create_dir_all(udc_root.join("musb-hdrc.0")).unwrap();
        GadgetManager::new(
            ConfigfsBackend::new(gadget_root, udc_root),
            GadgetResolver::default(),
        )
    }

    #[test]
    fn test_dot_names_not_found_on_configfs() {
        let dir = tempfile::TempDir::new().unwrap();
        let m = configfs_manager(&dir);

        let err = m
            .disable(&DisableRequest {
                gadget: Some("..".to_string()),
                udc: None,
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::GadgetNotFound(_)));

        let req = GetRequest {
            name: ".".to_string(),
            mask: AttrMask::all(),
        };
        assert!(matches!(
            m.get_attributes(&req).unwrap_err(),
            GadgetError::GadgetNotFound(_)
        ));

        let err = m.create(&CreateRequest::new(".")).unwrap_err();
        assert!(matches!(err, GadgetError::Backend { .. }));
    }

    #[test]
    fn test_configfs_unbind_and_rebind() {
        let dir = tempfile::TempDir::new().unwrap();
        let m = configfs_manager(&dir);
        m.create(&CreateRequest::new("g1").with_string(GadgetStr::Product, "Gadget"))
            .unwrap();
        m.enable(&EnableRequest::default()).unwrap();

        let req = DisableRequest {
            gadget: Some("g1".to_string()),
            udc: None,
        };
        m.disable(&req).unwrap();
        m.disable(&req).unwrap();
        assert_eq!(
            m.list().unwrap(),
            vec![GadgetSummary {
                name: "g1".to_string(),
                udc: None,
            }]
        );

        m.enable(&EnableRequest::default()).unwrap();
        let err = m
            .disable(&DisableRequest {
                gadget: None,
                udc: Some("musb-hdrc.0".to_string()),
            })
            .and_then(|_| {
                m.disable(&DisableRequest {
                    gadget: None,
                    udc: Some("musb-hdrc.0".to_string()),
                })
            })
            .unwrap_err();
        assert!(matches!(err, GadgetError::NoGadgetBound(_)));
    }
}
