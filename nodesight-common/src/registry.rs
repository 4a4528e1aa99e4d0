//! Probe registry: which probes exist, which run by default, and how to build them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::probe::{Probe, ProbeError};

/// Builds a probe instance from the probe configuration `C`.
pub type Constructor<C> = fn(&C) -> Result<Box<dyn Probe>, ProbeError>;

/// Errors raised while building the registry or its instances.
///
/// All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("probe '{0}' is registered more than once")]
    DuplicateName(String),

    #[error("unknown probe '{0}'")]
    UnknownProbe(String),

    #[error("probe '{name}' was explicitly enabled but could not be created: {source}")]
    RequiredProbeFailed {
        name: String,
        #[source]
        source: ProbeError,
    },
}

/// One entry in the registry.
pub struct ProbeRegistration<C> {
    pub name: &'static str,
    pub default_enabled: bool,
    pub constructor: Constructor<C>,
}

impl<C> ProbeRegistration<C> {
    pub const fn new(name: &'static str, default_enabled: bool, constructor: Constructor<C>) -> Self {
        Self {
            name,
            default_enabled,
            constructor,
        }
    }
}

impl<C> Clone for ProbeRegistration<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ProbeRegistration<C> {}

impl<C> fmt::Debug for ProbeRegistration<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRegistration")
            .field("name", &self.name)
            .field("default_enabled", &self.default_enabled)
            .finish_non_exhaustive()
    }
}

/// A constructed probe, ready to be driven by the engine.
///
/// The mutex guarantees that at most one `update` runs on the instance at a time.
#[derive(Clone)]
pub struct ProbeInstance {
    name: String,
    probe: Arc<Mutex<Box<dyn Probe>>>,
}

impl ProbeInstance {
    pub fn new(name: impl Into<String>, probe: Box<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            probe: Arc::new(Mutex::new(probe)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn probe(&self) -> &Arc<Mutex<Box<dyn Probe>>> {
        &self.probe
    }
}

impl fmt::Debug for ProbeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeInstance")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Table of known probes, in registration order.
pub struct Registry<C> {
    entries: Vec<ProbeRegistration<C>>,
}

impl<C> Registry<C> {
    /// Build a registry from an explicit list of registrations.
    pub fn new(entries: Vec<ProbeRegistration<C>>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name) {
                return Err(RegistryError::DuplicateName(entry.name.to_string()));
            }
        }
        Ok(Self { entries })
    }

    /// Registered probe names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    pub fn registrations(&self) -> &[ProbeRegistration<C>] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Default enablement of a probe, if registered.
    pub fn is_default_enabled(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.default_enabled)
    }

    /// Names that end up enabled once `overrides` are applied to the defaults.
    pub fn resolve(&self, overrides: &BTreeMap<String, bool>) -> Result<Vec<&'static str>, RegistryError> {
        if let Some(unknown) = overrides.keys().find(|name| !self.contains(name)) {
            return Err(RegistryError::UnknownProbe(unknown.clone()));
        }

        Ok(self
            .entries
            .iter()
            .filter(|e| overrides.get(e.name).copied().unwrap_or(e.default_enabled))
            .map(|e| e.name)
            .collect())
    }

    /// Construct one instance per enabled probe.
    ///
    /// Defaults are applied first, then the per-name `overrides` (`true` forces a
    /// probe on, `false` forces it off). A probe that is only enabled by default
    /// and fails to construct is skipped with a warning; a force-enabled one
    /// aborts instantiation.
    pub fn instantiate(
        &self,
        overrides: &BTreeMap<String, bool>,
        ctx: &C,
    ) -> Result<Vec<ProbeInstance>, RegistryError> {
        let enabled = self.resolve(overrides)?;
        let mut instances = Vec::with_capacity(enabled.len());

        for entry in self.entries.iter().filter(|e| enabled.contains(&e.name)) {
            let forced = overrides.get(entry.name).copied() == Some(true);
            match (entry.constructor)(ctx) {
                Ok(probe) => {
                    debug_assert_eq!(
                        probe.name(),
                        entry.name,
                        "probe name must match its registration name"
                    );
                    debug!(probe = entry.name, forced, "Probe created");
                    instances.push(ProbeInstance::new(entry.name, probe));
                }
                Err(source) if forced => {
                    return Err(RegistryError::RequiredProbeFailed {
                        name: entry.name.to_string(),
                        source,
                    });
                }
                Err(e) => {
                    warn!(probe = entry.name, error = %e, "Skipping probe that could not be created");
                }
            }
        }

        info!(
            probes = ?instances.iter().map(ProbeInstance::name).collect::<Vec<_>>(),
            "Enabled probes"
        );

        Ok(instances)
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SampleSink;

    struct Named(&'static str);

    impl Probe for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn update(&mut self, _sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Ctx;

    fn new_alpha(_: &Ctx) -> Result<Box<dyn Probe>, ProbeError> {
        Ok(Box::new(Named("alpha")))
    }

    fn new_beta(_: &Ctx) -> Result<Box<dyn Probe>, ProbeError> {
        Ok(Box::new(Named("beta")))
    }

    fn new_broken(_: &Ctx) -> Result<Box<dyn Probe>, ProbeError> {
        Err(ProbeError::unsupported("not on this platform"))
    }

    fn registry() -> Registry<Ctx> {
        Registry::new(vec![
            ProbeRegistration::new("alpha", true, new_alpha),
            ProbeRegistration::new("beta", false, new_beta),
            ProbeRegistration::new("broken", true, new_broken),
        ])
        .unwrap()
    }

    fn names(instances: &[ProbeInstance]) -> Vec<&str> {
        instances.iter().map(ProbeInstance::name).collect()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = Registry::new(vec![
            ProbeRegistration::new("alpha", true, new_alpha),
            ProbeRegistration::new("alpha", false, new_beta),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateName(name)) if name == "alpha"));
    }

    #[test]
    fn test_defaults_apply_and_broken_default_is_skipped() {
        let instances = registry().instantiate(&BTreeMap::new(), &Ctx).unwrap();
        assert_eq!(names(&instances), vec!["alpha"]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "probe name must match its registration name")]
    fn test_mismatched_probe_name_caught_in_debug() {
        let registry = Registry::new(vec![ProbeRegistration::new("gamma", true, new_alpha)]).unwrap();
        let _ = registry.instantiate(&BTreeMap::new(), &Ctx);
    }

    #[test]
    fn test_force_enable_default_disabled() {
        let overrides = BTreeMap::from([("beta".to_string(), true)]);
        let instances = registry().instantiate(&overrides, &Ctx).unwrap();
        assert_eq!(names(&instances), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_force_disable_default_enabled() {
        let overrides = BTreeMap::from([("alpha".to_string(), false)]);
        let instances = registry().instantiate(&overrides, &Ctx).unwrap();
        assert!(instances.is_empty());
    }

    #[test]
    fn test_force_enabled_constructor_failure_is_fatal() {
        let overrides = BTreeMap::from([("broken".to_string(), true)]);
        let result = registry().instantiate(&overrides, &Ctx);
        assert!(matches!(
            result,
            Err(RegistryError::RequiredProbeFailed { ref name, .. }) if name == "broken"
        ));
    }

    #[test]
    fn test_unknown_override_rejected() {
        let overrides = BTreeMap::from([("gamma".to_string(), true)]);
        let result = registry().instantiate(&overrides, &Ctx);
        assert!(matches!(result, Err(RegistryError::UnknownProbe(name)) if name == "gamma"));
    }

    #[test]
    fn test_resolve_keeps_registration_order() {
        let overrides = BTreeMap::from([("beta".to_string(), true), ("broken".to_string(), false)]);
        let enabled = registry().resolve(&overrides).unwrap();
        assert_eq!(enabled, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_lookup_helpers() {
        let registry = registry();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["alpha", "beta", "broken"]);
        assert_eq!(registry.is_default_enabled("beta"), Some(false));
        assert_eq!(registry.is_default_enabled("nope"), None);
        assert!(registry.contains("alpha"));
    }
}
