// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Static command table describing every property a device exposes.
//!
//! Commands without a dependency are core commands and are read on every
//! cycle. Dependent commands are only meaningful while their prerequisite
//! (always a core command) holds one of the allowed values.

use std::collections::{BTreeMap, BTreeSet};

use crate::device::response::{SyncError, SyncResult};
use crate::device::value::{PropertyName, Value};

/// Prerequisite gating a dependent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub prerequisite: PropertyName,
    pub allowed: BTreeSet<Value>,
}

impl Dependency {
    /// An unknown prerequisite value never satisfies the dependency.
    pub fn is_satisfied_by(&self, value: Option<&Value>) -> bool {
        value.is_some_and(|v| self.allowed.contains(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: PropertyName,
    pub depends_on: Option<Dependency>,
}

impl CommandDescriptor {
    pub fn is_core(&self) -> bool {
        self.depends_on.is_none()
    }
}

/// Power/activity property and the values meaning "off".
#[derive(Debug, Clone)]
pub struct PowerSemantics {
    pub property: PropertyName,
    pub off_values: BTreeSet<Value>,
}

/// Signal-quality property and the value meaning "no signal".
#[derive(Debug, Clone)]
pub struct SignalSemantics {
    pub property: PropertyName,
    pub no_signal: Value,
}

/// Immutable lookup of command descriptors.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<PropertyName, CommandDescriptor>,
    core_order: Vec<PropertyName>,
    power: PowerSemantics,
    signal: SignalSemantics,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn describe(&self, name: &str) -> SyncResult<&CommandDescriptor> {
        self.commands
            .get(name)
            .ok_or_else(|| SyncError::UnknownCommand(PropertyName::from(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Core commands in read order, power property first.
    pub fn core_commands(&self) -> &[PropertyName] {
        &self.core_order
    }

    pub fn core_set(&self) -> BTreeSet<PropertyName> {
        self.core_order.iter().cloned().collect()
    }

    pub fn dependent_commands(&self) -> BTreeSet<PropertyName> {
        self.commands
            .values()
            .filter(|c| !c.is_core())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &PropertyName> {
        self.commands.keys()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn power(&self) -> &PowerSemantics {
        &self.power
    }

    pub fn signal(&self) -> &SignalSemantics {
        &self.signal
    }

    pub fn is_power_off(&self, value: &Value) -> bool {
        self.power.off_values.contains(value)
    }

    pub fn is_signal_lost(&self, value: &Value) -> bool {
        *value == self.signal.no_signal
    }
}

/// Builder collecting descriptors before validation.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<CommandDescriptor>,
    power: Option<PowerSemantics>,
    signal: Option<SignalSemantics>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the power/activity core command.
    pub fn power<V: Into<Value>>(
        mut self,
        name: impl Into<PropertyName>,
        off_values: impl IntoIterator<Item = V>,
    ) -> Self {
        let property = name.into();
        self.entries.push(CommandDescriptor {
            name: property.clone(),
            depends_on: None,
        });
        self.power = Some(PowerSemantics {
            property,
            off_values: off_values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declare the signal-quality core command.
    pub fn signal(mut self, name: impl Into<PropertyName>, no_signal: impl Into<Value>) -> Self {
        let property = name.into();
        self.entries.push(CommandDescriptor {
            name: property.clone(),
            depends_on: None,
        });
        self.signal = Some(SignalSemantics {
            property,
            no_signal: no_signal.into(),
        });
        self
    }

    /// Declare a core command.
    pub fn command(mut self, name: impl Into<PropertyName>) -> Self {
        self.entries.push(CommandDescriptor {
            name: name.into(),
            depends_on: None,
        });
        self
    }

    /// Declare a command readable only while `prerequisite` holds one of `allowed`.
    pub fn dependent<V: Into<Value>>(
        mut self,
        name: impl Into<PropertyName>,
        prerequisite: impl Into<PropertyName>,
        allowed: impl IntoIterator<Item = V>,
    ) -> Self {
        self.entries.push(CommandDescriptor {
            name: name.into(),
            depends_on: Some(Dependency {
                prerequisite: prerequisite.into(),
                allowed: allowed.into_iter().map(Into::into).collect(),
            }),
        });
        self
    }

    pub fn build(self) -> SyncResult<CommandRegistry> {
        let power = self
            .power
            .ok_or_else(|| SyncError::invalid_registry("power property not declared"))?;
        let signal = self
            .signal
            .ok_or_else(|| SyncError::invalid_registry("signal property not declared"))?;
        if power.property == signal.property {
            return Err(SyncError::invalid_registry(format!(
                "'{}' cannot be both the power and the signal property",
                power.property
            )));
        }
        if power.off_values.is_empty() {
            return Err(SyncError::invalid_registry(format!(
                "power property '{}' has no off values",
                power.property
            )));
        }

        let mut commands = BTreeMap::new();
        let mut core_order = vec![power.property.clone()];
        for entry in self.entries {
            if commands.contains_key(&entry.name) {
                return Err(SyncError::invalid_registry(format!(
                    "duplicate command '{}'",
                    entry.name
                )));
            }
            if entry.is_core() && entry.name != power.property {
                core_order.push(entry.name.clone());
            }
            commands.insert(entry.name.clone(), entry);
        }

        for command in commands.values() {
            let Some(dep) = command.depends_on.as_ref() else {
                continue;
            };
            let prerequisite = commands.get(&dep.prerequisite).ok_or_else(|| {
                SyncError::invalid_registry(format!(
                    "'{}' depends on unknown command '{}'",
                    command.name, dep.prerequisite
                ))
            })?;
            if !prerequisite.is_core() {
                return Err(SyncError::invalid_registry(format!(
                    "'{}' depends on '{}', which is itself dependent",
                    command.name, dep.prerequisite
                )));
            }
            if dep.allowed.is_empty() {
                return Err(SyncError::invalid_registry(format!(
                    "'{}' has an empty allowed-value set",
                    command.name
                )));
            }
        }

        Ok(CommandRegistry {
            commands,
            core_order,
            power,
            signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projector() -> CommandRegistry {
        CommandRegistry::builder()
            .command("input")
            .power("power", ["standby", "off"])
            .signal("signal", "none")
            .command("picture_mode")
            .dependent("brightness", "picture_mode", ["manual"])
            .dependent("hdr_processing", "picture_mode", ["hdr10", "hlg"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_core_order_starts_with_power() {
        let registry = projector();
        let core: Vec<&str> = registry.core_commands().iter().map(|n| n.as_str()).collect();
        assert_eq!(core, vec!["power", "input", "signal", "picture_mode"]);
    }

    #[test]
    fn test_partitioning() {
        let registry = projector();
        let dependents: Vec<String> = registry
            .dependent_commands()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(dependents, vec!["brightness", "hdr_processing"]);
        assert!(registry.describe("power").unwrap().is_core());
        assert!(!registry.describe("brightness").unwrap().is_core());
    }

    #[test]
    fn test_describe_unknown() {
        let registry = projector();
        assert_eq!(
            registry.describe("lens_memory"),
            Err(SyncError::UnknownCommand("lens_memory".into()))
        );
    }

    #[test]
    fn test_power_and_signal_semantics() {
        let registry = projector();
        assert!(registry.is_power_off(&Value::from("standby")));
        assert!(!registry.is_power_off(&Value::from("on")));
        assert!(registry.is_signal_lost(&Value::from("none")));
        assert!(!registry.is_signal_lost(&Value::from("ok")));
    }

    #[test]
    fn test_dependency_satisfaction() {
        let registry = projector();
        let dep = registry
            .describe("hdr_processing")
            .unwrap()
            .depends_on
            .clone()
            .unwrap();
        assert!(dep.is_satisfied_by(Some(&Value::from("hlg"))));
        assert!(!dep.is_satisfied_by(Some(&Value::from("natural"))));
        assert!(!dep.is_satisfied_by(None));
    }

    #[test]
    fn test_rejects_nested_dependency() {
        let err = CommandRegistry::builder()
            .power("power", ["standby"])
            .signal("signal", "none")
            .command("picture_mode")
            .dependent("brightness", "picture_mode", ["manual"])
            .dependent("brightness_step", "brightness", [1i64])
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRegistry(_)));
    }

    #[test]
    fn test_rejects_unknown_prerequisite() {
        let err = CommandRegistry::builder()
            .power("power", ["standby"])
            .signal("signal", "none")
            .dependent("brightness", "picture_mode", ["manual"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRegistry(_)));
    }

    #[test]
    fn test_rejects_duplicates_and_missing_power() {
        let dup = CommandRegistry::builder()
            .power("power", ["standby"])
            .signal("signal", "none")
            .command("power")
            .build();
        assert!(dup.is_err());

        let missing = CommandRegistry::builder().signal("signal", "none").build();
        assert!(missing.is_err());
    }
}
