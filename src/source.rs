//! Event sources: where bodies, units and links come from.
//!
//! The tracking manager never owns the world it tracks. It is told about
//! changes through its event handlers and asks an [`EventSource`] for the
//! current state whenever it has to rebuild part of the hierarchy.
//!
//! [`World`] is an in-memory source that can be loaded from a TOML file. It
//! also carries a script of [`SourceEvent`]s for replay.

use crate::model::{BodyId, DefinitionId, LinkKind, Unit};
use crate::rules::DefinitionCatalog;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read access to the current state of the tracked world
pub trait EventSource: Send + Sync {
    /// Every body that currently exists
    fn bodies(&self) -> Vec<BodyId>;

    /// Units currently held by a body; empty for unknown bodies
    fn units(&self, body: BodyId) -> Vec<Unit>;

    /// Bodies directly linked to `body` by links of `kind`
    fn linked_bodies(&self, body: BodyId, kind: LinkKind) -> Vec<BodyId>;

    /// Human readable name of a body
    fn body_name(&self, body: BodyId) -> String {
        format!("body {body}")
    }

    /// Unit definitions rule predicates may refer to
    fn catalog(&self) -> DefinitionCatalog;
}

/// A change reported by an event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SourceEvent {
    /// A body appeared, already holding `units`
    BodyCreated {
        body: BodyId,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        units: Vec<Unit>,
    },
    /// A body disappeared together with its units and links
    BodyDestroyed { body: BodyId },
    /// A unit was added to a body
    UnitAdded { body: BodyId, unit: Unit },
    /// A unit was removed from a body
    UnitRemoved { body: BodyId, unit: Unit },
    /// Two bodies were linked
    Linked { a: BodyId, b: BodyId, kind: LinkKind },
    /// A link between two bodies was removed
    Unlinked { a: BodyId, b: BodyId, kind: LinkKind },
    /// Run a notification pass at this point of a replay
    Notify,
}

impl SourceEvent {
    /// Bodies the event touches
    #[must_use]
    pub fn bodies(&self) -> Vec<BodyId> {
        match self {
            Self::BodyCreated { body, .. }
            | Self::BodyDestroyed { body }
            | Self::UnitAdded { body, .. }
            | Self::UnitRemoved { body, .. } => vec![*body],
            Self::Linked { a, b, .. } | Self::Unlinked { a, b, .. } => vec![*a, *b],
            Self::Notify => Vec::new(),
        }
    }
}

/// Body entry of a world file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodySpec {
    pub id: BodyId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub units: Vec<Unit>,
}

/// Link entry of a world file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: BodyId,
    pub b: BodyId,
    pub kind: LinkKind,
}

/// On-disk layout of a world file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldFile {
    /// Definitions known even if no unit uses them yet
    #[serde(default)]
    pub definitions: Vec<DefinitionId>,
    #[serde(default)]
    pub bodies: Vec<BodySpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
    /// Replay script
    #[serde(default)]
    pub events: Vec<SourceEvent>,
}

#[derive(Debug, Clone)]
struct BodyState {
    name: Option<String>,
    units: Vec<Unit>,
}

/// Unordered pair of bodies plus link kind
type LinkKey = (BodyId, BodyId, LinkKind);

fn link_key(a: BodyId, b: BodyId, kind: LinkKind) -> LinkKey {
    if a <= b { (a, b, kind) } else { (b, a, kind) }
}

#[derive(Debug, Default)]
struct WorldState {
    bodies: BTreeMap<BodyId, BodyState>,
    /// Multiplicity of each link; parallel links are allowed
    links: HashMap<LinkKey, usize>,
    catalog: DefinitionCatalog,
}

/// In-memory event source
///
/// Mutators keep the world in step with the [`SourceEvent`] they describe;
/// apply an event here before delivering it to the tracking manager.
#[derive(Debug, Default)]
pub struct World {
    state: RwLock<WorldState>,
    script: Vec<SourceEvent>,
}

impl World {
    /// Create an empty world
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a world from its file layout
    ///
    /// # Errors
    ///
    /// Returns an error if a body id repeats or a link names an unknown body
    pub fn from_file(file: WorldFile) -> Result<Self> {
        let world = Self::new();
        {
            let mut state = world.write();
            for definition in file.definitions {
                state.catalog.insert(definition);
            }
        }

        for body in file.bodies {
            if world.contains(body.id) {
                anyhow::bail!("Duplicate body id {} in world file", body.id);
            }
            world.add_body(body.id, body.name, body.units);
        }
        for link in file.links {
            world
                .link(link.a, link.b, link.kind)
                .with_context(|| format!("Invalid link {} - {}", link.a, link.b))?;
        }

        {
            let mut state = world.write();
            for event in &file.events {
                match event {
                    SourceEvent::BodyCreated { units, .. } => {
                        for unit in units {
                            state.catalog.insert(unit.definition.clone());
                        }
                    }
                    SourceEvent::UnitAdded { unit, .. } => {
                        state.catalog.insert(unit.definition.clone());
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            script: file.events,
            ..world
        })
    }

    /// Parse a world from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid world file
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: WorldFile = toml::from_str(content).context("Failed to parse world file")?;
        Self::from_file(file)
    }

    /// Load a world file from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = crate::config::parser::read_text_file(path)?;
        Self::from_toml_str(&content).with_context(|| format!("In world file {}", path.display()))
    }

    /// Scripted events loaded with the world
    #[must_use]
    pub fn script(&self) -> &[SourceEvent] {
        &self.script
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a body exists
    #[must_use]
    pub fn contains(&self, body: BodyId) -> bool {
        self.read().bodies.contains_key(&body)
    }

    /// Add a body, replacing any body with the same id
    pub fn add_body(&self, body: BodyId, name: Option<String>, units: Vec<Unit>) {
        let mut state = self.write();
        for unit in &units {
            state.catalog.insert(unit.definition.clone());
        }
        state.bodies.insert(body, BodyState { name, units });
    }

    /// Remove a body and every link touching it
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not exist
    pub fn remove_body(&self, body: BodyId) -> Result<()> {
        let mut state = self.write();
        if state.bodies.remove(&body).is_none() {
            anyhow::bail!("Unknown body {body}");
        }
        state.links.retain(|(a, b, _), _| *a != body && *b != body);
        Ok(())
    }

    /// Add a unit to a body
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not exist
    pub fn add_unit(&self, body: BodyId, unit: Unit) -> Result<()> {
        let mut state = self.write();
        state.catalog.insert(unit.definition.clone());
        let entry = state
            .bodies
            .get_mut(&body)
            .ok_or_else(|| anyhow::anyhow!("Unknown body {body}"))?;
        entry.units.push(unit);
        Ok(())
    }

    /// Remove one matching unit from a body
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not exist or does not hold the unit
    pub fn remove_unit(&self, body: BodyId, unit: &Unit) -> Result<()> {
        let mut state = self.write();
        let entry = state
            .bodies
            .get_mut(&body)
            .ok_or_else(|| anyhow::anyhow!("Unknown body {body}"))?;
        let position = entry
            .units
            .iter()
            .position(|u| u == unit)
            .ok_or_else(|| anyhow::anyhow!("Body {body} holds no {}", unit.definition))?;
        entry.units.remove(position);
        Ok(())
    }

    /// Link two bodies
    ///
    /// # Errors
    ///
    /// Returns an error if either body does not exist or both are the same
    pub fn link(&self, a: BodyId, b: BodyId, kind: LinkKind) -> Result<()> {
        let mut state = self.write();
        if a == b {
            anyhow::bail!("Cannot link body {a} to itself");
        }
        for body in [a, b] {
            if !state.bodies.contains_key(&body) {
                anyhow::bail!("Unknown body {body}");
            }
        }
        *state.links.entry(link_key(a, b, kind)).or_insert(0) += 1;
        Ok(())
    }

    /// Remove one link between two bodies
    ///
    /// # Errors
    ///
    /// Returns an error if no such link exists
    pub fn unlink(&self, a: BodyId, b: BodyId, kind: LinkKind) -> Result<()> {
        let mut state = self.write();
        let key = link_key(a, b, kind);
        match state.links.get_mut(&key) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                state.links.remove(&key);
            }
            None => anyhow::bail!("No {kind:?} link between {a} and {b}"),
        }
        Ok(())
    }

    /// Apply an event to the world
    ///
    /// # Errors
    ///
    /// Returns an error if the event does not fit the current state
    pub fn apply(&self, event: &SourceEvent) -> Result<()> {
        match event {
            SourceEvent::BodyCreated { body, name, units } => {
                if self.contains(*body) {
                    anyhow::bail!("Body {body} already exists");
                }
                self.add_body(*body, name.clone(), units.clone());
                Ok(())
            }
            SourceEvent::BodyDestroyed { body } => self.remove_body(*body),
            SourceEvent::UnitAdded { body, unit } => self.add_unit(*body, unit.clone()),
            SourceEvent::UnitRemoved { body, unit } => self.remove_unit(*body, unit),
            SourceEvent::Linked { a, b, kind } => self.link(*a, *b, *kind),
            SourceEvent::Unlinked { a, b, kind } => self.unlink(*a, *b, *kind),
            SourceEvent::Notify => Ok(()),
        }
    }

    /// Total number of units across all bodies
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.read().bodies.values().map(|body| body.units.len()).sum()
    }
}

impl EventSource for World {
    fn bodies(&self) -> Vec<BodyId> {
        self.read().bodies.keys().copied().collect()
    }

    fn units(&self, body: BodyId) -> Vec<Unit> {
        self.read()
            .bodies
            .get(&body)
            .map(|state| state.units.clone())
            .unwrap_or_default()
    }

    fn linked_bodies(&self, body: BodyId, kind: LinkKind) -> Vec<BodyId> {
        let state = self.read();
        let mut neighbours: Vec<BodyId> = state
            .links
            .keys()
            .filter(|(_, _, k)| *k == kind)
            .filter_map(|(a, b, _)| match (*a == body, *b == body) {
                (true, false) => Some(*b),
                (false, true) => Some(*a),
                _ => None,
            })
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();
        neighbours
    }

    fn body_name(&self, body: BodyId) -> String {
        self.read()
            .bodies
            .get(&body)
            .and_then(|state| state.name.clone())
            .unwrap_or_else(|| format!("body {body}"))
    }

    fn catalog(&self) -> DefinitionCatalog {
        self.read().catalog.clone()
    }
}
