//! Bidirectional discriminator registry.
//!
//! The registry maps wire type-tags to concrete runtime types and back, and
//! tracks which types are "discriminated" (i.e. must emit/consult a tag at
//! all, because some descendant registered one). The actual type to
//! instantiate during decode is resolved by intersecting a tag's type set
//! with the types assignable to the nominal type; the codec never guesses.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::error::{MappingError, MappingResult};
use crate::model::TypeKey;

/// Default element name the discriminator tag is written under.
pub const DEFAULT_DISCRIMINATOR_ELEMENT: &str = "_t";

/// How the discriminator element is rendered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConventionKind {
    /// A single tag naming the actual concrete type.
    Scalar,
    /// An array of tags from the hierarchy root down to the actual type.
    Hierarchy,
}

/// Per-type discriminator convention: the element name the tag lives under
/// and its rendering. Conventions are resolved lazily, inheriting from the
/// nearest ancestor with a declared convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscriminatorConvention {
    /// Wire element name the tag is stored under.
    pub element_name: String,
    /// Scalar or hierarchy rendering.
    pub kind: ConventionKind,
}

impl Default for DiscriminatorConvention {
    fn default() -> Self {
        Self {
            element_name: DEFAULT_DISCRIMINATOR_ELEMENT.to_string(),
            kind: ConventionKind::Scalar,
        }
    }
}

impl DiscriminatorConvention {
    /// The hierarchy convention under the default element name.
    pub fn hierarchy() -> Self {
        Self {
            element_name: DEFAULT_DISCRIMINATOR_ELEMENT.to_string(),
            kind: ConventionKind::Hierarchy,
        }
    }
}

#[derive(Default)]
struct DiscState {
    by_tag: HashMap<String, Vec<TypeKey>>,
    tags: HashMap<TypeKey, String>,
    discriminated: HashSet<TypeKey>,
    declared_conventions: HashMap<TypeKey, DiscriminatorConvention>,
    resolved_conventions: HashMap<TypeKey, DiscriminatorConvention>,
}

/// Bidirectional map between runtime types and their wire type-tags.
///
/// The declared inheritance structure is fixed when the catalog freezes;
/// tag entries gain late additions only for ad hoc types the catalog
/// auto-describes. Convention resolution caches lazily and is safe under
/// concurrent first use.
pub struct DiscriminatorRegistry {
    bases: HashMap<TypeKey, TypeKey>,
    abstracts: HashSet<TypeKey>,
    state: RwLock<DiscState>,
}

impl DiscriminatorRegistry {
    pub(crate) fn new(bases: HashMap<TypeKey, TypeKey>, abstracts: HashSet<TypeKey>) -> Self {
        Self {
            bases,
            abstracts,
            state: RwLock::new(DiscState::default()),
        }
    }

    /// Registers `tag` for `type_key` and marks the type and every ancestor
    /// as discriminated.
    ///
    /// # Errors
    ///
    /// Rejects registration on abstract types; tags belong on concrete
    /// descendants.
    pub fn add_discriminator(
        &self,
        type_key: TypeKey,
        tag: impl Into<String>,
    ) -> MappingResult<()> {
        if self.abstracts.contains(&type_key) {
            return Err(MappingError::Configuration(format!(
                "cannot register discriminator on abstract type {}; register it on a concrete descendant",
                type_key.name()
            )));
        }
        let tag = tag.into();
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let types = state.by_tag.entry(tag.clone()).or_default();
        if !types.contains(&type_key) {
            types.push(type_key);
        }
        state.tags.insert(type_key, tag);
        let mut current = Some(type_key);
        while let Some(key) = current {
            state.discriminated.insert(key);
            current = self.bases.get(&key).copied();
        }
        Ok(())
    }

    pub(crate) fn set_convention(&self, type_key: TypeKey, convention: DiscriminatorConvention) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        state.declared_conventions.insert(type_key, convention);
        state.resolved_conventions.clear();
    }

    /// Returns the tag registered for a type, if any.
    pub fn tag_of(&self, type_key: TypeKey) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tags
            .get(&type_key)
            .cloned()
    }

    /// True when the type (or one of its descendants) registered a tag, so
    /// the codec must emit/consult a discriminator element for it.
    pub fn is_discriminated(&self, type_key: TypeKey) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .discriminated
            .contains(&type_key)
    }

    /// Returns the declared base of a type, if any.
    pub fn base_of(&self, type_key: TypeKey) -> Option<TypeKey> {
        self.bases.get(&type_key).copied()
    }

    /// True when `candidate` equals `nominal` or reaches it through the
    /// declared base chain.
    pub fn is_assignable(&self, candidate: TypeKey, nominal: TypeKey) -> bool {
        let mut current = Some(candidate);
        while let Some(key) = current {
            if key == nominal {
                return true;
            }
            current = self.bases.get(&key).copied();
        }
        false
    }

    /// Resolves the actual concrete type for a decode.
    ///
    /// Without a tag the nominal type is returned unchanged. With a tag, the
    /// tag's type set is intersected with the types assignable to the
    /// nominal type; zero matches is a fatal unknown-discriminator error and
    /// more than one a fatal ambiguous-discriminator error.
    pub fn lookup_actual_type(
        &self,
        nominal: TypeKey,
        tag: Option<&str>,
    ) -> MappingResult<TypeKey> {
        let Some(tag) = tag else {
            return Ok(nominal);
        };
        let state = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let candidates: Vec<TypeKey> = state
            .by_tag
            .get(tag)
            .map(|types| {
                types
                    .iter()
                    .copied()
                    .filter(|t| self.is_assignable(*t, nominal))
                    .collect()
            })
            .unwrap_or_default();
        match candidates.as_slice() {
            [] => Err(MappingError::UnknownDiscriminator(
                tag.to_string(),
                nominal.name().to_string(),
            )),
            [only] => Ok(*only),
            _ => Err(MappingError::AmbiguousDiscriminator(
                tag.to_string(),
                nominal.name().to_string(),
            )),
        }
    }

    /// Returns the convention for a type, resolving and caching it on first
    /// use: a declared convention wins, else the nearest ancestor's resolved
    /// convention, else the default.
    pub fn convention_for(&self, type_key: TypeKey) -> DiscriminatorConvention {
        {
            let state = self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(resolved) = state.resolved_conventions.get(&type_key) {
                return resolved.clone();
            }
        }
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut current = Some(type_key);
        let mut resolved = None;
        while let Some(key) = current {
            if let Some(declared) = state.declared_conventions.get(&key) {
                resolved = Some(declared.clone());
                break;
            }
            current = self.bases.get(&key).copied();
        }
        let convention = resolved.unwrap_or_default();
        state
            .resolved_conventions
            .insert(type_key, convention.clone());
        convention
    }

    /// Returns the tag chain from the hierarchy root down to `type_key`,
    /// used by the hierarchy convention.
    pub fn hierarchy_tags(&self, type_key: TypeKey) -> Vec<String> {
        let state = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut chain = Vec::new();
        let mut current = Some(type_key);
        while let Some(key) = current {
            if let Some(tag) = state.tags.get(&key) {
                chain.push(tag.clone());
            }
            current = self.bases.get(&key).copied();
        }
        chain.reverse();
        chain
    }
}

impl std::fmt::Debug for DiscriminatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DiscriminatorRegistry")
            .field("tags", &state.tags.len())
            .field("discriminated", &state.discriminated.len())
            .finish()
    }
}
