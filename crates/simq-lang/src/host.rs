//! The boundary to the host's entity graph and simulation state.
//!
//! Expressions read and write named properties on external entities the
//! engine knows nothing about. Everything behind these traits is resolved at
//! parse time into bound callbacks ([`Accessor`], [`Assigner`]) so that
//! evaluation does not repeat name lookups the host already performed.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::eval::value::Value;
use crate::validate::Validation;

/// Opaque identity of an external entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// A nullable reference to an external entity.
///
/// Equality is reference identity, never structural: two references are equal
/// exactly when they name the same entity (or are both null).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct EntityRef(Option<EntityId>);

impl EntityRef {
    pub const NULL: EntityRef = EntityRef(None);

    pub fn new(id: EntityId) -> Self {
        EntityRef(Some(id))
    }

    pub fn id(&self) -> Option<EntityId> {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "entity#{}", id.0),
            None => write!(f, "null"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum HostError {
    #[error("\"{0}\" is not defined")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// A bound property reader.
///
/// Obtained once at parse time; `read` may be called many times, possibly
/// concurrently, with whatever entity the target expression evaluated to.
pub trait Accessor: Send + Sync {
    fn read(&self, entity: EntityRef) -> Result<Value, HostError>;

    /// Static judgment for the property's value, when the host knows it.
    fn static_judgment(&self) -> Validation {
        Validation::Undecidable
    }
}

/// A bound property writer, the assignment counterpart of [`Accessor`].
pub trait Assigner: Send + Sync {
    /// `indices` is empty for plain `e.prop = v` and carries the evaluated
    /// index arguments for `e.prop(i) = v`.
    fn assign(&self, entity: EntityRef, indices: &[Value], value: Value) -> Result<(), HostError>;
}

pub trait EntityGraph: Send + Sync {
    /// Resolves an `[EntityName]` literal at parse time.
    fn resolve_entity(&self, name: &str) -> Result<EntityRef, HostError>;

    /// Late-bound accessor: looks the property up on whatever entity it is
    /// handed, on every read.
    fn accessor(&self, name: &str) -> Result<Arc<dyn Accessor>, HostError>;

    /// Accessor pre-bound to a specific entity known at parse time. Hosts may
    /// return a caching accessor here when the property is declared cacheable.
    fn const_accessor(&self, entity: EntityRef, name: &str) -> Result<Arc<dyn Accessor>, HostError>;

    fn assigner(&self, name: &str) -> Result<Arc<dyn Assigner>, HostError>;

    fn const_assigner(&self, entity: EntityRef, name: &str)
    -> Result<Arc<dyn Assigner>, HostError>;

    /// Current name of an entity, for display purposes.
    fn entity_name(&self, _entity: EntityRef) -> Option<String> {
        None
    }
}

/// Graph for hosts without an entity model; every resolution fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEntities;

impl EntityGraph for NoEntities {
    fn resolve_entity(&self, name: &str) -> Result<EntityRef, HostError> {
        Err(HostError::NotFound(name.to_string()))
    }

    fn accessor(&self, name: &str) -> Result<Arc<dyn Accessor>, HostError> {
        Err(HostError::NotFound(name.to_string()))
    }

    fn const_accessor(
        &self,
        _entity: EntityRef,
        name: &str,
    ) -> Result<Arc<dyn Accessor>, HostError> {
        Err(HostError::NotFound(name.to_string()))
    }

    fn assigner(&self, name: &str) -> Result<Arc<dyn Assigner>, HostError> {
        Err(HostError::NotFound(name.to_string()))
    }

    fn const_assigner(
        &self,
        _entity: EntityRef,
        name: &str,
    ) -> Result<Arc<dyn Assigner>, HostError> {
        Err(HostError::NotFound(name.to_string()))
    }
}

/// One pseudo-random stream, identified by `(seed, function, caller)`.
pub trait RandomStream: Send + Sync {
    /// Next draw, uniform on `[0, 1)`.
    fn next_uniform(&self) -> f64;
}

pub trait RandomSource: Send + Sync {
    /// Whether a simulation run is currently active. Outside a run the
    /// distribution functions return zero instead of drawing.
    fn run_active(&self) -> bool;

    fn stream(&self, seed: i64, function: &str, caller: &str) -> Arc<dyn RandomStream>;
}

/// Random source for static evaluation: no run is ever active.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimulation;

struct DeadStream;

impl RandomStream for DeadStream {
    fn next_uniform(&self) -> f64 {
        0.0
    }
}

impl RandomSource for NoSimulation {
    fn run_active(&self) -> bool {
        false
    }

    fn stream(&self, _seed: i64, _function: &str, _caller: &str) -> Arc<dyn RandomStream> {
        Arc::new(DeadStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_identity() {
        let a = EntityRef::new(EntityId(1));
        let b = EntityRef::new(EntityId(1));
        let c = EntityRef::new(EntityId(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, EntityRef::NULL);
        assert!(EntityRef::NULL.is_null());
        assert_eq!(format!("{}", a), "entity#1");
        assert_eq!(format!("{}", EntityRef::NULL), "null");
    }

    #[test]
    fn test_no_entities_graph() {
        let graph = NoEntities;
        assert_eq!(
            graph.resolve_entity("Box1"),
            Err(HostError::NotFound("Box1".to_string()))
        );
        assert!(graph.accessor("attr").is_err());
    }

    #[test]
    fn test_no_simulation() {
        let random = NoSimulation;
        assert!(!random.run_active());
        assert_eq!(random.stream(0, "normal", "").next_uniform(), 0.0);
    }
}
