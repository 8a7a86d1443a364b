//! Test doubles for the simq expression engine.
//!
//! [`MockGraph`] is an in-memory entity graph with per-property read and
//! write counters, so tests can observe accessor binding, lazy operators and
//! assignments. [`ScriptedRandom`] replays a fixed sequence of uniform draws
//! and records which streams were requested.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use rustc_hash::FxHashMap;
use simq_lang::{
    Accessor, Assigner, EntityGraph, EntityId, EntityRef, EvalContext, HostError, ParseContext,
    RandomSource, RandomStream, Value,
};
use simq_units::SiUnits;

#[derive(Default)]
struct GraphState {
    names: FxHashMap<String, EntityRef>,
    properties: FxHashMap<(u64, String), Value>,
    reads: FxHashMap<(u64, String), u64>,
    writes: FxHashMap<(u64, String), u64>,
    custom: FxHashMap<String, Arc<dyn Accessor>>,
    next_id: u64,
}

/// An in-memory entity graph.
#[derive(Clone, Default)]
pub struct MockGraph {
    state: Arc<RwLock<GraphState>>,
}

impl MockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity(&self, name: &str) -> EntityRef {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let entity = EntityRef::new(EntityId(state.next_id));
        state.names.insert(name.to_string(), entity);
        entity
    }

    pub fn set(&self, entity: EntityRef, property: &str, value: Value) {
        if let Some(id) = entity.id() {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state
                .properties
                .insert((id.0, property.to_string()), value);
        }
    }

    pub fn get(&self, entity: EntityRef, property: &str) -> Option<Value> {
        let id = entity.id()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.properties.get(&(id.0, property.to_string())).cloned()
    }

    /// Number of accessor reads of `property` on `entity`.
    pub fn reads(&self, entity: EntityRef, property: &str) -> u64 {
        entity
            .id()
            .and_then(|id| {
                let state = self.state.read().unwrap_or_else(|e| e.into_inner());
                state.reads.get(&(id.0, property.to_string())).copied()
            })
            .unwrap_or(0)
    }

    /// Number of assigner writes of `property` on `entity`.
    pub fn writes(&self, entity: EntityRef, property: &str) -> u64 {
        entity
            .id()
            .and_then(|id| {
                let state = self.state.read().unwrap_or_else(|e| e.into_inner());
                state.writes.get(&(id.0, property.to_string())).copied()
            })
            .unwrap_or(0)
    }

    /// Installs a custom accessor served for `property` regardless of
    /// entity; used to script property behavior (cycles, failures, ...).
    pub fn set_accessor(&self, property: &str, accessor: Arc<dyn Accessor>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.custom.insert(property.to_string(), accessor);
    }
}

struct MockAccessor {
    state: Arc<RwLock<GraphState>>,
    property: String,
}

impl Accessor for MockAccessor {
    fn read(&self, entity: EntityRef) -> Result<Value, HostError> {
        let id = entity
            .id()
            .ok_or_else(|| HostError::Other("null entity".to_string()))?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state
            .reads
            .entry((id.0, self.property.clone()))
            .or_insert(0) += 1;
        state
            .properties
            .get(&(id.0, self.property.clone()))
            .cloned()
            .ok_or_else(|| HostError::NotFound(self.property.clone()))
    }
}

struct MockAssigner {
    state: Arc<RwLock<GraphState>>,
    property: String,
}

impl Assigner for MockAssigner {
    fn assign(&self, entity: EntityRef, indices: &[Value], value: Value) -> Result<(), HostError> {
        let id = entity
            .id()
            .ok_or_else(|| HostError::Other("null entity".to_string()))?;
        let key = if indices.is_empty() {
            self.property.clone()
        } else {
            let joined = indices
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            format!("{}({})", self.property, joined)
        };
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state.writes.entry((id.0, key.clone())).or_insert(0) += 1;
        state.properties.insert((id.0, key), value);
        Ok(())
    }
}

impl EntityGraph for MockGraph {
    fn resolve_entity(&self, name: &str) -> Result<EntityRef, HostError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .names
            .get(name)
            .copied()
            .ok_or_else(|| HostError::NotFound(name.to_string()))
    }

    fn accessor(&self, name: &str) -> Result<Arc<dyn Accessor>, HostError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if let Some(custom) = state.custom.get(name) {
            return Ok(Arc::clone(custom));
        }
        Ok(Arc::new(MockAccessor {
            state: Arc::clone(&self.state),
            property: name.to_string(),
        }))
    }

    fn const_accessor(
        &self,
        _entity: EntityRef,
        name: &str,
    ) -> Result<Arc<dyn Accessor>, HostError> {
        self.accessor(name)
    }

    fn assigner(&self, name: &str) -> Result<Arc<dyn Assigner>, HostError> {
        Ok(Arc::new(MockAssigner {
            state: Arc::clone(&self.state),
            property: name.to_string(),
        }))
    }

    fn const_assigner(
        &self,
        _entity: EntityRef,
        name: &str,
    ) -> Result<Arc<dyn Assigner>, HostError> {
        self.assigner(name)
    }

    fn entity_name(&self, entity: EntityRef) -> Option<String> {
        let id = entity.id()?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .names
            .iter()
            .find(|(_, e)| e.id() == Some(id))
            .map(|(name, _)| name.clone())
    }
}

/// An accessor built from a closure.
pub struct FnAccessor<F>(pub F);

impl<F> Accessor for FnAccessor<F>
where
    F: Fn(EntityRef) -> Result<Value, HostError> + Send + Sync,
{
    fn read(&self, entity: EntityRef) -> Result<Value, HostError> {
        (self.0)(entity)
    }
}

/// Replays a fixed sequence of uniform draws and records every stream
/// request as `(seed, function, caller)`.
pub struct ScriptedRandom {
    active: bool,
    draws: Arc<Mutex<VecDeque<f64>>>,
    requests: Mutex<Vec<(i64, String, String)>>,
}

impl ScriptedRandom {
    /// An inactive source: `run_active` is false, so distribution functions
    /// return zero.
    pub fn inactive() -> Self {
        Self {
            active: false,
            draws: Arc::new(Mutex::new(VecDeque::new())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// An active source replaying `draws`; once exhausted, streams return
    /// 0.5.
    pub fn active(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            active: true,
            draws: Arc::new(Mutex::new(draws.into_iter().collect())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(i64, String, String)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

struct ScriptedStream {
    draws: Arc<Mutex<VecDeque<f64>>>,
}

impl RandomStream for ScriptedStream {
    fn next_uniform(&self) -> f64 {
        self.draws
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(0.5)
    }
}

impl RandomSource for ScriptedRandom {
    fn run_active(&self) -> bool {
        self.active
    }

    fn stream(&self, seed: i64, function: &str, caller: &str) -> Arc<dyn RandomStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((seed, function.to_string(), caller.to_string()));
        Arc::new(ScriptedStream {
            draws: Arc::clone(&self.draws),
        })
    }
}

/// A ready-made host: SI units, an empty mock graph, and an inactive random
/// source.
pub struct TestHost {
    pub units: SiUnits,
    pub graph: MockGraph,
    pub random: ScriptedRandom,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            units: SiUnits::new(),
            graph: MockGraph::new(),
            random: ScriptedRandom::inactive(),
        }
    }

    pub fn parse_ctx(&self) -> ParseContext<'_> {
        ParseContext::new(&self.units, &self.graph)
    }

    pub fn eval_ctx(&self) -> EvalContext<'_> {
        EvalContext::new(&self.units, &self.graph, &self.random)
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_graph_counters() {
        let graph = MockGraph::new();
        let e = graph.add_entity("Box1");
        graph.set(e, "mass", Value::from(5.0));

        let accessor = graph.accessor("mass").unwrap();
        assert_eq!(accessor.read(e).unwrap(), Value::from(5.0));
        assert_eq!(accessor.read(e).unwrap(), Value::from(5.0));
        assert_eq!(graph.reads(e, "mass"), 2);

        let assigner = graph.assigner("mass").unwrap();
        assigner.assign(e, &[], Value::from(7.0)).unwrap();
        assert_eq!(graph.writes(e, "mass"), 1);
        assert_eq!(graph.get(e, "mass"), Some(Value::from(7.0)));
    }

    #[test]
    fn test_unknown_entity() {
        let graph = MockGraph::new();
        assert!(graph.resolve_entity("Nope").is_err());
    }

    #[test]
    fn test_scripted_random() {
        let random = ScriptedRandom::active([0.25, 0.75]);
        assert!(random.run_active());
        let stream = random.stream(7, "uniform", "Server1");
        assert_eq!(stream.next_uniform(), 0.25);
        assert_eq!(stream.next_uniform(), 0.75);
        assert_eq!(stream.next_uniform(), 0.5);
        assert_eq!(
            random.requests(),
            vec![(7, "uniform".to_string(), "Server1".to_string())]
        );
    }
}
