//! Parameter mapping graph
//!
//! Mappings are declarative edges: N source parameters feed one or more
//! destinations through a pure transform, optionally behind a gate keyed to
//! another parameter. The graph is static after startup; declaration checks
//! shapes and acyclicity so runtime evaluation never sees a type error.
//!
//! Propagation is synchronous and recursive: an origin write fires every
//! mapping whose source set contains the origin, writes all outputs as a
//! batch, then recurses from each output that actually changed. Gate flips
//! alone do not re-fire a mapping; a participating source has to change.
//! Callers that toggle a gate and want dependents refreshed must re-trigger
//! a source themselves. That ordering is deliberate and load-bearing (it is
//! what keeps stereo-link toggles from stomping per-channel gains).

use std::collections::HashMap;

use ffmix_proto::{Kind, Signature, Value};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;
use tracing::debug;

use crate::gain;
use crate::params::{ParamId, ParameterStore, StoreError};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("mapping references undeclared parameter: {0}")]
    UnknownParameter(String),

    #[error("bad mapping shape for {transform}: {detail}")]
    Shape {
        transform: &'static str,
        detail: String,
    },

    #[error("mapping cycle through parameter: {0}")]
    Cycle(String),

    #[error("transform {transform} evaluation failed: {detail}")]
    Eval {
        transform: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gate predicate over the gate parameter's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum GateTest {
    Truthy,
    Falsy,
    Equals(Value),
}

/// A mapping fires only while its gate parameter passes the test.
#[derive(Debug, Clone)]
pub struct Gate {
    pub param: String,
    pub test: GateTest,
}

impl Gate {
    pub fn truthy(param: impl Into<String>) -> Self {
        Self { param: param.into(), test: GateTest::Truthy }
    }

    pub fn falsy(param: impl Into<String>) -> Self {
        Self { param: param.into(), test: GateTest::Falsy }
    }

    pub fn equals(param: impl Into<String>, value: Value) -> Self {
        Self { param: param.into(), test: GateTest::Equals(value) }
    }
}

/// The pure transforms mappings can select from.
///
/// Every variant is a named, introspectable function of its source values;
/// output count always equals the mapping's destination count.
#[derive(Debug, Clone)]
pub enum Transform {
    /// One source copied to every destination.
    Identity,
    /// N same-kind scalars collected into one vector.
    Gather,
    /// N numeric scalars collected into one integer vector via `v*mul + add`.
    GatherAffine { mul: f64, add: f64 },
    /// (volume_db, mute, hide) to a raw output volume register.
    VolumeToRaw,
    /// Boolean AND of integer scalars.
    And,
    /// `1 - v` for mutually-exclusive toggles.
    InvertToggle,
    /// One numeric scalar to an integer via `round(v * scale)`.
    ScaleRound(f64),
    /// 1 while at least one of the hide flags is 0.
    AnyVisible,
    /// Raw meter vector fanned out to per-channel dB scalars.
    MeterToDb,
    /// Integer vector fanned out to per-channel scalars.
    FanOut,
    /// (gain, pan, mute, hide, dimmer) to one raw mono mixer gain.
    MonitorMono,
    /// (gain, pan, mute, hide, dimmer) to a raw left/right gain pair.
    MonitorStereo,
    /// One fader placed at `slot` in a zeroed vector of `len` gains.
    StreamReturn { slot: usize, len: usize },
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Identity => "identity",
            Transform::Gather => "gather",
            Transform::GatherAffine { .. } => "gather-affine",
            Transform::VolumeToRaw => "volume-to-raw",
            Transform::And => "and",
            Transform::InvertToggle => "invert-toggle",
            Transform::ScaleRound(_) => "scale-round",
            Transform::AnyVisible => "any-visible",
            Transform::MeterToDb => "meter-to-db",
            Transform::FanOut => "fan-out",
            Transform::MonitorMono => "monitor-mono",
            Transform::MonitorStereo => "monitor-stereo",
            Transform::StreamReturn { .. } => "stream-return",
        }
    }

    fn shape_err(&self, detail: impl Into<String>) -> GraphError {
        GraphError::Shape { transform: self.name(), detail: detail.into() }
    }

    fn eval_err(&self, detail: impl Into<String>) -> GraphError {
        GraphError::Eval { transform: self.name(), detail: detail.into() }
    }

    /// Static shape check, run once at declaration.
    pub fn check(&self, srcs: &[Signature], dests: &[Signature]) -> Result<(), GraphError> {
        let want_srcs = |n: usize| -> Result<(), GraphError> {
            if srcs.len() != n {
                return Err(self.shape_err(format!("expected {n} sources, got {}", srcs.len())));
            }
            Ok(())
        };
        let want_dests = |n: usize| -> Result<(), GraphError> {
            if dests.len() != n {
                return Err(self.shape_err(format!(
                    "expected {n} destinations, got {}",
                    dests.len()
                )));
            }
            Ok(())
        };
        let numeric_scalars = || -> Result<(), GraphError> {
            for s in srcs {
                if !s.is_scalar() || s.kind == Kind::Str {
                    return Err(self.shape_err("sources must be numeric scalars"));
                }
            }
            Ok(())
        };

        match self {
            Transform::Identity => {
                want_srcs(1)?;
                if dests.is_empty() {
                    return Err(self.shape_err("needs at least one destination"));
                }
                for d in dests {
                    if *d != srcs[0] {
                        return Err(self.shape_err(format!(
                            "destination {d} does not match source {}",
                            srcs[0]
                        )));
                    }
                }
            }
            Transform::Gather => {
                want_dests(1)?;
                if srcs.is_empty() {
                    return Err(self.shape_err("needs at least one source"));
                }
                let kind = srcs[0].kind;
                if srcs.iter().any(|s| !s.is_scalar() || s.kind != kind) {
                    return Err(self.shape_err("sources must be same-kind scalars"));
                }
                if dests[0].kind != kind || dests[0].len != srcs.len() {
                    return Err(self.shape_err(format!(
                        "destination must be {kind}[{}], got {}",
                        srcs.len(),
                        dests[0]
                    )));
                }
            }
            Transform::GatherAffine { .. } => {
                want_dests(1)?;
                numeric_scalars()?;
                if dests[0].kind != Kind::Int || dests[0].len != srcs.len() {
                    return Err(self.shape_err(format!(
                        "destination must be int[{}], got {}",
                        srcs.len(),
                        dests[0]
                    )));
                }
            }
            Transform::VolumeToRaw => {
                want_srcs(3)?;
                want_dests(1)?;
                numeric_scalars()?;
                if dests[0] != Signature::int() {
                    return Err(self.shape_err("destination must be an int scalar"));
                }
            }
            Transform::And | Transform::AnyVisible => {
                want_dests(1)?;
                if srcs.is_empty() || srcs.iter().any(|s| *s != Signature::int()) {
                    return Err(self.shape_err("sources must be int scalars"));
                }
                if dests[0] != Signature::int() {
                    return Err(self.shape_err("destination must be an int scalar"));
                }
            }
            Transform::InvertToggle => {
                want_srcs(1)?;
                want_dests(1)?;
                if srcs[0] != Signature::int() || dests[0] != Signature::int() {
                    return Err(self.shape_err("toggle endpoints must be int scalars"));
                }
            }
            Transform::ScaleRound(_) => {
                want_srcs(1)?;
                want_dests(1)?;
                numeric_scalars()?;
                if dests[0] != Signature::int() {
                    return Err(self.shape_err("destination must be an int scalar"));
                }
            }
            Transform::MeterToDb => {
                want_srcs(1)?;
                if srcs[0].kind != Kind::Int || srcs[0].len != dests.len() {
                    return Err(self.shape_err(format!(
                        "source must be int[{}], got {}",
                        dests.len(),
                        srcs[0]
                    )));
                }
                if dests.iter().any(|d| *d != Signature::float()) {
                    return Err(self.shape_err("destinations must be float scalars"));
                }
            }
            Transform::FanOut => {
                want_srcs(1)?;
                if srcs[0].kind != Kind::Int || srcs[0].len != dests.len() {
                    return Err(self.shape_err(format!(
                        "source must be int[{}], got {}",
                        dests.len(),
                        srcs[0]
                    )));
                }
                if dests.iter().any(|d| *d != Signature::int()) {
                    return Err(self.shape_err("destinations must be int scalars"));
                }
            }
            Transform::MonitorMono => {
                want_srcs(5)?;
                want_dests(1)?;
                numeric_scalars()?;
                if dests[0] != Signature::int() {
                    return Err(self.shape_err("destination must be an int scalar"));
                }
            }
            Transform::MonitorStereo => {
                want_srcs(5)?;
                want_dests(2)?;
                numeric_scalars()?;
                if dests.iter().any(|d| *d != Signature::int()) {
                    return Err(self.shape_err("destinations must be int scalars"));
                }
            }
            Transform::StreamReturn { slot, len } => {
                want_srcs(1)?;
                want_dests(1)?;
                numeric_scalars()?;
                if *slot >= *len {
                    return Err(self.shape_err(format!("slot {slot} out of range {len}")));
                }
                if dests[0].kind != Kind::Int || dests[0].len != *len {
                    return Err(self.shape_err(format!(
                        "destination must be int[{len}], got {}",
                        dests[0]
                    )));
                }
            }
        }
        Ok(())
    }

    /// Evaluate over current source values. Returns one value per destination.
    pub fn eval(&self, srcs: &[&Value], n_dests: usize) -> Result<Vec<Value>, GraphError> {
        let f64_at = |i: usize| -> Result<f64, GraphError> {
            srcs[i]
                .as_f64()
                .ok_or_else(|| self.eval_err(format!("source {i} is not numeric")))
        };

        match self {
            Transform::Identity => Ok(vec![srcs[0].clone(); n_dests]),
            Transform::Gather => match srcs[0] {
                Value::Int(_) => {
                    let mut out = Vec::with_capacity(srcs.len());
                    for (i, s) in srcs.iter().enumerate() {
                        out.push(
                            s.as_int()
                                .ok_or_else(|| self.eval_err(format!("source {i} is not int")))?,
                        );
                    }
                    Ok(vec![Value::ints(out)])
                }
                Value::Float(_) => {
                    let mut out = Vec::with_capacity(srcs.len());
                    for i in 0..srcs.len() {
                        out.push(f64_at(i)?);
                    }
                    Ok(vec![Value::floats(out)])
                }
                Value::Str(_) => {
                    let mut out = Vec::with_capacity(srcs.len());
                    for (i, s) in srcs.iter().enumerate() {
                        out.push(
                            s.as_str()
                                .ok_or_else(|| self.eval_err(format!("source {i} is not str")))?
                                .to_string(),
                        );
                    }
                    Ok(vec![Value::Str(out)])
                }
            },
            Transform::GatherAffine { mul, add } => {
                let mut out = Vec::with_capacity(srcs.len());
                for i in 0..srcs.len() {
                    out.push((f64_at(i)? * mul + add).round() as i64);
                }
                Ok(vec![Value::ints(out)])
            }
            Transform::VolumeToRaw => {
                let volume = f64_at(0)?;
                let mute = f64_at(1)?;
                let hide = f64_at(2)?;
                Ok(vec![Value::int(
                    (volume * 10.0).round() as i64 - ((mute + hide) as i64) * 900,
                )])
            }
            Transform::And => {
                let all = srcs.iter().all(|v| v.is_truthy());
                Ok(vec![Value::int(all as i64)])
            }
            Transform::InvertToggle => {
                let v = srcs[0]
                    .as_int()
                    .ok_or_else(|| self.eval_err("source is not int"))?;
                Ok(vec![Value::int(1 - v)])
            }
            Transform::ScaleRound(scale) => {
                Ok(vec![Value::int((f64_at(0)? * scale).round() as i64)])
            }
            Transform::AnyVisible => {
                let any = srcs.iter().any(|v| !v.is_truthy());
                Ok(vec![Value::int(any as i64)])
            }
            Transform::MeterToDb => match srcs[0] {
                Value::Int(raw) => Ok(raw
                    .iter()
                    .map(|r| Value::float(gain::meter_raw_to_db(*r)))
                    .collect()),
                _ => Err(self.eval_err("source is not an int vector")),
            },
            Transform::FanOut => match srcs[0] {
                Value::Int(raw) => Ok(raw.iter().map(|r| Value::int(*r)).collect()),
                _ => Err(self.eval_err("source is not an int vector")),
            },
            Transform::MonitorMono | Transform::MonitorStereo => {
                let volume = f64_at(0)?;
                let pan = f64_at(1)?;
                let mute = f64_at(2)? != 0.0;
                let hide = f64_at(3)? != 0.0;
                let dimmer = f64_at(4)?;
                let (l, r) = gain::monitor_gains(volume, pan, mute || hide, dimmer);
                match self {
                    Transform::MonitorMono => Ok(vec![Value::int(l)]),
                    _ => Ok(vec![Value::int(l), Value::int(r)]),
                }
            }
            Transform::StreamReturn { slot, len } => {
                let volume = f64_at(0)?;
                let (l, _) = gain::monitor_gains(volume, 0.5, false, 0.0);
                let mut out = vec![0i64; *len];
                out[*slot] = l;
                Ok(vec![Value::ints(out)])
            }
        }
    }
}

#[derive(Debug)]
struct Mapping {
    sources: Vec<ParamId>,
    dests: Vec<ParamId>,
    transform: Transform,
    gate: Option<(ParamId, GateTest)>,
    /// Part of a declared feedback pair (stereo even/odd forwarding,
    /// mutually-exclusive toggles). Excluded from the acyclicity check;
    /// termination comes from change-only recursion and the gates.
    feedback: bool,
}

/// The static mapping graph. Built once at startup, then read-only.
#[derive(Debug, Default)]
pub struct MappingGraph {
    mappings: Vec<Mapping>,
    by_source: HashMap<ParamId, Vec<usize>>,
    by_dest: HashMap<ParamId, usize>,
}

impl MappingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Register an edge. Source and destination names must already be
    /// declared; shapes are checked against the transform immediately.
    pub fn declare<S: AsRef<str>, D: AsRef<str>>(
        &mut self,
        store: &ParameterStore,
        sources: &[S],
        dests: &[D],
        transform: Transform,
        gate: Option<Gate>,
    ) -> Result<(), GraphError> {
        self.declare_inner(store, sources, dests, transform, gate, false)
    }

    /// Register an edge excluded from the acyclicity check. Used for the
    /// declared feedback pairs: stereo even/odd forwarding and the
    /// mic instrument/phantom-power exclusion.
    pub fn declare_feedback<S: AsRef<str>, D: AsRef<str>>(
        &mut self,
        store: &ParameterStore,
        sources: &[S],
        dests: &[D],
        transform: Transform,
        gate: Option<Gate>,
    ) -> Result<(), GraphError> {
        self.declare_inner(store, sources, dests, transform, gate, true)
    }

    fn declare_inner<S: AsRef<str>, D: AsRef<str>>(
        &mut self,
        store: &ParameterStore,
        sources: &[S],
        dests: &[D],
        transform: Transform,
        gate: Option<Gate>,
        feedback: bool,
    ) -> Result<(), GraphError> {
        let resolve = |name: &str| -> Result<ParamId, GraphError> {
            store
                .id(name)
                .ok_or_else(|| GraphError::UnknownParameter(name.to_string()))
        };

        let source_ids: Vec<ParamId> = sources
            .iter()
            .map(|s| resolve(s.as_ref()))
            .collect::<Result<_, _>>()?;
        let dest_ids: Vec<ParamId> = dests
            .iter()
            .map(|d| resolve(d.as_ref()))
            .collect::<Result<_, _>>()?;

        let src_sigs: Vec<Signature> = source_ids.iter().map(|id| store.signature(*id)).collect();
        let dest_sigs: Vec<Signature> = dest_ids.iter().map(|id| store.signature(*id)).collect();
        transform.check(&src_sigs, &dest_sigs)?;

        let gate = match gate {
            Some(g) => Some((resolve(&g.param)?, g.test)),
            None => None,
        };

        let idx = self.mappings.len();
        for dest in &dest_ids {
            // A destination fed by several mappings is allowed; each still
            // fires when its own sources change. Flagged because it is
            // impossible to tell intentional layering from a latent clash.
            if let Some(prior) = self.by_dest.insert(*dest, idx) {
                debug!(
                    dest = store.name(*dest),
                    prior, current = idx, "destination written by multiple mappings"
                );
            }
        }
        for src in &source_ids {
            self.by_source.entry(*src).or_default().push(idx);
        }
        self.mappings.push(Mapping {
            sources: source_ids,
            dests: dest_ids,
            transform,
            gate,
            feedback,
        });
        Ok(())
    }

    /// Check the declared set for cycles. Feedback pairs are exempt.
    /// Fatal at startup when it fails; the graph never changes afterwards.
    pub fn validate(&self, store: &ParameterStore) -> Result<(), GraphError> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for mapping in self.mappings.iter().filter(|m| !m.feedback) {
            for src in &mapping.sources {
                for dest in &mapping.dests {
                    graph.add_edge(src.index(), dest.index(), ());
                }
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            let name = store
                .ids()
                .find(|id| id.index() == cycle.node_id())
                .map(|id| store.name(id).to_string())
                .unwrap_or_else(|| format!("#{}", cycle.node_id()));
            return Err(GraphError::Cycle(name));
        }
        Ok(())
    }

    /// Propagate from one origin parameter after its value was written.
    ///
    /// Fires every mapping whose source set contains the origin, gate and
    /// all-sources-present permitting. Outputs are written as a batch, then
    /// each changed output propagates in turn. Every id whose stored value
    /// changed (origin excluded) is appended to `touched`.
    pub fn propagate(
        &self,
        store: &mut ParameterStore,
        origin: ParamId,
        touched: &mut Vec<ParamId>,
    ) -> Result<(), GraphError> {
        let Some(indices) = self.by_source.get(&origin) else {
            return Ok(());
        };

        for &idx in indices {
            let mapping = &self.mappings[idx];

            if let Some((gate_id, test)) = &mapping.gate {
                let pass = match store.value(*gate_id) {
                    Some(v) => match test {
                        GateTest::Truthy => v.is_truthy(),
                        GateTest::Falsy => !v.is_truthy(),
                        GateTest::Equals(want) => v == want,
                    },
                    None => false,
                };
                if !pass {
                    continue;
                }
            }

            // fires only when every source carries a value
            let mut values: Vec<&Value> = Vec::with_capacity(mapping.sources.len());
            let mut complete = true;
            for src in &mapping.sources {
                match store.value(*src) {
                    Some(v) => values.push(v),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            let outputs = mapping.transform.eval(&values, mapping.dests.len())?;

            // batch write, then recurse only from outputs that changed
            let mut changed: Vec<ParamId> = Vec::new();
            for (dest, output) in mapping.dests.iter().zip(outputs) {
                if store.set(*dest, output)? {
                    changed.push(*dest);
                }
            }
            for dest in changed {
                touched.push(dest);
                self.propagate(store, dest, touched)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamFlags;

    fn scalar_int(store: &mut ParameterStore, name: &str, default: i64) -> ParamId {
        store
            .declare(name, Signature::int(), Some(Value::int(default)), ParamFlags::default())
            .unwrap()
    }

    fn scalar_float(store: &mut ParameterStore, name: &str, default: f64) -> ParamId {
        store
            .declare(name, Signature::float(), Some(Value::float(default)), ParamFlags::default())
            .unwrap()
    }

    #[test]
    fn test_gather_collects_scalars() {
        let mut store = ParameterStore::new();
        let a = scalar_int(&mut store, "mute:0", 0);
        scalar_int(&mut store, "mute:1", 1);
        let dest = store
            .declare("mutes", Signature::int_vec(2), None, ParamFlags::default())
            .unwrap();

        let mut graph = MappingGraph::new();
        graph
            .declare(&store, &["mute:0", "mute:1"], &["mutes"], Transform::Gather, None)
            .unwrap();

        let mut touched = Vec::new();
        store.set(a, Value::int(1)).unwrap();
        graph.propagate(&mut store, a, &mut touched).unwrap();
        assert_eq!(store.value(dest), Some(&Value::ints(vec![1, 1])));
        assert_eq!(touched, vec![dest]);
    }

    #[test]
    fn test_shape_checked_at_declaration() {
        let mut store = ParameterStore::new();
        scalar_int(&mut store, "a", 0);
        store
            .declare("wide", Signature::int_vec(3), None, ParamFlags::default())
            .unwrap();

        let mut graph = MappingGraph::new();
        let r = graph.declare(&store, &["a"], &["wide"], Transform::Gather, None);
        assert!(matches!(r, Err(GraphError::Shape { .. })));
    }

    #[test]
    fn test_undeclared_reference_is_fatal() {
        let store = ParameterStore::new();
        let mut graph = MappingGraph::new();
        let r = graph.declare(&store, &["ghost"], &["ghost"], Transform::Identity, None);
        assert!(matches!(r, Err(GraphError::UnknownParameter(_))));
    }

    #[test]
    fn test_gate_blocks_propagation() {
        let mut store = ParameterStore::new();
        let vol = scalar_float(&mut store, "volume", 0.0);
        scalar_int(&mut store, "mute", 0);
        scalar_int(&mut store, "hide", 0);
        let raw = scalar_int(&mut store, "raw", 0);
        let stereo = scalar_int(&mut store, "stereo", 1);

        let mut graph = MappingGraph::new();
        graph
            .declare(
                &store,
                &["volume", "mute", "hide"],
                &["raw"],
                Transform::VolumeToRaw,
                Some(Gate::falsy("stereo")),
            )
            .unwrap();

        let mut touched = Vec::new();
        store.set(vol, Value::float(-10.0)).unwrap();
        graph.propagate(&mut store, vol, &mut touched).unwrap();
        assert!(touched.is_empty(), "gated mapping fired");

        // gate flip alone does not re-fire; a source change does
        store.set(stereo, Value::int(0)).unwrap();
        graph.propagate(&mut store, stereo, &mut touched).unwrap();
        assert!(touched.is_empty());

        store.set(vol, Value::float(-12.0)).unwrap();
        graph.propagate(&mut store, vol, &mut touched).unwrap();
        assert_eq!(store.value(raw), Some(&Value::int(-120)));
    }

    #[test]
    fn test_missing_source_suppresses_firing() {
        let mut store = ParameterStore::new();
        let a = scalar_int(&mut store, "a", 1);
        let b = store
            .declare("b", Signature::int(), None, ParamFlags::default())
            .unwrap();
        let both = store
            .declare("both", Signature::int(), Some(Value::int(0)), ParamFlags::default())
            .unwrap();

        let mut graph = MappingGraph::new();
        graph
            .declare(&store, &["a", "b"], &["both"], Transform::And, None)
            .unwrap();

        let mut touched = Vec::new();
        graph.propagate(&mut store, a, &mut touched).unwrap();
        assert!(touched.is_empty());

        store.set(b, Value::int(1)).unwrap();
        graph.propagate(&mut store, b, &mut touched).unwrap();
        assert_eq!(store.value(both), Some(&Value::int(1)));
    }

    #[test]
    fn test_chained_propagation() {
        let mut store = ParameterStore::new();
        let db = scalar_float(&mut store, "echo-volume-db", 0.0);
        let raw = scalar_int(&mut store, "echo-volume", 0);
        let shadow = scalar_int(&mut store, "echo-volume-shadow", 0);

        let mut graph = MappingGraph::new();
        graph
            .declare(
                &store,
                &["echo-volume-db"],
                &["echo-volume"],
                Transform::ScaleRound(10.0),
                None,
            )
            .unwrap();
        graph
            .declare(
                &store,
                &["echo-volume"],
                &["echo-volume-shadow"],
                Transform::Identity,
                None,
            )
            .unwrap();

        let mut touched = Vec::new();
        store.set(db, Value::float(-6.5)).unwrap();
        graph.propagate(&mut store, db, &mut touched).unwrap();
        assert_eq!(store.value(raw), Some(&Value::int(-65)));
        assert_eq!(store.value(shadow), Some(&Value::int(-65)));
        assert_eq!(touched, vec![raw, shadow]);
    }

    #[test]
    fn test_cycle_detected_at_validation() {
        let mut store = ParameterStore::new();
        scalar_int(&mut store, "x", 0);
        scalar_int(&mut store, "y", 0);

        let mut graph = MappingGraph::new();
        graph
            .declare(&store, &["x"], &["y"], Transform::Identity, None)
            .unwrap();
        graph
            .declare(&store, &["y"], &["x"], Transform::Identity, None)
            .unwrap();
        assert!(matches!(graph.validate(&store), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_feedback_pair_converges() {
        // mutually-exclusive toggles: instrument on forces power off and
        // vice versa; gates stop the ping-pong after one hop
        let mut store = ParameterStore::new();
        let inst = scalar_int(&mut store, "mic-instrument", 0);
        let power = scalar_int(&mut store, "mic-power", 0);

        let mut graph = MappingGraph::new();
        graph
            .declare_feedback(
                &store,
                &["mic-instrument"],
                &["mic-power"],
                Transform::InvertToggle,
                Some(Gate::truthy("mic-instrument")),
            )
            .unwrap();
        graph
            .declare_feedback(
                &store,
                &["mic-power"],
                &["mic-instrument"],
                Transform::InvertToggle,
                Some(Gate::truthy("mic-power")),
            )
            .unwrap();
        graph.validate(&store).unwrap();

        store.set(power, Value::int(1)).unwrap();
        let mut touched = Vec::new();
        graph.propagate(&mut store, power, &mut touched).unwrap();
        assert_eq!(store.value(power), Some(&Value::int(1)));
        assert_eq!(store.value(inst), Some(&Value::int(0)));

        store.set(inst, Value::int(1)).unwrap();
        touched.clear();
        graph.propagate(&mut store, inst, &mut touched).unwrap();
        assert_eq!(store.value(inst), Some(&Value::int(1)));
        assert_eq!(store.value(power), Some(&Value::int(0)));
    }

    #[test]
    fn test_symmetric_identity_terminates() {
        let mut store = ParameterStore::new();
        let even = scalar_int(&mut store, "stereo:0", 0);
        let odd = scalar_int(&mut store, "stereo:1", 0);

        let mut graph = MappingGraph::new();
        graph
            .declare_feedback(&store, &["stereo:0"], &["stereo:1"], Transform::Identity, None)
            .unwrap();
        graph
            .declare_feedback(&store, &["stereo:1"], &["stereo:0"], Transform::Identity, None)
            .unwrap();
        graph.validate(&store).unwrap();

        let mut touched = Vec::new();
        store.set(even, Value::int(1)).unwrap();
        graph.propagate(&mut store, even, &mut touched).unwrap();
        assert_eq!(store.value(odd), Some(&Value::int(1)));
        assert_eq!(touched, vec![odd]);
    }

    #[test]
    fn test_meter_fan_out() {
        let mut store = ParameterStore::new();
        let raw = store
            .declare("meter:line-output", Signature::int_vec(2), None, ParamFlags::default())
            .unwrap();
        let m0 = scalar_float(&mut store, "output:meter:0", gain::SILENCE_DB);
        let m1 = scalar_float(&mut store, "output:meter:1", gain::SILENCE_DB);

        let mut graph = MappingGraph::new();
        graph
            .declare(
                &store,
                &["meter:line-output"],
                &["output:meter:0", "output:meter:1"],
                Transform::MeterToDb,
                None,
            )
            .unwrap();

        let mut touched = Vec::new();
        store.set(raw, Value::ints(vec![134_217_712, 0])).unwrap();
        graph.propagate(&mut store, raw, &mut touched).unwrap();
        assert_eq!(store.value(m0), Some(&Value::float(0.0)));
        assert_eq!(store.value(m1), Some(&Value::float(gain::SILENCE_DB)));
    }

    #[test]
    fn test_stream_return_places_gain() {
        let mut store = ParameterStore::new();
        let vol = scalar_float(&mut store, "stream-return", 6.0);
        let dest = store
            .declare("stream-gain", Signature::int_vec(4), None, ParamFlags::default())
            .unwrap();

        let mut graph = MappingGraph::new();
        graph
            .declare(
                &store,
                &["stream-return"],
                &["stream-gain"],
                Transform::StreamReturn { slot: 2, len: 4 },
                None,
            )
            .unwrap();

        let mut touched = Vec::new();
        graph.propagate(&mut store, vol, &mut touched).unwrap();
        assert_eq!(
            store.value(dest),
            Some(&Value::ints(vec![0, 0, gain::MONITOR_RANGE_RAW.1, 0]))
        );
    }

    #[test]
    fn test_monitor_stereo_writes_pair() {
        let mut store = ParameterStore::new();
        let gain_p = scalar_float(&mut store, "gain", 6.0);
        scalar_float(&mut store, "pan", 0.5);
        scalar_int(&mut store, "mute", 0);
        scalar_int(&mut store, "hide", 0);
        scalar_float(&mut store, "dimmer", 0.0);
        let l = scalar_int(&mut store, "raw-l", 0);
        let r = scalar_int(&mut store, "raw-r", 0);

        let mut graph = MappingGraph::new();
        graph
            .declare(
                &store,
                &["gain", "pan", "mute", "hide", "dimmer"],
                &["raw-l", "raw-r"],
                Transform::MonitorStereo,
                None,
            )
            .unwrap();

        let mut touched = Vec::new();
        graph.propagate(&mut store, gain_p, &mut touched).unwrap();
        assert_eq!(store.value(l), Some(&Value::int(gain::MONITOR_RANGE_RAW.1)));
        assert_eq!(store.value(r), Some(&Value::int(gain::MONITOR_RANGE_RAW.1)));
    }
}
