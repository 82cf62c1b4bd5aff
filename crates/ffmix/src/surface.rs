//! Surface orchestration.
//!
//! One `Surface` owns the parameter store and mapping graph for the card
//! and is the single serialized mutation path: every external write (GUI,
//! hardware poll, snapshot apply) enters through [`Surface::set`], which
//! coerces the value, propagates through the graph, runs the edit hooks,
//! and returns the resulting update batch for the caller to route to the
//! hardware and GUI boundaries.
//!
//! Edit hooks cover the behavior that is not expressible as a pure mapping:
//! stereo pair renaming and strip copying, the monitor gain merge on link
//! changes, meter resets, and the online-resync trigger. Loading a snapshot
//! suspends the edit-only hooks so a bulk apply cannot cascade.

use ffmix_proto::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::device::DeviceModel;
use crate::mapping::GraphError;
use crate::params::{AlsaSpec, ParamId, StoreError};
use crate::snapshots::SnapshotEntries;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("value {got} does not fit parameter {name} ({expected})")]
    BadValue {
        name: String,
        expected: ffmix_proto::Signature,
        got: ffmix_proto::Signature,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One routed parameter change with the metadata the boundaries need.
#[derive(Debug, Clone)]
pub struct Update {
    pub name: String,
    pub value: Value,
    pub alsa: Option<AlsaSpec>,
    /// Device write wanted: alsa-routed and not read-only.
    pub hardware: bool,
    pub osc: bool,
    pub order: i32,
    pub decl: usize,
}

/// Everything one external write produced, in propagation order.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    pub updates: Vec<Update>,
    /// The card just came online; the caller must replay hardware state.
    pub resync: bool,
    /// The metering toggle changed.
    pub metering: Option<bool>,
}

/// FX clipboard groups addressable through the `/fx` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxGroup {
    OutputEq,
    InputEq,
    OutputDyn,
    InputDyn,
    Reverb,
    Echo,
}

impl FxGroup {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "output-eq" => Some(Self::OutputEq),
            "input-eq" => Some(Self::InputEq),
            "output-dyn" => Some(Self::OutputDyn),
            "input-dyn" => Some(Self::InputDyn),
            "reverb" => Some(Self::Reverb),
            "echo" => Some(Self::Echo),
            _ => None,
        }
    }
}

pub struct Surface {
    model: DeviceModel,
    loading: bool,
    clipboard: Option<(FxGroup, Vec<(String, Value)>)>,
}

impl Surface {
    pub fn new(model: DeviceModel) -> Self {
        Self { model, loading: false, clipboard: None }
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Enter loading mode: edit-only hooks are suspended until
    /// [`finish_loading`](Self::finish_loading) runs (deferred by the
    /// caller until propagation from the bulk apply settles).
    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    pub fn finish_loading(&mut self) {
        self.loading = false;
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.model.store.by_name(name).and_then(|p| p.value.as_ref())
    }

    fn scalar_int(&self, name: &str) -> i64 {
        self.value(name).and_then(|v| v.as_int()).unwrap_or(0)
    }

    /// The single mutation entry point.
    pub fn set(&mut self, name: &str, value: Value) -> Result<UpdateBatch, SurfaceError> {
        let mut batch = UpdateBatch::default();
        let mut touched: Vec<ParamId> = Vec::new();
        self.apply(name, value, &mut touched, &mut batch)?;
        self.collect(touched, &mut batch);
        Ok(batch)
    }

    /// Set a parameter back to its declared default.
    pub fn reset(&mut self, name: &str) -> Result<UpdateBatch, SurfaceError> {
        let id = self
            .model
            .store
            .id(name)
            .ok_or_else(|| SurfaceError::UnknownParameter(name.to_string()))?;
        match self.model.store.default(id).cloned() {
            Some(default) => self.set(name, default),
            None => Ok(UpdateBatch::default()),
        }
    }

    fn apply(
        &mut self,
        name: &str,
        value: Value,
        touched: &mut Vec<ParamId>,
        batch: &mut UpdateBatch,
    ) -> Result<(), SurfaceError> {
        let id = self
            .model
            .store
            .id(name)
            .ok_or_else(|| SurfaceError::UnknownParameter(name.to_string()))?;
        let signature = self.model.store.signature(id);
        let value = value.coerce_to(&signature).ok_or_else(|| SurfaceError::BadValue {
            name: name.to_string(),
            expected: signature,
            got: value.signature(),
        })?;

        if !self.model.store.set(id, value)? {
            return Ok(());
        }
        touched.push(id);
        let before_hooks = touched.len();
        self.model.graph.propagate(&mut self.model.store, id, touched)?;

        // hooks run for the origin and everything propagation produced
        let produced: Vec<ParamId> = touched[before_hooks - 1..].to_vec();
        for hook_id in produced {
            self.run_hooks(hook_id, touched, batch)?;
        }
        Ok(())
    }

    fn apply_internal(
        &mut self,
        name: String,
        value: Value,
        touched: &mut Vec<ParamId>,
        batch: &mut UpdateBatch,
    ) -> Result<(), SurfaceError> {
        self.apply(&name, value, touched, batch)
    }

    fn reset_internal(
        &mut self,
        name: String,
        touched: &mut Vec<ParamId>,
        batch: &mut UpdateBatch,
    ) -> Result<(), SurfaceError> {
        let Some(id) = self.model.store.id(&name) else {
            return Ok(());
        };
        if let Some(default) = self.model.store.default(id).cloned() {
            self.apply(&name, default, touched, batch)?;
        }
        Ok(())
    }

    fn run_hooks(
        &mut self,
        id: ParamId,
        touched: &mut Vec<ParamId>,
        batch: &mut UpdateBatch,
    ) -> Result<(), SurfaceError> {
        let name = self.model.store.name(id).to_string();
        let value = match self.model.store.value(id) {
            Some(v) => v.clone(),
            None => return Ok(()),
        };

        if name == "card-online" {
            match value.as_int() {
                Some(1) => batch.resync = true,
                // unplugged meters read as silence, not as their last value
                Some(0) => self.reset_meters(touched, batch)?,
                _ => {}
            }
        }

        if name == "metering" {
            let on = value.is_truthy();
            batch.metering = Some(on);
            if !on {
                self.reset_meters(touched, batch)?;
            }
        }

        if let Some(rest) = name.strip_prefix("output:stereo:") {
            if let Ok(dest) = rest.parse::<usize>() {
                self.stereo_hook(dest, value.is_truthy(), touched, batch)?;
            }
        }

        Ok(())
    }

    fn reset_meters(
        &mut self,
        touched: &mut Vec<ParamId>,
        batch: &mut UpdateBatch,
    ) -> Result<(), SurfaceError> {
        let meters: Vec<String> = self
            .model
            .store
            .ids_matching(|n| n.starts_with("output:meter:") || n.starts_with("input:meter:"))
            .map(|mid| self.model.store.name(mid).to_string())
            .collect();
        for meter in meters {
            self.reset_internal(meter, touched, batch)?;
        }
        Ok(())
    }

    /// Stereo link/unlink side effects for one pair member.
    fn stereo_hook(
        &mut self,
        dest: usize,
        linked: bool,
        touched: &mut Vec<ParamId>,
        batch: &mut UpdateBatch,
    ) -> Result<(), SurfaceError> {
        let pair = (dest / 2) * 2;
        let n_inputs = self.model.spec.inputs.len();

        // force a fresh meter push for the pair
        self.reset_internal(format!("output:meter:{pair}"), touched, batch)?;
        self.reset_internal(format!("output:meter:{}", pair + 1), touched, batch)?;

        if dest % 2 == 1 {
            // selection moves off a channel that just became a right half
            if linked && self.scalar_int("output:select") == dest as i64 {
                self.apply_internal(
                    "output:select".to_string(),
                    Value::int(dest as i64 - 1),
                    touched,
                    batch,
                )?;
            }
            return Ok(());
        }

        if self.loading {
            return Ok(());
        }

        if linked {
            // combined label, e.g. "AN 1/2"
            let base = &self.model.spec.outputs[dest].hw_name;
            let combined = match base.rsplit_once(' ') {
                Some((prefix, n)) => match n.parse::<i64>() {
                    Ok(n) => format!("{prefix} {n}/{}", n + 1),
                    Err(_) => base.clone(),
                },
                None => base.clone(),
            };
            self.apply_internal(
                format!("output:hardware-name:{dest}"),
                Value::text(combined),
                touched,
                batch,
            )?;

            // the right half adopts the left half's strip
            for param in ["output:volume-db", "output:mute", "output:name", "output:color"] {
                if let Some(v) = self.value(&format!("{param}:{dest}")).cloned() {
                    self.apply_internal(format!("{param}:{}", dest + 1), v, touched, batch)?;
                }
            }

            // merged faders keep the louder of the two prior mixes
            for in_index in 0..n_inputs {
                let left = self
                    .value(&format!("monitor:input-gain:{dest}:{in_index}"))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(crate::gain::MONITOR_RANGE_DB.0);
                let right = self
                    .value(&format!("monitor:input-gain:{}:{in_index}", dest + 1))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(crate::gain::MONITOR_RANGE_DB.0);
                let merged = Value::float(left.max(right));
                self.apply_internal(
                    format!("monitor:input-gain:{dest}:{in_index}"),
                    merged.clone(),
                    touched,
                    batch,
                )?;
                self.apply_internal(
                    format!("monitor:input-gain:{}:{in_index}", dest + 1),
                    merged,
                    touched,
                    batch,
                )?;
            }
        } else {
            self.reset_internal(format!("output:hardware-name:{dest}"), touched, batch)?;
            self.reset_internal(format!("output:pan:{dest}"), touched, batch)?;

            // mute carries over to both halves; gains are left alone
            for in_index in 0..n_inputs {
                let mute = self
                    .value(&format!("monitor:input-mute:{dest}:{in_index}"))
                    .cloned()
                    .unwrap_or(Value::int(0));
                self.apply_internal(
                    format!("monitor:input-mute:{}:{in_index}", dest + 1),
                    mute,
                    touched,
                    batch,
                )?;
                self.reset_internal(
                    format!("monitor:input-pan:{dest}:{in_index}"),
                    touched,
                    batch,
                )?;
                self.reset_internal(
                    format!("monitor:input-pan:{}:{in_index}", dest + 1),
                    touched,
                    batch,
                )?;
            }
        }

        Ok(())
    }

    /// Finalize a batch: unique ids in first-touch order, final values.
    fn collect(&self, touched: Vec<ParamId>, batch: &mut UpdateBatch) {
        let mut seen = std::collections::HashSet::new();
        for id in touched {
            if !seen.insert(id) {
                continue;
            }
            let param = self.model.store.get(id);
            let Some(value) = param.value.clone() else { continue };
            batch.updates.push(Update {
                name: param.name.clone(),
                value,
                alsa: param.flags.alsa.clone(),
                hardware: param.flags.hardware_routed(),
                osc: param.flags.osc,
                order: param.flags.order,
                decl: id.index(),
            });
        }
    }

    /// Current persisted state in ascending priority order.
    pub fn capture_state(&self, omit_defaults: bool) -> SnapshotEntries {
        let mut entries = Vec::new();
        for id in self.model.store.priority_order() {
            let param = self.model.store.get(id);
            if !param.flags.persisted() {
                continue;
            }
            let Some(value) = &param.value else { continue };
            if omit_defaults && param.default.as_ref() == Some(value) {
                continue;
            }
            entries.push((param.name.clone(), value.clone()));
        }
        entries
    }

    /// Current hardware-routed state in ascending priority order.
    pub fn hardware_state(&self) -> Vec<(String, AlsaSpec, Value)> {
        let mut entries = Vec::new();
        for id in self.model.store.priority_order() {
            let param = self.model.store.get(id);
            if !param.flags.hardware_routed() {
                continue;
            }
            let (Some(spec), Some(value)) = (&param.flags.alsa, &param.value) else {
                continue;
            };
            entries.push((param.name.clone(), spec.clone(), value.clone()));
        }
        entries
    }

    /// Bulk-apply snapshot entries. Caller brackets this with
    /// `begin_loading`/`finish_loading`. Unknown parameters are dropped
    /// with a warning; the rest of the load proceeds.
    pub fn apply_snapshot(&mut self, entries: &SnapshotEntries) -> Result<UpdateBatch, SurfaceError> {
        let mut batch = UpdateBatch::default();
        let mut touched: Vec<ParamId> = Vec::new();
        for (name, value) in entries {
            if self.model.store.id(name).is_none() {
                warn!(name, "snapshot entry references unknown parameter, dropped");
                continue;
            }
            match self.apply(name, value.clone(), &mut touched, &mut batch) {
                Ok(()) => {}
                Err(SurfaceError::BadValue { name, expected, got }) => {
                    warn!(%name, %expected, %got, "snapshot entry has wrong shape, dropped");
                }
                Err(e) => return Err(e),
            }
        }
        self.collect(touched, &mut batch);
        Ok(batch)
    }

    /// Reset every persisted parameter to its default, priority order.
    pub fn default_state(&self) -> SnapshotEntries {
        let mut entries = Vec::new();
        for id in self.model.store.priority_order() {
            let param = self.model.store.get(id);
            if !param.flags.persisted() {
                continue;
            }
            if let Some(default) = &param.default {
                entries.push((param.name.clone(), default.clone()));
            }
        }
        entries
    }

    fn fx_group_params(&self, group: FxGroup) -> Vec<String> {
        let strip = |side: &str, sel: i64, dyn_group: bool| -> Vec<String> {
            let prefixes: &[&str] = if dyn_group {
                &["dyn-", "autolevel-"]
            } else {
                &["eq-", "hpf-"]
            };
            self.model
                .store
                .ids_matching(move |n| {
                    let Some(rest) = n.strip_prefix(side) else { return false };
                    let Some(rest) = rest.strip_prefix(':') else { return false };
                    if !prefixes.iter().any(|p| rest.starts_with(p)) {
                        return false;
                    }
                    rest.rsplit_once(':')
                        .and_then(|(_, idx)| idx.parse::<i64>().ok())
                        .is_some_and(|idx| idx == sel)
                })
                .map(|id| self.model.store.name(id).to_string())
                .collect()
        };

        match group {
            FxGroup::OutputEq => strip("output", self.scalar_int("output:select"), false),
            FxGroup::InputEq => strip("input", self.scalar_int("input:select"), false),
            FxGroup::OutputDyn => strip("output", self.scalar_int("output:select"), true),
            FxGroup::InputDyn => strip("input", self.scalar_int("input:select"), true),
            FxGroup::Reverb => self
                .model
                .store
                .ids_matching(|n| n.starts_with("fx:reverb-"))
                .filter(|id| self.model.store.flags(*id).osc)
                .map(|id| self.model.store.name(id).to_string())
                .collect(),
            FxGroup::Echo => self
                .model
                .store
                .ids_matching(|n| n.starts_with("fx:echo-"))
                .filter(|id| self.model.store.flags(*id).osc)
                .map(|id| self.model.store.name(id).to_string())
                .collect(),
        }
    }

    /// Suffix relative to the channel index, used to re-target a paste
    /// onto a different strip.
    fn group_key(name: &str, group: FxGroup) -> String {
        match group {
            FxGroup::Reverb | FxGroup::Echo => name.to_string(),
            _ => match name.rsplit_once(':') {
                Some((prefix, _)) => prefix.to_string(),
                None => name.to_string(),
            },
        }
    }

    /// Copy the current values of a control group to the clipboard.
    pub fn fx_copy(&mut self, group: FxGroup) {
        let values: Vec<(String, Value)> = self
            .fx_group_params(group)
            .into_iter()
            .filter_map(|name| {
                let value = self.value(&name)?.clone();
                Some((Self::group_key(&name, group), value))
            })
            .collect();
        debug!(?group, entries = values.len(), "fx group copied");
        self.clipboard = Some((group, values));
    }

    /// Paste the clipboard onto the currently selected strip. A paste of a
    /// different group kind is ignored.
    pub fn fx_paste(&mut self, group: FxGroup) -> Result<UpdateBatch, SurfaceError> {
        let Some((held, values)) = self.clipboard.clone() else {
            return Ok(UpdateBatch::default());
        };
        if held != group {
            return Ok(UpdateBatch::default());
        }

        let mut batch = UpdateBatch::default();
        let mut touched: Vec<ParamId> = Vec::new();
        for name in self.fx_group_params(group) {
            let key = Self::group_key(&name, group);
            if let Some((_, value)) = values.iter().find(|(k, _)| *k == key) {
                self.apply(&name, value.clone(), &mut touched, &mut batch)?;
            }
        }
        self.collect(touched, &mut batch);
        Ok(batch)
    }

    /// Reset a control group to its declared defaults.
    pub fn fx_reset(&mut self, group: FxGroup) -> Result<UpdateBatch, SurfaceError> {
        let mut batch = UpdateBatch::default();
        let mut touched: Vec<ParamId> = Vec::new();
        for name in self.fx_group_params(group) {
            self.reset_internal(name, &mut touched, &mut batch)?;
        }
        self.collect(touched, &mut batch);
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{build, CardSpec};
    use crate::gain;

    fn surface() -> Surface {
        Surface::new(build(CardSpec::model_802()).unwrap())
    }

    #[test]
    fn test_set_returns_routed_updates() {
        let mut s = surface();
        let batch = s.set("output:volume-db:0", Value::float(-12.0)).unwrap();

        let names: Vec<&str> = batch.updates.iter().map(|u| u.name.as_str()).collect();
        assert!(names.contains(&"output:volume-db:0"));
        assert!(names.contains(&"output:volume:0"));
        assert!(names.contains(&"output:volume"));

        let array = batch.updates.iter().find(|u| u.name == "output:volume").unwrap();
        assert!(array.hardware);
        let scalar = batch.updates.iter().find(|u| u.name == "output:volume:0").unwrap();
        assert!(!scalar.hardware);
        assert!(!scalar.osc);
    }

    #[test]
    fn test_set_unchanged_is_empty() {
        let mut s = surface();
        s.set("output:mute:0", Value::int(1)).unwrap();
        let batch = s.set("output:mute:0", Value::int(1)).unwrap();
        assert!(batch.updates.is_empty());
    }

    #[test]
    fn test_gui_float_coerces_to_int_param() {
        let mut s = surface();
        let batch = s.set("output:mute:0", Value::float(1.0)).unwrap();
        assert!(!batch.updates.is_empty());
        assert_eq!(s.value("output:mute:0"), Some(&Value::int(1)));

        assert!(matches!(
            s.set("output:mute:0", Value::float(0.5)),
            Err(SurfaceError::BadValue { .. })
        ));
    }

    #[test]
    fn test_card_online_flags_resync() {
        let mut s = surface();
        let batch = s.set("card-online", Value::int(1)).unwrap();
        assert!(batch.resync);
        let batch = s.set("card-online", Value::int(0)).unwrap();
        assert!(!batch.resync);
    }

    #[test]
    fn test_metering_off_resets_meters() {
        let mut s = surface();
        s.set("metering", Value::int(1)).unwrap();
        s.set("output:meter:0", Value::float(-20.0)).unwrap();

        let batch = s.set("metering", Value::int(0)).unwrap();
        assert_eq!(batch.metering, Some(false));
        assert_eq!(
            s.value("output:meter:0"),
            Some(&Value::float(gain::SILENCE_DB))
        );
    }

    #[test]
    fn test_link_merges_gains_to_max() {
        let mut s = surface();
        s.set("monitor:input-gain:0:0", Value::float(-30.0)).unwrap();
        s.set("monitor:input-gain:1:0", Value::float(-10.0)).unwrap();

        s.set("output:stereo:0", Value::int(1)).unwrap();
        assert_eq!(
            s.value("monitor:input-gain:0:0"),
            Some(&Value::float(-10.0))
        );
        assert_eq!(
            s.value("monitor:input-gain:1:0"),
            Some(&Value::float(-10.0))
        );
    }

    #[test]
    fn test_unlink_copies_mute_keeps_gains() {
        let mut s = surface();
        s.set("output:stereo:0", Value::int(1)).unwrap();
        s.set("monitor:input-gain:0:0", Value::float(-18.0)).unwrap();
        s.set("monitor:input-mute:0:0", Value::int(1)).unwrap();
        s.set("monitor:input-pan:0:0", Value::float(0.2)).unwrap();

        s.set("output:stereo:0", Value::int(0)).unwrap();

        // mute copied to both halves, pans reset, gains untouched
        assert_eq!(s.value("monitor:input-mute:1:0"), Some(&Value::int(1)));
        assert_eq!(s.value("monitor:input-pan:0:0"), Some(&Value::float(0.5)));
        assert_eq!(s.value("monitor:input-pan:1:0"), Some(&Value::float(0.5)));
        assert_eq!(s.value("monitor:input-gain:0:0"), Some(&Value::float(-18.0)));
    }

    #[test]
    fn test_link_renames_and_copies_strip() {
        let mut s = surface();
        s.set("output:volume-db:0", Value::float(-6.0)).unwrap();
        s.set("output:name:0", Value::text("mains")).unwrap();

        s.set("output:stereo:0", Value::int(1)).unwrap();
        assert_eq!(
            s.value("output:hardware-name:0"),
            Some(&Value::text("AN 1/2"))
        );
        assert_eq!(s.value("output:volume-db:1"), Some(&Value::float(-6.0)));
        assert_eq!(s.value("output:name:1"), Some(&Value::text("mains")));

        s.set("output:stereo:0", Value::int(0)).unwrap();
        assert_eq!(s.value("output:hardware-name:0"), Some(&Value::text("AN 1")));
    }

    #[test]
    fn test_selecting_right_half_moves_selection() {
        let mut s = surface();
        s.set("output:select", Value::int(3)).unwrap();
        s.set("output:stereo:3", Value::int(1)).unwrap();
        assert_eq!(s.value("output:select"), Some(&Value::int(2)));
    }

    #[test]
    fn test_loading_suppresses_edit_hooks() {
        let mut s = surface();
        s.set("output:name:0", Value::text("left")).unwrap();
        s.set("output:name:1", Value::text("right")).unwrap();

        s.begin_loading();
        s.set("output:stereo:0", Value::int(1)).unwrap();
        s.finish_loading();

        // no rename, no cross-pair copy while loading
        assert_eq!(s.value("output:hardware-name:0"), Some(&Value::text("AN 1")));
        assert_eq!(s.value("output:name:1"), Some(&Value::text("right")));
    }

    #[test]
    fn test_capture_and_apply_roundtrip() {
        let mut s = surface();
        s.set("output:volume-db:2", Value::float(-24.5)).unwrap();
        s.set("output:stereo:4", Value::int(1)).unwrap();
        s.set("input:name:3", Value::text("kick")).unwrap();

        let entries = s.capture_state(false);
        assert!(entries.iter().any(|(n, _)| n == "output:volume-db:2"));
        // skip_state params stay out
        assert!(!entries.iter().any(|(n, _)| n == "card-online"));
        // hardware-only params stay out
        assert!(!entries.iter().any(|(n, _)| n == "output:volume"));

        let mut fresh = surface();
        fresh.begin_loading();
        fresh.apply_snapshot(&entries).unwrap();
        fresh.finish_loading();
        assert_eq!(fresh.value("output:volume-db:2"), Some(&Value::float(-24.5)));
        assert_eq!(fresh.value("output:stereo:4"), Some(&Value::int(1)));
        assert_eq!(fresh.value("input:name:3"), Some(&Value::text("kick")));
    }

    #[test]
    fn test_capture_omit_defaults() {
        let mut s = surface();
        s.set("output:volume-db:2", Value::float(-24.5)).unwrap();
        let entries = s.capture_state(true);
        assert!(entries.iter().any(|(n, _)| n == "output:volume-db:2"));
        assert!(!entries.iter().any(|(n, _)| n == "output:volume-db:3"));
    }

    #[test]
    fn test_capture_priority_order() {
        let s = surface();
        let entries = s.capture_state(false);
        let stereo_pos = entries.iter().position(|(n, _)| n == "output:stereo:0").unwrap();
        let select_pos = entries.iter().position(|(n, _)| n == "output:select").unwrap();
        let volume_pos = entries.iter().position(|(n, _)| n == "output:volume-db:0").unwrap();
        assert!(stereo_pos < volume_pos);
        assert!(volume_pos < select_pos);
    }

    #[test]
    fn test_snapshot_unknown_entry_dropped() {
        let mut s = surface();
        let entries = vec![
            ("does:not:exist".to_string(), Value::int(1)),
            ("output:mute:0".to_string(), Value::int(1)),
        ];
        s.begin_loading();
        s.apply_snapshot(&entries).unwrap();
        s.finish_loading();
        assert_eq!(s.value("output:mute:0"), Some(&Value::int(1)));
    }

    #[test]
    fn test_hardware_state_ordering() {
        let s = surface();
        let state = s.hardware_state();
        let link_pos = state.iter().position(|(n, _, _)| n == "output:stereo-link");
        let balance_pos = state.iter().position(|(n, _, _)| n == "output:stereo-balance");
        // link and balance have values only after the gathers fire; defaults
        // exist for balance
        assert!(link_pos.is_none());
        assert!(balance_pos.is_some());
        let volume_pos = state.iter().position(|(n, _, _)| n == "metering").unwrap();
        assert!(balance_pos.unwrap() < volume_pos);
    }

    #[test]
    fn test_fx_clipboard_eq_between_strips() {
        let mut s = surface();
        s.set("output:eq-low-gain:0", Value::int(5)).unwrap();
        s.set("output:hpf-cut-off:0", Value::int(80)).unwrap();

        s.set("output:select", Value::int(0)).unwrap();
        s.fx_copy(FxGroup::OutputEq);

        s.set("output:select", Value::int(2)).unwrap();
        s.fx_paste(FxGroup::OutputEq).unwrap();
        assert_eq!(s.value("output:eq-low-gain:2"), Some(&Value::int(5)));
        assert_eq!(s.value("output:hpf-cut-off:2"), Some(&Value::int(80)));

        let batch = s.fx_reset(FxGroup::OutputEq).unwrap();
        assert!(!batch.updates.is_empty());
        assert_eq!(s.value("output:eq-low-gain:2"), Some(&Value::int(0)));
    }

    #[test]
    fn test_fx_paste_wrong_group_ignored() {
        let mut s = surface();
        s.fx_copy(FxGroup::OutputEq);
        let batch = s.fx_paste(FxGroup::InputEq).unwrap();
        assert!(batch.updates.is_empty());
    }
}
