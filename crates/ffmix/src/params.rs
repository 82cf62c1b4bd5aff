//! Parameter store
//!
//! The whole control surface is modeled as a flat arena of named, typed
//! parameters declared once at startup. Each parameter carries metadata
//! flags that decide which boundaries it participates in: hardware writes,
//! GUI pushes, snapshots, background polling. Nothing is ever created or
//! destroyed after declaration; mutation happens through [`set`] only.
//!
//! Names are colon-segmented, e.g. `monitor:input-gain:3:12` or
//! `output:stereo-link`. The trailing segments are channel indices.

use std::collections::HashMap;

use ffmix_proto::{Signature, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate parameter declaration: {0}")]
    Duplicate(String),

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("type mismatch on {name}: declared {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: Signature,
        got: Signature,
    },
}

/// Channel connector type. Inputs use Line/Mic/Spdif/Adat; outputs use
/// Line/Hp/Spdif/Adat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Line,
    Mic,
    Hp,
    Spdif,
    Adat,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Line => "line",
            ChannelKind::Mic => "mic",
            ChannelKind::Hp => "hp",
            ChannelKind::Spdif => "spdif",
            ChannelKind::Adat => "adat",
        }
    }
}

/// Which amixer interface a control lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlsaIface {
    #[default]
    Mixer,
    Card,
}

impl AlsaIface {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlsaIface::Mixer => "MIXER",
            AlsaIface::Card => "CARD",
        }
    }
}

/// Hardware routing spec: how a parameter maps to an amixer control.
///
/// The control name defaults to the parameter name; multi-instance controls
/// add an `index=`, card-level controls switch the interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlsaSpec {
    pub control: Option<String>,
    pub index: Option<u32>,
    pub iface: AlsaIface,
}

impl AlsaSpec {
    pub fn mixer() -> Self {
        Self::default()
    }

    pub fn card() -> Self {
        Self { iface: AlsaIface::Card, ..Self::default() }
    }

    pub fn indexed(control: impl Into<String>, index: u32) -> Self {
        Self {
            control: Some(control.into()),
            index: Some(index),
            iface: AlsaIface::Mixer,
        }
    }
}

/// Metadata flags attached to a parameter at declaration.
#[derive(Debug, Clone, Default)]
pub struct ParamFlags {
    /// Hardware-routed: writes go to the device through this control spec.
    pub alsa: Option<AlsaSpec>,
    /// GUI-routed: changes are pushed to the control surface.
    pub osc: bool,
    /// Excluded from snapshots (read-only or session-local parameters).
    pub skip_state: bool,
    /// Polled from the device at the slow cadence while online.
    pub poll: bool,
    /// Snapshot/replay priority: lower replays first, ties by declaration.
    pub order: i32,
    /// Channel-type tag for input-side fan-in mappings.
    pub input_type: Option<ChannelKind>,
    /// Channel-type tag for output-side fan-in mappings.
    pub output_type: Option<ChannelKind>,
}

impl ParamFlags {
    pub fn osc() -> Self {
        Self { osc: true, ..Self::default() }
    }

    pub fn alsa(spec: AlsaSpec) -> Self {
        Self { alsa: Some(spec), ..Self::default() }
    }

    pub fn with_osc(mut self) -> Self {
        self.osc = true;
        self
    }

    pub fn with_alsa(mut self, spec: AlsaSpec) -> Self {
        self.alsa = Some(spec);
        self
    }

    pub fn with_skip_state(mut self) -> Self {
        self.skip_state = true;
        self
    }

    pub fn with_poll(mut self) -> Self {
        self.poll = true;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_input_type(mut self, kind: ChannelKind) -> Self {
        self.input_type = Some(kind);
        self
    }

    pub fn with_output_type(mut self, kind: ChannelKind) -> Self {
        self.output_type = Some(kind);
        self
    }

    /// Snapshot membership: GUI-controllable and not session-local.
    pub fn persisted(&self) -> bool {
        self.osc && !self.skip_state
    }

    /// Hardware write membership: device-routed and not read-only.
    pub fn hardware_routed(&self) -> bool {
        self.alsa.is_some() && !self.skip_state
    }
}

/// Stable handle into the parameter arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub signature: Signature,
    pub default: Option<Value>,
    pub value: Option<Value>,
    pub flags: ParamFlags,
}

/// The declaration-ordered parameter arena.
#[derive(Debug, Default)]
pub struct ParameterStore {
    params: Vec<Parameter>,
    index: HashMap<String, ParamId>,
}

impl ParameterStore {
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    /// Declare a parameter. Fails on duplicate names and on defaults that
    /// do not match the declared signature.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
        default: Option<Value>,
        flags: ParamFlags,
    ) -> Result<ParamId, StoreError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(StoreError::Duplicate(name));
        }
        if let Some(ref d) = default {
            if d.signature() != signature {
                return Err(StoreError::TypeMismatch {
                    name,
                    expected: signature,
                    got: d.signature(),
                });
            }
        }
        let id = ParamId(self.params.len());
        self.params.push(Parameter {
            name: name.clone(),
            signature,
            value: default.clone(),
            default,
            flags,
        });
        self.index.insert(name, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<ParamId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, id: ParamId) -> &Parameter {
        &self.params[id.0]
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        self.id(name).map(|id| self.get(id))
    }

    pub fn name(&self, id: ParamId) -> &str {
        &self.params[id.0].name
    }

    pub fn signature(&self, id: ParamId) -> Signature {
        self.params[id.0].signature
    }

    pub fn flags(&self, id: ParamId) -> &ParamFlags {
        &self.params[id.0].flags
    }

    pub fn value(&self, id: ParamId) -> Option<&Value> {
        self.params[id.0].value.as_ref()
    }

    pub fn default(&self, id: ParamId) -> Option<&Value> {
        self.params[id.0].default.as_ref()
    }

    /// Write a value. The signature must match exactly (callers coerce
    /// inbound GUI values first). Returns whether the stored value changed.
    pub fn set(&mut self, id: ParamId, value: Value) -> Result<bool, StoreError> {
        let param = &mut self.params[id.0];
        if value.signature() != param.signature {
            return Err(StoreError::TypeMismatch {
                name: param.name.clone(),
                expected: param.signature,
                got: value.signature(),
            });
        }
        if param.value.as_ref() == Some(&value) {
            return Ok(false);
        }
        param.value = Some(value);
        Ok(true)
    }

    /// All ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        (0..self.params.len()).map(ParamId)
    }

    /// Ids sorted by (priority order, declaration order).
    pub fn priority_order(&self) -> Vec<ParamId> {
        let mut ids: Vec<ParamId> = self.ids().collect();
        ids.sort_by_key(|id| (self.params[id.0].flags.order, id.0));
        ids
    }

    /// Ids whose name matches a predicate, declaration order.
    pub fn ids_matching<'a>(
        &'a self,
        pred: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = ParamId> + 'a {
        self.ids().filter(move |id| pred(&self.params[id.0].name))
    }
}
