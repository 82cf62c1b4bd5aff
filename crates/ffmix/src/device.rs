//! Card models and the full surface declaration.
//!
//! This module enumerates every parameter and mapping for a card model:
//! per-channel strips, the per-output monitor mixers, the ALSA-facing
//! vector controls, clock/sync, fx, and the GUI-only options. The shape
//! follows the device DSP: scalar widgets feed vector hardware controls
//! through gather mappings, monitor faders feed raw mixer gains through the
//! gain math, meters fan out from raw vectors to per-channel dB widgets.
//!
//! Everything is declared once at startup; `build` returns the populated
//! store and validated graph.

use ffmix_proto::{Signature, Value};
use tracing::info;

use crate::gain;
use crate::mapping::{Gate, GraphError, MappingGraph, Transform};
use crate::params::{AlsaSpec, ChannelKind, ParamFlags, ParameterStore};

/// One physical channel: connector kind plus the silkscreen label.
#[derive(Debug, Clone)]
pub struct Channel {
    pub kind: ChannelKind,
    pub hw_name: String,
}

/// Static per-model channel layout.
#[derive(Debug, Clone)]
pub struct CardSpec {
    pub model: &'static str,
    pub inputs: Vec<Channel>,
    pub outputs: Vec<Channel>,
    pub mic_options: Vec<&'static str>,
}

fn channels(kind: ChannelKind, count: usize, label: impl Fn(usize) -> String) -> Vec<Channel> {
    (0..count)
        .map(|x| Channel { kind, hw_name: label(x) })
        .collect()
}

impl CardSpec {
    pub fn model_802() -> Self {
        let mut inputs = channels(ChannelKind::Line, 8, |x| format!("AN {}", x + 1));
        inputs.extend(channels(ChannelKind::Mic, 4, |x| format!("MIC {}", x + 1)));
        inputs.extend(channels(ChannelKind::Spdif, 2, |x| format!("AES {}", x + 1)));
        inputs.extend(channels(ChannelKind::Adat, 16, |x| format!("ADAT {}", x + 1)));

        let mut outputs = channels(ChannelKind::Line, 8, |x| format!("AN {}", x + 1));
        outputs.extend(channels(ChannelKind::Hp, 4, |x| format!("PH {}", x + 9)));
        outputs.extend(channels(ChannelKind::Spdif, 2, |x| format!("AES {}", x + 1)));
        outputs.extend(channels(ChannelKind::Adat, 16, |x| format!("ADAT {}", x + 1)));

        Self {
            model: "802",
            inputs,
            outputs,
            mic_options: vec!["invert-phase", "mic-instrument", "mic-power"],
        }
    }

    pub fn model_ucx() -> Self {
        let mut inputs = channels(ChannelKind::Mic, 2, |x| format!("MIC {}", x + 1));
        inputs.extend(channels(ChannelKind::Line, 6, |x| format!("AN {}", x + 1)));
        inputs.extend(channels(ChannelKind::Spdif, 2, |x| format!("AES {}", x + 1)));
        inputs.extend(channels(ChannelKind::Adat, 8, |x| format!("ADAT {}", x + 1)));

        let mut outputs = channels(ChannelKind::Line, 6, |x| format!("AN {}", x + 1));
        outputs.extend(channels(ChannelKind::Hp, 2, |x| format!("PH {}", x + 7)));
        outputs.extend(channels(ChannelKind::Spdif, 2, |x| format!("AES {}", x + 1)));
        outputs.extend(channels(ChannelKind::Adat, 8, |x| format!("ADAT {}", x + 1)));

        Self {
            model: "UCX",
            inputs,
            outputs,
            mic_options: vec!["invert-phase", "mic-power"],
        }
    }

    /// Model lookup by name; unknown names fall back to the 802.
    pub fn for_model(name: &str) -> Self {
        match name {
            "UCX" => Self::model_ucx(),
            _ => Self::model_802(),
        }
    }

    fn input_kinds(&self) -> [ChannelKind; 4] {
        [ChannelKind::Line, ChannelKind::Mic, ChannelKind::Spdif, ChannelKind::Adat]
    }

    fn output_kinds(&self) -> [ChannelKind; 4] {
        [ChannelKind::Line, ChannelKind::Hp, ChannelKind::Spdif, ChannelKind::Adat]
    }

    fn inputs_of(&self, kind: ChannelKind) -> Vec<usize> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    fn outputs_of(&self, kind: ChannelKind) -> Vec<usize> {
        self.outputs
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }
}

/// The populated surface for one card model.
pub struct DeviceModel {
    pub spec: CardSpec,
    pub store: ParameterStore,
    pub graph: MappingGraph,
}

const EQ_BANDS: [&str; 3] = ["low", "middle", "high"];

fn eq_band_default_freq(band: &str) -> i64 {
    match band {
        "low" => 100,
        "middle" => 1000,
        _ => 10000,
    }
}

// 0 = peak, 1 = shelf, 2 = cut
fn eq_band_default_type(band: &str) -> i64 {
    match band {
        "middle" => 0,
        _ => 1,
    }
}

/// `eq-*` / `hpf-*` control suffixes shared by inputs and outputs, in
/// declaration order. The middle band has no type control.
fn eq_control_names() -> Vec<String> {
    let mut names = Vec::new();
    for band in EQ_BANDS {
        for p in ["type", "freq", "gain", "quality"] {
            if band == "middle" && p == "type" {
                continue;
            }
            names.push(format!("eq-{band}-{p}"));
        }
    }
    names
}

struct Builder {
    store: ParameterStore,
    graph: MappingGraph,
}

impl Builder {
    fn int(&mut self, name: &str, default: i64, flags: ParamFlags) -> Result<(), GraphError> {
        self.store
            .declare(name, Signature::int(), Some(Value::int(default)), flags)?;
        Ok(())
    }

    fn float(&mut self, name: &str, default: f64, flags: ParamFlags) -> Result<(), GraphError> {
        self.store
            .declare(name, Signature::float(), Some(Value::float(default)), flags)?;
        Ok(())
    }

    fn text(&mut self, name: &str, default: &str, flags: ParamFlags) -> Result<(), GraphError> {
        self.store
            .declare(name, Signature::text(), Some(Value::text(default)), flags)?;
        Ok(())
    }

    fn int_vec(
        &mut self,
        name: &str,
        len: usize,
        default: Option<Vec<i64>>,
        flags: ParamFlags,
    ) -> Result<(), GraphError> {
        self.store
            .declare(name, Signature::int_vec(len), default.map(Value::ints), flags)?;
        Ok(())
    }

    fn map(
        &mut self,
        sources: &[String],
        dests: &[String],
        transform: Transform,
        gate: Option<Gate>,
    ) -> Result<(), GraphError> {
        self.graph.declare(&self.store, sources, dests, transform, gate)
    }

    fn map_feedback(
        &mut self,
        sources: &[String],
        dests: &[String],
        transform: Transform,
        gate: Option<Gate>,
    ) -> Result<(), GraphError> {
        self.graph
            .declare_feedback(&self.store, sources, dests, transform, gate)
    }
}

/// Vector-backed ALSA controls gathered from per-output scalars.
fn output_array_controls() -> Vec<String> {
    let mut names: Vec<String> = [
        "output:volume",
        "output:invert-phase",
        "output:eq-activate",
        "output:hpf-activate",
        "output:hpf-cut-off",
        "output:hpf-roll-off",
        "output:dyn-activate",
        "output:dyn-attack",
        "output:dyn-release",
        "output:dyn-gain",
        "output:dyn-compressor-threshold",
        "output:dyn-expander-threshold",
        "output:dyn-compressor-ratio",
        "output:dyn-expander-ratio",
        "output:autolevel-activate",
        "output:autolevel-max-gain",
        "output:autolevel-head-room",
        "output:autolevel-rise-time",
    ]
    .map(String::from)
    .to_vec();
    names.extend(eq_control_names().iter().map(|c| format!("output:{c}")));
    names
}

fn input_array_controls() -> Vec<String> {
    let mut names: Vec<String> = [
        "input:eq-activate",
        "input:hpf-activate",
        "input:hpf-cut-off",
        "input:hpf-roll-off",
        "input:dyn-activate",
        "input:dyn-attack",
        "input:dyn-release",
        "input:dyn-gain",
        "input:dyn-compressor-threshold",
        "input:dyn-expander-threshold",
        "input:dyn-compressor-ratio",
        "input:dyn-expander-ratio",
        "input:autolevel-activate",
        "input:autolevel-max-gain",
        "input:autolevel-head-room",
        "input:autolevel-rise-time",
    ]
    .map(String::from)
    .to_vec();
    names.extend(eq_control_names().iter().map(|c| format!("input:{c}")));
    names
}

/// Shared eq/hpf/dynamics strip, identical on inputs and outputs.
fn declare_processing_strip(
    b: &mut Builder,
    side: &str,
    index: usize,
    hpf_activate_osc: bool,
) -> Result<(), GraphError> {
    b.int(&format!("{side}:eq-activate:{index}"), 0, ParamFlags::osc())?;
    for band in EQ_BANDS {
        b.int(
            &format!("{side}:eq-{band}-freq:{index}"),
            eq_band_default_freq(band),
            ParamFlags::osc(),
        )?;
        b.int(&format!("{side}:eq-{band}-gain:{index}"), 0, ParamFlags::osc())?;
        b.int(&format!("{side}:eq-{band}-quality:{index}"), 10, ParamFlags::osc())?;
        if band != "middle" {
            b.int(
                &format!("{side}:eq-{band}-type:{index}"),
                eq_band_default_type(band),
                ParamFlags::osc(),
            )?;
        }
    }

    let hpf_flags = if hpf_activate_osc { ParamFlags::osc() } else { ParamFlags::default() };
    b.int(&format!("{side}:hpf-activate:{index}"), 0, hpf_flags)?;
    b.int(&format!("{side}:hpf-activate-conditionnal:{index}"), 0, ParamFlags::osc())?;
    b.int(&format!("{side}:hpf-cut-off:{index}"), 20, ParamFlags::osc())?;
    b.int(&format!("{side}:hpf-roll-off:{index}"), 0, ParamFlags::osc())?;

    // the device only honors the hpf while the eq block is active
    b.map(
        &[
            format!("{side}:eq-activate:{index}"),
            format!("{side}:hpf-activate-conditionnal:{index}"),
        ],
        &[format!("{side}:hpf-activate:{index}")],
        Transform::And,
        None,
    )?;

    b.int(&format!("{side}:dyn-activate:{index}"), 0, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-attack:{index}"), 10, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-release:{index}"), 300, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-gain:{index}"), 0, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-compressor-threshold:{index}"), -300, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-expander-threshold:{index}"), -600, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-compressor-ratio:{index}"), 10, ParamFlags::osc())?;
    b.int(&format!("{side}:dyn-expander-ratio:{index}"), 10, ParamFlags::osc())?;

    b.int(&format!("{side}:autolevel-activate:{index}"), 0, ParamFlags::osc())?;
    b.int(&format!("{side}:autolevel-max-gain:{index}"), 0, ParamFlags::osc())?;
    b.int(&format!("{side}:autolevel-head-room:{index}"), 30, ParamFlags::osc())?;
    b.int(&format!("{side}:autolevel-rise-time:{index}"), 1, ParamFlags::osc())?;
    Ok(())
}

/// Declare the complete surface for a card model.
pub fn build(spec: CardSpec) -> Result<DeviceModel, GraphError> {
    let mut b = Builder { store: ParameterStore::new(), graph: MappingGraph::new() };
    let n_inputs = spec.inputs.len();
    let n_outputs = spec.outputs.len();

    b.text("card-model", spec.model, ParamFlags::osc().with_skip_state())?;
    b.int("card-online", 0, ParamFlags::osc().with_skip_state())?;

    // mixer source gains: one scalar per (output, input), gathered into one
    // indexed vector control per (output, input kind)
    for out_index in 0..n_outputs {
        for in_index in 0..n_inputs {
            let kind = spec.inputs[in_index].kind;
            b.int(
                &format!("mixer:{}-source-gain:{out_index}:{in_index}", kind.as_str()),
                gain::MONITOR_RANGE_RAW.0,
                ParamFlags::default(),
            )?;
        }
        for kind in spec.input_kinds() {
            let members = spec.inputs_of(kind);
            let control = format!("mixer:{}-source-gain", kind.as_str());
            let vec_name = format!("{control}:{out_index}");
            b.int_vec(
                &vec_name,
                members.len(),
                None,
                ParamFlags::alsa(AlsaSpec::indexed(control.clone(), out_index as u32)),
            )?;
            let sources: Vec<String> = members
                .iter()
                .map(|i| format!("mixer:{}-source-gain:{out_index}:{i}", kind.as_str()))
                .collect();
            b.map(&sources, &[vec_name], Transform::Gather, None)?;
        }
    }

    // output strips
    for (out_index, out) in spec.outputs.iter().enumerate() {
        let kind = out.kind;

        b.text(
            &format!("output:hardware-name:{out_index}"),
            &out.hw_name,
            ParamFlags::osc().with_skip_state(),
        )?;
        b.text(
            &format!("output:type:{out_index}"),
            kind.as_str(),
            ParamFlags::osc().with_skip_state(),
        )?;
        b.text(&format!("output:name:{out_index}"), "", ParamFlags::osc())?;
        b.text(&format!("output:color:{out_index}"), "", ParamFlags::osc())?;
        b.int(
            &format!("output:hide:{out_index}"),
            0,
            ParamFlags::osc().with_output_type(kind),
        )?;

        b.float(&format!("output:volume-db:{out_index}"), 0.0, ParamFlags::osc())?;
        b.int(&format!("output:mute:{out_index}"), 0, ParamFlags::osc())?;
        b.int(
            &format!("output:stereo:{out_index}"),
            0,
            ParamFlags::osc().with_order(-10),
        )?;

        b.int(&format!("output:volume:{out_index}"), 0, ParamFlags::default())?;
        b.map(
            &[
                format!("output:volume-db:{out_index}"),
                format!("output:mute:{out_index}"),
                format!("output:hide:{out_index}"),
            ],
            &[format!("output:volume:{out_index}")],
            Transform::VolumeToRaw,
            None,
        )?;

        b.float(
            &format!("output:meter:{out_index}"),
            gain::SILENCE_DB,
            ParamFlags::osc().with_output_type(kind).with_skip_state(),
        )?;

        b.int(&format!("output:invert-phase:{out_index}"), 0, ParamFlags::osc())?;
        if kind == ChannelKind::Line {
            b.int(&format!("output:line-level:{out_index}"), 1, ParamFlags::osc())?;
        }

        b.float(
            &format!("output:fx-return:{out_index}"),
            -65.0,
            ParamFlags::osc().with_output_type(kind),
        )?;

        declare_processing_strip(&mut b, "output", out_index, true)?;

        // stream return: straight routing from the playback streams
        b.float(&format!("output:stream-return:{out_index}"), 0.0, ParamFlags::osc())?;
        b.int_vec(
            &format!("mixer:stream-source-gain:{out_index}"),
            n_outputs,
            None,
            ParamFlags::alsa(AlsaSpec::indexed("mixer:stream-source-gain", out_index as u32)),
        )?;
        b.map(
            &[format!("output:stream-return:{out_index}")],
            &[format!("mixer:stream-source-gain:{out_index}")],
            Transform::StreamReturn { slot: out_index, len: n_outputs },
            None,
        )?;

        // monitor return: global dimmer over this output's monitor mix
        b.float(&format!("output:monitor-return:{out_index}"), 0.0, ParamFlags::osc())?;
    }

    // per-output scalars gathered into the ALSA vector controls
    for control in output_array_controls() {
        b.int_vec(&control, n_outputs, None, ParamFlags::alsa(AlsaSpec::mixer()))?;
        let sources: Vec<String> = (0..n_outputs).map(|i| format!("{control}:{i}")).collect();
        b.map(&sources, &[control], Transform::Gather, None)?;
    }

    let line_outputs = spec.outputs_of(ChannelKind::Line);
    b.int_vec(
        "output:line-level",
        line_outputs.len(),
        None,
        ParamFlags::alsa(AlsaSpec::mixer()),
    )?;
    let sources: Vec<String> = line_outputs
        .iter()
        .map(|i| format!("output:line-level:{i}"))
        .collect();
    b.map(&sources, &["output:line-level".to_string()], Transform::Gather, None)?;

    for kind in spec.output_kinds() {
        let members = spec.outputs_of(kind);
        let kind_s = kind.as_str();

        // fx return sends, device unit is tenths of a dB
        b.int_vec(
            &format!("fx:{kind_s}-output-volume"),
            members.len(),
            None,
            ParamFlags::alsa(AlsaSpec::mixer()),
        )?;
        let sources: Vec<String> = members.iter().map(|i| format!("output:fx-return:{i}")).collect();
        b.map(
            &sources,
            &[format!("fx:{kind_s}-output-volume")],
            Transform::GatherAffine { mul: 10.0, add: 0.0 },
            None,
        )?;

        // meter polling is skipped while every channel of the kind is hidden
        b.int(&format!("output:{kind_s}-meters-visible"), 1, ParamFlags::default())?;
        let sources: Vec<String> = members.iter().map(|i| format!("output:hide:{i}")).collect();
        b.map(
            &sources,
            &[format!("output:{kind_s}-meters-visible")],
            Transform::AnyVisible,
            None,
        )?;

        b.int_vec(
            &format!("meter:{kind_s}-output"),
            members.len(),
            None,
            ParamFlags::alsa(AlsaSpec::card()).with_skip_state(),
        )?;
        let dests: Vec<String> = members.iter().map(|i| format!("output:meter:{i}")).collect();
        b.map(
            &[format!("meter:{kind_s}-output")],
            &dests,
            Transform::MeterToDb,
            None,
        )?;
    }

    // input strips
    for (in_index, inp) in spec.inputs.iter().enumerate() {
        let kind = inp.kind;

        b.text(
            &format!("input:hardware-name:{in_index}"),
            &inp.hw_name,
            ParamFlags::osc().with_skip_state(),
        )?;
        b.text(
            &format!("input:type:{in_index}"),
            kind.as_str(),
            ParamFlags::osc().with_skip_state(),
        )?;
        b.text(&format!("input:name:{in_index}"), "", ParamFlags::osc())?;
        b.text(&format!("input:color:{in_index}"), "", ParamFlags::osc())?;
        b.int(
            &format!("input:hide:{in_index}"),
            0,
            ParamFlags::osc().with_input_type(kind),
        )?;

        b.float(
            &format!("input:meter:{in_index}"),
            gain::SILENCE_DB,
            ParamFlags::osc().with_input_type(kind).with_skip_state(),
        )?;

        if kind == ChannelKind::Line {
            b.int(&format!("input:line-level:{in_index}"), 0, ParamFlags::osc())?;
        }

        if kind == ChannelKind::Mic {
            for option in &spec.mic_options {
                b.int(
                    &format!("input:{option}:{in_index}"),
                    0,
                    ParamFlags::osc().with_input_type(kind),
                )?;
            }

            // instrument input and phantom power are mutually exclusive
            // (also protected at the driver level)
            if spec.model == "802" {
                b.map_feedback(
                    &[format!("input:mic-instrument:{in_index}")],
                    &[format!("input:mic-power:{in_index}")],
                    Transform::InvertToggle,
                    Some(Gate::truthy(format!("input:mic-instrument:{in_index}"))),
                )?;
                b.map_feedback(
                    &[format!("input:mic-power:{in_index}")],
                    &[format!("input:mic-instrument:{in_index}")],
                    Transform::InvertToggle,
                    Some(Gate::truthy(format!("input:mic-power:{in_index}"))),
                )?;
            }
        }

        b.float(
            &format!("input:fx-send:{in_index}"),
            -65.0,
            ParamFlags::osc().with_input_type(kind),
        )?;

        declare_processing_strip(&mut b, "input", in_index, false)?;
    }

    for control in input_array_controls() {
        b.int_vec(&control, n_inputs, None, ParamFlags::alsa(AlsaSpec::mixer()))?;
        let sources: Vec<String> = (0..n_inputs).map(|i| format!("{control}:{i}")).collect();
        b.map(&sources, &[control], Transform::Gather, None)?;
    }

    let line_inputs = spec.inputs_of(ChannelKind::Line);
    b.int_vec(
        "input:line-level",
        line_inputs.len(),
        None,
        ParamFlags::alsa(AlsaSpec::mixer()),
    )?;
    let sources: Vec<String> = line_inputs
        .iter()
        .map(|i| format!("input:line-level:{i}"))
        .collect();
    b.map(&sources, &["input:line-level".to_string()], Transform::Gather, None)?;

    let mic_inputs = spec.inputs_of(ChannelKind::Mic);
    for option in &spec.mic_options {
        let control = format!("input:{option}");
        b.int_vec(&control, mic_inputs.len(), None, ParamFlags::alsa(AlsaSpec::mixer()))?;
        let sources: Vec<String> = mic_inputs
            .iter()
            .map(|i| format!("input:{option}:{i}"))
            .collect();
        b.map(&sources, &[control], Transform::Gather, None)?;
    }

    for kind in spec.input_kinds() {
        let members = spec.inputs_of(kind);
        let kind_s = kind.as_str();

        b.int_vec(
            &format!("fx:{kind_s}-source-gain"),
            members.len(),
            None,
            ParamFlags::alsa(AlsaSpec::mixer()),
        )?;
        let sources: Vec<String> = members.iter().map(|i| format!("input:fx-send:{i}")).collect();
        b.map(
            &sources,
            &[format!("fx:{kind_s}-source-gain")],
            Transform::GatherAffine { mul: 10.0, add: 0.0 },
            None,
        )?;

        b.int(&format!("input:{kind_s}-meters-visible"), 1, ParamFlags::default())?;
        let sources: Vec<String> = members.iter().map(|i| format!("input:hide:{i}")).collect();
        b.map(
            &sources,
            &[format!("input:{kind_s}-meters-visible")],
            Transform::AnyVisible,
            None,
        )?;

        b.int_vec(
            &format!("meter:{kind_s}-input"),
            members.len(),
            None,
            ParamFlags::alsa(AlsaSpec::card()).with_skip_state(),
        )?;
        let dests: Vec<String> = members.iter().map(|i| format!("input:meter:{i}")).collect();
        b.map(
            &[format!("meter:{kind_s}-input")],
            &dests,
            Transform::MeterToDb,
            None,
        )?;
    }

    b.int("metering", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;

    // monitor mixers: per-output fader/pan/mute for every input, routed to
    // raw mixer gains mono or as a stereo pair depending on the link state
    for out_index in 0..n_outputs {
        let stereo_index = (out_index / 2) * 2;
        let stereo_gate = format!("output:stereo:{stereo_index}");

        for (in_index, inp) in spec.inputs.iter().enumerate() {
            b.float(
                &format!("monitor:input-gain:{out_index}:{in_index}"),
                gain::MONITOR_RANGE_DB.0,
                ParamFlags::osc(),
            )?;
            b.float(&format!("monitor:input-pan:{out_index}:{in_index}"), 0.5, ParamFlags::osc())?;
            b.int(&format!("monitor:input-mute:{out_index}:{in_index}"), 0, ParamFlags::osc())?;

            let sources = [
                format!("monitor:input-gain:{out_index}:{in_index}"),
                format!("monitor:input-pan:{out_index}:{in_index}"),
                format!("monitor:input-mute:{out_index}:{in_index}"),
                format!("input:hide:{in_index}"),
                format!("output:monitor-return:{out_index}"),
            ];
            b.map(
                &sources,
                &[format!("mixer:{}-source-gain:{out_index}:{in_index}", inp.kind.as_str())],
                Transform::MonitorMono,
                Some(Gate::falsy(stereo_gate.clone())),
            )?;
        }

        if out_index % 2 == 0 {
            for (in_index, inp) in spec.inputs.iter().enumerate() {
                let sources = [
                    format!("monitor:input-gain:{out_index}:{in_index}"),
                    format!("monitor:input-pan:{out_index}:{in_index}"),
                    format!("monitor:input-mute:{out_index}:{in_index}"),
                    format!("input:hide:{in_index}"),
                    format!("output:monitor-return:{out_index}"),
                ];
                let kind_s = inp.kind.as_str();
                b.map(
                    &sources,
                    &[
                        format!("mixer:{kind_s}-source-gain:{out_index}:{in_index}"),
                        format!("mixer:{kind_s}-source-gain:{}:{in_index}", out_index + 1),
                    ],
                    Transform::MonitorStereo,
                    Some(Gate::truthy(stereo_gate.clone())),
                )?;
            }

            // while linked, the even channel's strip drives the odd one
            let mut linked: Vec<String> = [
                "output:hide",
                "output:volume-db",
                "output:mute",
                "output:name",
                "output:color",
                "output:eq-activate",
                "output:hpf-activate-conditionnal",
                "output:hpf-cut-off",
                "output:hpf-roll-off",
                "output:dyn-activate",
                "output:dyn-attack",
                "output:dyn-release",
                "output:dyn-gain",
                "output:dyn-compressor-threshold",
                "output:dyn-expander-threshold",
                "output:dyn-compressor-ratio",
                "output:dyn-expander-ratio",
                "output:stream-return",
                "output:monitor-return",
                "output:fx-return",
            ]
            .map(String::from)
            .to_vec();
            linked.extend(eq_control_names().iter().map(|c| format!("output:{c}")));
            if spec.outputs[out_index].kind == ChannelKind::Line {
                linked.push("output:line-level".to_string());
            }

            for param in linked {
                b.map(
                    &[format!("{param}:{out_index}")],
                    &[format!("{param}:{}", out_index + 1)],
                    Transform::Identity,
                    Some(Gate::truthy(stereo_gate.clone())),
                )?;
            }

            // the link toggle itself mirrors both ways
            b.map_feedback(
                &[format!("output:stereo:{out_index}")],
                &[format!("output:stereo:{}", out_index + 1)],
                Transform::Identity,
                None,
            )?;
            b.map_feedback(
                &[format!("output:stereo:{}", out_index + 1)],
                &[format!("output:stereo:{out_index}")],
                Transform::Identity,
                None,
            )?;

            b.float(
                &format!("output:pan:{out_index}"),
                0.5,
                ParamFlags::osc().with_order(-9),
            )?;
        }
    }

    // stereo pair vectors; link before balance, both before channel state
    let n_pairs = n_outputs / 2;
    b.int_vec(
        "output:stereo-link",
        n_pairs,
        None,
        ParamFlags::alsa(AlsaSpec::mixer()).with_order(-2),
    )?;
    let sources: Vec<String> = (0..n_outputs)
        .step_by(2)
        .map(|i| format!("output:stereo:{i}"))
        .collect();
    b.map(&sources, &["output:stereo-link".to_string()], Transform::Gather, None)?;

    b.int_vec(
        "output:stereo-balance",
        n_pairs,
        Some(vec![0; n_pairs]),
        ParamFlags::alsa(AlsaSpec::mixer()).with_order(-1),
    )?;
    let sources: Vec<String> = (0..n_outputs)
        .step_by(2)
        .map(|i| format!("output:pan:{i}"))
        .collect();
    b.map(
        &sources,
        &["output:stereo-balance".to_string()],
        Transform::GatherAffine { mul: 200.0, add: -100.0 },
        None,
    )?;

    // fx: echo
    b.int("fx:echo-activate", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-delay", 10, ParamFlags::alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-feedback", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-lpf-freq", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-stereo-width", 100, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-type", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-volume", 0, ParamFlags::alsa(AlsaSpec::mixer()))?;
    b.int("fx:echo-volume-db", 0, ParamFlags::osc())?;
    b.float("fx:echo-delay-s", 0.1, ParamFlags::osc())?;
    b.map(
        &["fx:echo-volume-db".to_string()],
        &["fx:echo-volume".to_string()],
        Transform::ScaleRound(10.0),
        None,
    )?;
    b.map(
        &["fx:echo-delay-s".to_string()],
        &["fx:echo-delay".to_string()],
        Transform::ScaleRound(100.0),
        None,
    )?;

    // fx: reverb
    b.int("fx:reverb-activate", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-attack", 100, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-hold", 300, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-release", 250, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-type", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-room-scale", 100, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-smooth", 100, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-stereo-width", 100, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-time", 10, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-volume", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-damping", 20000, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-post-lpf-freq", 20000, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-pre-delay", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-pre-hpf-freq", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;
    b.int("fx:reverb-volume-db", 0, ParamFlags::osc())?;
    b.float("fx:reverb-time-s", 1.0, ParamFlags::osc())?;
    b.map(
        &["fx:reverb-volume-db".to_string()],
        &["fx:reverb-volume".to_string()],
        Transform::ScaleRound(10.0),
        None,
    )?;
    b.map(
        &["fx:reverb-time-s".to_string()],
        &["fx:reverb-time".to_string()],
        Transform::ScaleRound(10.0),
        None,
    )?;

    // clock and sync, read-only parts are polled
    b.int(
        "active-clock-rate",
        2,
        ParamFlags::osc()
            .with_alsa(AlsaSpec::card())
            .with_skip_state()
            .with_poll(),
    )?;
    b.int(
        "active-clock-source",
        0,
        ParamFlags::osc()
            .with_alsa(AlsaSpec::card())
            .with_skip_state()
            .with_poll(),
    )?;

    for name in ["external-source-lock", "external-source-rate", "external-source-sync"] {
        for i in 0..4 {
            b.int(&format!("{name}:{i}"), 0, ParamFlags::osc().with_skip_state())?;
        }
        b.int_vec(
            name,
            4,
            Some(vec![0; 4]),
            ParamFlags::alsa(AlsaSpec::card()).with_skip_state().with_poll(),
        )?;
        let dests: Vec<String> = (0..4).map(|i| format!("{name}:{i}")).collect();
        b.map(&[name.to_string()], &dests, Transform::FanOut, None)?;
    }

    for name in [
        "primary-clock-source",
        "optical-output-signal",
        "spdif-input-interface",
        "spdif-output-format",
        "word-clock-single-speed",
    ] {
        let default = if name == "spdif-output-format" { 1 } else { 0 };
        b.int(name, default, ParamFlags::osc().with_alsa(AlsaSpec::card()))?;
    }

    b.int("effect-on-input", 0, ParamFlags::osc().with_alsa(AlsaSpec::mixer()))?;

    // channel selection replays last so scoped widgets resolve against it
    b.int("input:select", 0, ParamFlags::osc().with_order(10))?;
    b.int("output:select", 0, ParamFlags::osc().with_order(10))?;

    // gui constants, pushed early so the layout sizes itself first
    b.int(
        "inputs",
        n_inputs as i64,
        ParamFlags::osc().with_skip_state().with_order(-2),
    )?;
    b.int(
        "outputs",
        n_outputs as i64,
        ParamFlags::osc().with_skip_state().with_order(-2),
    )?;

    b.int("show-eq", 1, ParamFlags::osc())?;
    b.int("show-dyn", 1, ParamFlags::osc())?;
    b.int("show-fx", 1, ParamFlags::osc())?;
    b.int("show-hw", 1, ParamFlags::osc())?;

    b.text("state-slots", "", ParamFlags::osc().with_skip_state())?;
    b.text("current-state", "", ParamFlags::osc().with_skip_state())?;

    b.int("gui-clients", 0, ParamFlags::default().with_skip_state())?;

    b.graph.validate(&b.store)?;

    info!(
        model = spec.model,
        parameters = b.store.len(),
        mappings = b.graph.len(),
        "surface declared"
    );

    Ok(DeviceModel { spec, store: b.store, graph: b.graph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamId;

    fn model_802() -> DeviceModel {
        build(CardSpec::model_802()).unwrap()
    }

    fn set_and_propagate(model: &mut DeviceModel, name: &str, value: Value) -> Vec<ParamId> {
        let id = model.store.id(name).unwrap();
        model.store.set(id, value).unwrap();
        let mut touched = Vec::new();
        model.graph.propagate(&mut model.store, id, &mut touched).unwrap();
        touched
    }

    #[test]
    fn test_802_layout() {
        let model = model_802();
        assert_eq!(model.spec.inputs.len(), 30);
        assert_eq!(model.spec.outputs.len(), 30);
        assert!(model.store.len() > 600);
        assert!(model.store.by_name("mixer:adat-source-gain:29:29").is_some());
        assert!(model.store.by_name("input:mic-instrument:8").is_some());
        assert_eq!(
            model.store.by_name("outputs").unwrap().value,
            Some(Value::int(30))
        );
    }

    #[test]
    fn test_ucx_layout() {
        let model = build(CardSpec::model_ucx()).unwrap();
        assert_eq!(model.spec.inputs.len(), 18);
        assert_eq!(model.spec.outputs.len(), 18);
        // no instrument switch on the UCX preamps
        assert!(model.store.by_name("input:mic-instrument:0").is_none());
        assert!(model.store.by_name("input:mic-power:0").is_some());
    }

    #[test]
    fn test_volume_db_drives_raw_and_array() {
        let mut model = model_802();
        set_and_propagate(&mut model, "output:volume-db:3", Value::float(-12.0));

        let raw = model.store.by_name("output:volume:3").unwrap();
        assert_eq!(raw.value, Some(Value::int(-120)));

        // the gathered vector gets the same value at index 3
        let array = model.store.by_name("output:volume").unwrap();
        let Some(Value::Int(values)) = &array.value else {
            panic!("output:volume not gathered");
        };
        assert_eq!(values.len(), 30);
        assert_eq!(values[3], -120);
    }

    #[test]
    fn test_mute_folds_into_raw_volume() {
        let mut model = model_802();
        set_and_propagate(&mut model, "output:mute:0", Value::int(1));
        let raw = model.store.by_name("output:volume:0").unwrap();
        assert_eq!(raw.value, Some(Value::int(-900)));
    }

    #[test]
    fn test_monitor_fader_mono_path() {
        let mut model = model_802();
        set_and_propagate(&mut model, "monitor:input-gain:0:0", Value::float(6.0));

        let raw = model.store.by_name("mixer:line-source-gain:0:0").unwrap();
        assert_eq!(raw.value, Some(Value::int(gain::MONITOR_RANGE_RAW.1)));

        // the paired stereo gain is untouched while the pair is unlinked
        let other = model.store.by_name("mixer:line-source-gain:1:0").unwrap();
        assert_eq!(other.value, Some(Value::int(gain::MONITOR_RANGE_RAW.0)));
    }

    #[test]
    fn test_monitor_fader_stereo_path() {
        let mut model = model_802();
        set_and_propagate(&mut model, "output:stereo:0", Value::int(1));
        set_and_propagate(&mut model, "monitor:input-gain:0:0", Value::float(6.0));

        let left = model.store.by_name("mixer:line-source-gain:0:0").unwrap();
        let right = model.store.by_name("mixer:line-source-gain:1:0").unwrap();
        assert_eq!(left.value, Some(Value::int(gain::MONITOR_RANGE_RAW.1)));
        assert_eq!(right.value, Some(Value::int(gain::MONITOR_RANGE_RAW.1)));
    }

    #[test]
    fn test_stereo_toggle_mirrors_and_links_strip() {
        let mut model = model_802();
        let touched = set_and_propagate(&mut model, "output:stereo:0", Value::int(1));

        let odd = model.store.by_name("output:stereo:1").unwrap();
        assert_eq!(odd.value, Some(Value::int(1)));

        // link vector carries the pair state
        let link = model.store.by_name("output:stereo-link").unwrap();
        let Some(Value::Int(links)) = &link.value else { panic!() };
        assert_eq!(links[0], 1);
        assert!(!touched.is_empty());

        // linked forwarding now mirrors the even strip onto the odd one
        set_and_propagate(&mut model, "output:volume-db:0", Value::float(-20.0));
        let odd_vol = model.store.by_name("output:volume-db:1").unwrap();
        assert_eq!(odd_vol.value, Some(Value::float(-20.0)));
    }

    #[test]
    fn test_hpf_activation_requires_eq() {
        let mut model = model_802();
        set_and_propagate(&mut model, "input:hpf-activate-conditionnal:2", Value::int(1));
        assert_eq!(
            model.store.by_name("input:hpf-activate:2").unwrap().value,
            Some(Value::int(0))
        );

        set_and_propagate(&mut model, "input:eq-activate:2", Value::int(1));
        assert_eq!(
            model.store.by_name("input:hpf-activate:2").unwrap().value,
            Some(Value::int(1))
        );
    }

    #[test]
    fn test_meter_vector_fans_out_in_db() {
        let mut model = model_802();
        let mut raw = vec![0i64; 8];
        raw[2] = 134_217_712;
        set_and_propagate(&mut model, "meter:line-output", Value::ints(raw));

        assert_eq!(
            model.store.by_name("output:meter:2").unwrap().value,
            Some(Value::float(0.0))
        );
        assert_eq!(
            model.store.by_name("output:meter:0").unwrap().value,
            Some(Value::float(gain::SILENCE_DB))
        );
    }

    #[test]
    fn test_pan_feeds_stereo_balance() {
        let mut model = model_802();
        set_and_propagate(&mut model, "output:pan:0", Value::float(0.0));
        let balance = model.store.by_name("output:stereo-balance").unwrap();
        let Some(Value::Int(values)) = &balance.value else { panic!() };
        assert_eq!(values[0], -100);
        assert_eq!(values[1], 0);
    }

    #[test]
    fn test_mic_exclusion_on_802() {
        let mut model = model_802();
        set_and_propagate(&mut model, "input:mic-power:8", Value::int(1));
        set_and_propagate(&mut model, "input:mic-instrument:8", Value::int(1));
        assert_eq!(
            model.store.by_name("input:mic-power:8").unwrap().value,
            Some(Value::int(0))
        );
    }

    #[test]
    fn test_fx_scaling() {
        let mut model = model_802();
        set_and_propagate(&mut model, "fx:echo-delay-s", Value::float(0.25));
        assert_eq!(
            model.store.by_name("fx:echo-delay").unwrap().value,
            Some(Value::int(25))
        );

        set_and_propagate(&mut model, "fx:reverb-volume-db", Value::int(-6));
        assert_eq!(
            model.store.by_name("fx:reverb-volume").unwrap().value,
            Some(Value::int(-60))
        );
    }

    #[test]
    fn test_external_source_fan_out() {
        let mut model = model_802();
        set_and_propagate(&mut model, "external-source-lock", Value::ints(vec![1, 0, 1, 0]));
        assert_eq!(
            model.store.by_name("external-source-lock:0").unwrap().value,
            Some(Value::int(1))
        );
        assert_eq!(
            model.store.by_name("external-source-lock:1").unwrap().value,
            Some(Value::int(0))
        );
    }
}
