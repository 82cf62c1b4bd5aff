//! Presentation bridge: the GUI side of the surface.
//!
//! Keeps two caches: the local cache is the authoritative view of every
//! GUI-routed parameter, the remote cache mirrors what the client last saw
//! (or last sent). A push is skipped when the remote cache already holds the
//! value, so edits echoing back from the GUI cost no wire traffic. Meter
//! values bypass both caches on a fire-and-forget fast path that disables
//! the receiving widget's echo.
//!
//! Parameters scoped to a channel index are filtered against the current
//! selection; on (re)connect the full local cache replays in ascending
//! priority order so selector widgets initialize before the widgets scoped
//! to them.

use std::collections::HashMap;

use ffmix_proto::{encode_notify, encode_param, encode_script_set, Value};
use tracing::trace;

/// Outbound packet sink. The production transport is the daemon's UDP
/// socket aimed at the connected client; tests substitute a recorder.
pub trait OscTransport: Send {
    fn send(&mut self, payload: &[u8]);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    order: i32,
    decl: usize,
}

/// Channel-selection filter. A parameter namespaced to a specific channel
/// index is visible only while that index is selected. Matching is done on
/// colon segments, never on substrings (`:1:` must not match `:11:`).
pub fn selection_visible(name: &str, out_sel: i64, in_sel: i64) -> bool {
    let segments: Vec<&str> = name.split(':').collect();

    // monitor:<control>:<out>:<in> is scoped to the selected output
    if segments.first() == Some(&"monitor") {
        return segments
            .get(2)
            .and_then(|s| s.parse::<i64>().ok())
            .is_some_and(|idx| idx == out_sel);
    }

    // per-channel eq/hpf controls follow their side's selection; the
    // activate toggles stay visible on every strip
    let scoped_eq = |prefix: &str, sel: i64| -> Option<bool> {
        if segments.first() != Some(&prefix) {
            return None;
        }
        let control = *segments.get(1)?;
        if !(control.starts_with("eq-") || control.starts_with("hpf-")) {
            return None;
        }
        if control.contains("activate") {
            return None;
        }
        Some(
            segments
                .last()
                .and_then(|s| s.parse::<i64>().ok())
                .is_some_and(|idx| idx == sel),
        )
    };
    if let Some(visible) = scoped_eq("output", out_sel) {
        return visible;
    }
    if let Some(visible) = scoped_eq("input", in_sel) {
        return visible;
    }

    true
}

/// GUI-side cache pair plus the outbound transport.
pub struct PresentationBridge {
    local: HashMap<String, CacheEntry>,
    remote: HashMap<String, Value>,
    connected: bool,
    transport: Option<Box<dyn OscTransport>>,
}

impl Default for PresentationBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationBridge {
    pub fn new() -> Self {
        Self {
            local: HashMap::new(),
            remote: HashMap::new(),
            connected: false,
            transport: None,
        }
    }

    pub fn set_transport(&mut self, transport: Box<dyn OscTransport>) {
        self.transport = Some(transport);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn raw_send(&mut self, payload: Vec<u8>) {
        if let Some(t) = self.transport.as_mut() {
            t.send(&payload);
        }
    }

    /// Record a value the client itself sent, so the set that follows does
    /// not echo straight back.
    pub fn record_remote(&mut self, name: &str, value: &Value) {
        self.remote.insert(name.to_string(), value.clone());
    }

    /// Push one GUI-routed parameter change.
    ///
    /// `order`/`decl` are the parameter's replay priority and declaration
    /// index; selection comes from the current select parameters.
    pub fn push(
        &mut self,
        name: &str,
        value: &Value,
        order: i32,
        decl: usize,
        out_sel: i64,
        in_sel: i64,
    ) {
        // meter fast path: no cache, no dedup, widget echo disabled
        if name.contains("meter:") {
            let payload = encode_script_set(name, value);
            self.raw_send(payload);
            return;
        }

        self.local.insert(
            name.to_string(),
            CacheEntry { value: value.clone(), order, decl },
        );

        if !self.connected {
            return;
        }

        // a selection change re-triggers the replay of its scoped widgets
        if name == "output:select" || name == "input:select" {
            self.replay_filtered(out_sel, in_sel);
        }

        if self.remote.get(name) == Some(value) {
            trace!(name, "push elided, remote cache current");
            return;
        }
        if !selection_visible(name, out_sel, in_sel) {
            return;
        }

        self.remote.insert(name.to_string(), value.clone());
        let payload = encode_param(name, value);
        self.raw_send(payload);
    }

    /// Full replay for a fresh client: every cached parameter passing the
    /// selection filter, ascending (priority, declaration) order, then the
    /// selection parameters once more to settle their scoped widgets.
    pub fn replay_all(&mut self, out_sel: i64, in_sel: i64) {
        self.connected = true;

        let mut entries: Vec<(String, Value, i32, usize)> = self
            .local
            .iter()
            .map(|(name, e)| (name.clone(), e.value.clone(), e.order, e.decl))
            .collect();
        entries.sort_by_key(|(_, _, order, decl)| (*order, *decl));

        for (name, value, _, _) in entries {
            if selection_visible(&name, out_sel, in_sel) {
                self.remote.insert(name.clone(), value.clone());
                let payload = encode_param(&name, &value);
                self.raw_send(payload);
            }
        }

        for select in ["output:select", "input:select"] {
            if let Some(entry) = self.local.get(select) {
                let payload = encode_param(select, &entry.value);
                self.raw_send(payload);
            }
        }
    }

    fn replay_filtered(&mut self, out_sel: i64, in_sel: i64) {
        let mut entries: Vec<(String, Value, i32, usize)> = self
            .local
            .iter()
            .map(|(name, e)| (name.clone(), e.value.clone(), e.order, e.decl))
            .collect();
        entries.sort_by_key(|(_, _, order, decl)| (*order, *decl));

        for (name, value, _, _) in entries {
            if selection_visible(&name, out_sel, in_sel) {
                self.remote.insert(name.clone(), value.clone());
                let payload = encode_param(&name, &value);
                self.raw_send(payload);
            }
        }
    }

    /// Toast notification on the client.
    pub fn notify(&mut self, icon: &str, text: &str) {
        let payload = encode_notify(icon, text);
        self.raw_send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        packets: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl OscTransport for Recorder {
        fn send(&mut self, payload: &[u8]) {
            self.packets.lock().unwrap().push(payload.to_vec());
        }
    }

    fn decoded_addrs(packets: &[Vec<u8>]) -> Vec<String> {
        packets
            .iter()
            .map(|p| {
                let (_, packet) = rosc::decoder::decode_udp(p).unwrap();
                match packet {
                    rosc::OscPacket::Message(m) => m.addr,
                    _ => panic!("unexpected bundle"),
                }
            })
            .collect()
    }

    fn bridge_with_recorder() -> (PresentationBridge, Recorder) {
        let mut bridge = PresentationBridge::new();
        let recorder = Recorder::default();
        bridge.set_transport(Box::new(recorder.clone()));
        (bridge, recorder)
    }

    #[test]
    fn test_selection_filter_structural_match() {
        // monitor params follow the output selection by exact segment
        assert!(selection_visible("monitor:input-gain:1:4", 1, 0));
        assert!(!selection_visible("monitor:input-gain:11:4", 1, 0));
        assert!(!selection_visible("monitor:input-gain:1:4", 2, 0));

        // eq/hpf follow their side's selection, activate stays global
        assert!(selection_visible("output:eq-low-gain:3", 3, 0));
        assert!(!selection_visible("output:eq-low-gain:3", 4, 0));
        assert!(selection_visible("output:eq-activate:3", 4, 0));
        assert!(selection_visible("input:hpf-cut-off:2", 0, 2));
        assert!(!selection_visible("input:hpf-cut-off:2", 0, 3));
        assert!(selection_visible("input:hpf-activate-conditionnal:2", 0, 9));

        // everything else is unscoped
        assert!(selection_visible("output:volume-db:7", 0, 0));
        assert!(selection_visible("metering", 0, 0));
    }

    #[test]
    fn test_unchanged_push_sends_once() {
        let (mut bridge, recorder) = bridge_with_recorder();
        bridge.replay_all(0, 0);

        bridge.push("output:mute:0", &Value::int(1), 0, 0, 0, 0);
        bridge.push("output:mute:0", &Value::int(1), 0, 0, 0, 0);
        assert_eq!(recorder.packets.lock().unwrap().len(), 1);

        bridge.push("output:mute:0", &Value::int(0), 0, 0, 0, 0);
        assert_eq!(recorder.packets.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_no_sends_before_connect_except_meters() {
        let (mut bridge, recorder) = bridge_with_recorder();

        bridge.push("output:volume-db:0", &Value::float(-3.0), 0, 0, 0, 0);
        assert!(recorder.packets.lock().unwrap().is_empty());

        bridge.push("output:meter:0", &Value::float(-20.0), 0, 0, 0, 0);
        assert_eq!(recorder.packets.lock().unwrap().len(), 1);
        let addrs = decoded_addrs(&recorder.packets.lock().unwrap());
        assert_eq!(addrs, vec!["/SCRIPT"]);
    }

    #[test]
    fn test_echo_from_client_is_elided() {
        let (mut bridge, recorder) = bridge_with_recorder();
        bridge.replay_all(0, 0);

        // client sent this value itself; the set's push must not echo
        bridge.record_remote("output:mute:0", &Value::int(1));
        bridge.push("output:mute:0", &Value::int(1), 0, 0, 0, 0);
        assert!(recorder.packets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_replay_priority_order() {
        let (mut bridge, recorder) = bridge_with_recorder();

        // declared out of order: replay must sort by (order, decl)
        bridge.push("show-eq", &Value::int(1), 0, 5, 0, 0);
        bridge.push("outputs", &Value::int(28), -2, 1, 0, 0);
        bridge.push("output:stereo:0", &Value::int(0), -10, 3, 0, 0);
        bridge.push("inputs", &Value::int(30), -2, 0, 0, 0);

        bridge.replay_all(0, 0);
        let addrs = decoded_addrs(&recorder.packets.lock().unwrap());
        assert_eq!(
            addrs,
            vec!["/output:stereo:0", "/inputs", "/outputs", "/show-eq"]
        );
    }

    #[test]
    fn test_replay_applies_selection_filter() {
        let (mut bridge, recorder) = bridge_with_recorder();

        bridge.push("monitor:input-gain:0:2", &Value::float(-10.0), 0, 0, 0, 0);
        bridge.push("monitor:input-gain:5:2", &Value::float(-20.0), 0, 1, 0, 0);
        bridge.push("output:volume-db:5", &Value::float(0.0), 0, 2, 0, 0);

        bridge.replay_all(0, 0);
        let addrs = decoded_addrs(&recorder.packets.lock().unwrap());
        assert!(addrs.contains(&"/monitor:input-gain:0:2".to_string()));
        assert!(!addrs.contains(&"/monitor:input-gain:5:2".to_string()));
        assert!(addrs.contains(&"/output:volume-db:5".to_string()));
    }

    #[test]
    fn test_selection_change_replays_scoped_widgets() {
        let (mut bridge, recorder) = bridge_with_recorder();
        bridge.push("monitor:input-gain:2:0", &Value::float(-30.0), 0, 0, 0, 0);
        bridge.replay_all(0, 0);
        recorder.packets.lock().unwrap().clear();

        // select output 2: its monitor strip becomes visible and replays
        bridge.push("output:select", &Value::int(2), 10, 9, 2, 0);
        let addrs = decoded_addrs(&recorder.packets.lock().unwrap());
        assert!(addrs.contains(&"/monitor:input-gain:2:0".to_string()));
        assert!(addrs.contains(&"/output:select".to_string()));
    }
}
