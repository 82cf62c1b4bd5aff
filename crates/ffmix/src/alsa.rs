//! Hardware bridge: the amixer boundary.
//!
//! Writes go down a single persistent `amixer -s -q` subprocess, one
//! `cset` line at a time. Reads cannot use the pipe (amixer has no
//! interactive cget), so every query is a one-shot subprocess call with a
//! bounded timeout whose output is parsed best-effort; any failure is "no
//! update this cycle", never an error. Presence and model detection read
//! the card's firewire status file under the ALSA proc tree.
//!
//! The pipe is a serialized resource: exactly one writer at a time, lines
//! flushed, no interleaving. The stereo-link workaround depends on this --
//! it is a three-write sequence with a delay in the middle that must not
//! be interleaved with other writes to the balance control.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use ffmix_conf::HardwareConfig;
use ffmix_proto::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::params::{AlsaIface, AlsaSpec};

/// Candidate model names probed at startup, in order.
pub const MODELS: [&str; 2] = ["802", "UCX"];

/// Destination for `cset` lines. The production sink is the amixer pipe;
/// tests substitute a recording sink.
pub trait LineSink: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Release the underlying resource. Default is a no-op.
    fn shutdown(&mut self) {}
}

/// Persistent `amixer -s -q` subprocess fed through stdin.
pub struct AmixerPipe {
    child: Child,
}

impl AmixerPipe {
    pub fn spawn(amixer: &str, model: &str) -> io::Result<Self> {
        let child = Command::new(amixer)
            .args(["-c", &format!("Fireface{model}"), "-s", "-q"])
            .stdin(Stdio::piped())
            .spawn()?;
        Ok(Self { child })
    }
}

impl LineSink for AmixerPipe {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "amixer stdin closed"))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    fn shutdown(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Parse one-shot cget output: the line `  : values=v1,v2,...`.
/// Anything unparseable yields `None`.
pub fn parse_cget_values(output: &str) -> Option<Vec<i64>> {
    let line = output.lines().find(|l| l.contains(": values="))?;
    let raw = line.split('=').nth(1)?;
    let mut values = Vec::new();
    for part in raw.split(',') {
        values.push(part.trim().parse::<i64>().ok()?);
    }
    Some(values)
}

/// Owns the write pipe, the ctl-service child, and the control address
/// cache. Device presence itself (`card-online`) lives in the parameter
/// store; this type only does the I/O.
pub struct HardwareBridge {
    config: HardwareConfig,
    model: String,
    pipe: Mutex<Option<Box<dyn LineSink>>>,
    ctl_service: StdMutex<Option<Child>>,
    lookup_cache: StdMutex<HashMap<String, String>>,
}

impl HardwareBridge {
    pub fn new(config: HardwareConfig, model: impl Into<String>) -> Self {
        Self {
            config,
            model: model.into(),
            pipe: Mutex::new(None),
            ctl_service: StdMutex::new(None),
            lookup_cache: StdMutex::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    fn status_path(proc_root: &std::path::Path, model: &str) -> PathBuf {
        proc_root.join(format!("Fireface{model}/firewire/status"))
    }

    /// Probe the proc tree for a connected card, first match wins.
    pub fn detect_model(config: &HardwareConfig) -> Option<String> {
        for model in MODELS {
            let path = Self::status_path(&config.proc_root, model);
            if std::fs::read_to_string(&path).map(|s| !s.is_empty()).unwrap_or(false) {
                info!(model, "Fireface found");
                return Some(model.to_string());
            }
        }
        None
    }

    /// Is this bridge's card currently present?
    pub fn probe(&self) -> bool {
        std::fs::read_to_string(Self::status_path(&self.config.proc_root, &self.model))
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    /// ALSA card number for the ctl service, from the proc card list.
    pub fn card_number(&self) -> Option<String> {
        let cards = std::fs::read_to_string(self.config.proc_root.join("cards")).ok()?;
        let needle = format!("Fireface{}", self.model);
        for line in cards.lines() {
            if line.contains(&needle) {
                return Some(line.split('[').next()?.trim().to_string());
            }
        }
        None
    }

    /// Start the firewire ctl service for the detected card.
    pub fn spawn_ctl_service(&self) {
        let Some(card) = self.card_number() else {
            warn!(model = %self.model, "card number not found, ctl service not started");
            return;
        };
        match Command::new(&self.config.ctl_service).arg(&card).spawn() {
            Ok(child) => {
                info!(card, "ctl service started");
                *self.ctl_service.lock().unwrap() = Some(child);
            }
            Err(e) => warn!(error = %e, "could not start ctl service"),
        }
    }

    /// (Re)spawn the persistent write pipe.
    pub async fn spawn_pipe(&self) -> io::Result<()> {
        let pipe = AmixerPipe::spawn(&self.config.amixer, &self.model)?;
        let mut guard = self.pipe.lock().await;
        if let Some(mut old) = guard.take() {
            old.shutdown();
        }
        *guard = Some(Box::new(pipe));
        Ok(())
    }

    /// Install an arbitrary sink. Test seam.
    pub async fn install_sink(&self, sink: Box<dyn LineSink>) {
        let mut guard = self.pipe.lock().await;
        if let Some(mut old) = guard.take() {
            old.shutdown();
        }
        *guard = Some(sink);
    }

    /// Kill the pipe and the ctl service. Called on unplug and shutdown.
    pub async fn stop(&self) {
        if let Some(mut pipe) = self.pipe.lock().await.take() {
            pipe.shutdown();
        }
        if let Some(mut child) = self.ctl_service.lock().unwrap().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Resolve (and cache) the textual control address for a parameter.
    pub fn lookup(&self, name: &str, spec: &AlsaSpec) -> String {
        if let Some(hit) = self.lookup_cache.lock().unwrap().get(name) {
            return hit.clone();
        }
        let control = spec.control.as_deref().unwrap_or(name);
        let mut lookup = format!("iface={},name=\"{}\"", spec.iface.as_str(), control);
        if let Some(index) = spec.index {
            lookup.push_str(&format!(",index={index}"));
        }
        self.lookup_cache
            .lock()
            .unwrap()
            .insert(name.to_string(), lookup.clone());
        lookup
    }

    /// Write one `cset` line down the pipe. Silently dropped while offline
    /// (no pipe installed); write failures are logged, never raised.
    pub async fn send(&self, name: &str, spec: &AlsaSpec, value: &Value) {
        let lookup = self.lookup(name, spec);
        let line = format!("cset {lookup} {}", value.to_cset_arg());
        let mut guard = self.pipe.lock().await;
        let Some(pipe) = guard.as_mut() else {
            return;
        };
        if let Err(e) = pipe.write_line(&line) {
            warn!(name, error = %e, "hardware write failed");
        }
    }

    /// Stereo-link toggle workaround. The device ignores a leftward balance
    /// pending at the moment the link flips, so the sequence is: zero the
    /// balance, wait, flip the link, restore the balance. The pipe lock is
    /// held across all three writes.
    pub async fn send_stereo_link(
        &self,
        link_name: &str,
        link_spec: &AlsaSpec,
        link_value: &Value,
        balance_name: &str,
        balance_spec: &AlsaSpec,
        balance_value: &Value,
    ) {
        let n_pairs = balance_value.len();
        let zeroed = Value::ints(vec![0; n_pairs]);
        let link_lookup = self.lookup(link_name, link_spec);
        let balance_lookup = self.lookup(balance_name, balance_spec);

        let mut guard = self.pipe.lock().await;
        let Some(pipe) = guard.as_mut() else {
            return;
        };
        let writes = [
            format!("cset {balance_lookup} {}", zeroed.to_cset_arg()),
            format!("cset {link_lookup} {}", link_value.to_cset_arg()),
            format!("cset {balance_lookup} {}", balance_value.to_cset_arg()),
        ];
        for (i, line) in writes.iter().enumerate() {
            if let Err(e) = pipe.write_line(line) {
                warn!(error = %e, "stereo-link write failed");
                return;
            }
            if i == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        debug!(link = %link_value.to_cset_arg(), "stereo link applied");
    }

    /// One-shot cget with a bounded timeout. Empty result on any failure.
    pub async fn query(&self, name: &str, spec: &AlsaSpec) -> Option<Vec<i64>> {
        let lookup = self.lookup(name, spec);
        self.query_lookup(&lookup).await
    }

    async fn query_lookup(&self, lookup: &str) -> Option<Vec<i64>> {
        let card = format!("Fireface{}", self.model);
        let fut = tokio::process::Command::new(&self.config.amixer)
            .args(["-c", &card, "cget", lookup])
            .stderr(Stdio::null())
            .output();
        let timeout = Duration::from_millis(self.config.query_timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(output)) => parse_cget_values(&String::from_utf8_lossy(&output.stdout)),
            Ok(Err(e)) => {
                debug!(lookup, error = %e, "cget failed");
                None
            }
            Err(_) => {
                debug!(lookup, "cget timed out");
                None
            }
        }
    }

    /// Poll a known-stable control until it answers. Used while the ctl
    /// service is taking over the interface after replug; writes pushed
    /// before this succeeds would be lost.
    pub async fn wait_until_ready(&self, token: &tokio_util::sync::CancellationToken) -> bool {
        let lookup = format!("iface={},name=\"active-clock-rate\"", AlsaIface::Card.as_str());
        loop {
            if token.is_cancelled() {
                return false;
            }
            if self.query_lookup(&lookup).await.is_some() {
                return true;
            }
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    /// Recording sink shared with the test body.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub lines: Arc<StdMutex<Vec<String>>>,
    }

    impl LineSink for RecordingSink {
        fn write_line(&mut self, line: &str) -> io::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn bridge() -> HardwareBridge {
        HardwareBridge::new(HardwareConfig::default(), "802")
    }

    #[test]
    fn test_parse_cget_values() {
        let output = "numid=42,iface=MIXER,name='output:volume'\n  : values=-120,0,-65\n";
        assert_eq!(parse_cget_values(output), Some(vec![-120, 0, -65]));
    }

    #[test]
    fn test_parse_cget_garbage_is_none() {
        assert_eq!(parse_cget_values(""), None);
        assert_eq!(parse_cget_values("amixer: Cannot find the given element\n"), None);
        assert_eq!(parse_cget_values("  : values=1,x,3\n"), None);
    }

    #[test]
    fn test_lookup_building_and_cache() {
        let b = bridge();
        let spec = AlsaSpec::indexed("mixer:line-source-gain", 3);
        let lookup = b.lookup("mixer:line-source-gain:3", &spec);
        assert_eq!(lookup, "iface=MIXER,name=\"mixer:line-source-gain\",index=3");
        // second resolution comes from the cache
        assert_eq!(b.lookup("mixer:line-source-gain:3", &spec), lookup);

        let card = b.lookup("active-clock-rate", &AlsaSpec::card());
        assert_eq!(card, "iface=CARD,name=\"active-clock-rate\"");
    }

    #[tokio::test]
    async fn test_send_writes_cset_line() {
        let b = bridge();
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        b.install_sink(Box::new(sink)).await;

        b.send("output:volume", &AlsaSpec::mixer(), &Value::ints(vec![-120, 0])).await;
        assert_eq!(
            *lines.lock().unwrap(),
            vec!["cset iface=MIXER,name=\"output:volume\" -120,0"]
        );
    }

    #[tokio::test]
    async fn test_send_without_pipe_is_dropped() {
        let b = bridge();
        b.send("output:volume", &AlsaSpec::mixer(), &Value::int(0)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stereo_link_three_write_sequence() {
        let b = bridge();
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        b.install_sink(Box::new(sink)).await;

        b.send_stereo_link(
            "output:stereo-link",
            &AlsaSpec::mixer(),
            &Value::ints(vec![1, 0]),
            "output:stereo-balance",
            &AlsaSpec::mixer(),
            &Value::ints(vec![-100, 40]),
        )
        .await;

        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                "cset iface=MIXER,name=\"output:stereo-balance\" 0,0",
                "cset iface=MIXER,name=\"output:stereo-link\" 1,0",
                "cset iface=MIXER,name=\"output:stereo-balance\" -100,40",
            ]
        );
    }

    #[test]
    fn test_card_number_from_proc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cards"),
            " 0 [HDMI           ]: HDA-Intel - HDA ATI HDMI\n 1 [Fireface802    ]: Fireface802 - Fireface 802\n",
        )
        .unwrap();
        let config = HardwareConfig {
            proc_root: dir.path().to_path_buf(),
            ..HardwareConfig::default()
        };
        let b = HardwareBridge::new(config, "802");
        assert_eq!(b.card_number(), Some("1".to_string()));
    }

    #[test]
    fn test_detect_model_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let status_dir = dir.path().join("FirefaceUCX/firewire");
        std::fs::create_dir_all(&status_dir).unwrap();
        std::fs::write(status_dir.join("status"), "connected\n").unwrap();

        let config = HardwareConfig {
            proc_root: dir.path().to_path_buf(),
            ..HardwareConfig::default()
        };
        assert_eq!(HardwareBridge::detect_model(&config), Some("UCX".to_string()));

        let b = HardwareBridge::new(config.clone(), "UCX");
        assert!(b.probe());
        let b802 = HardwareBridge::new(config, "802");
        assert!(!b802.probe());
    }
}
