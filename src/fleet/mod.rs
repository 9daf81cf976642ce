use chrono::Utc;
use std::time::Instant;

use crate::artifacts::{ArtifactStore, ConfigArtifact};
use crate::config::ConnectFailurePolicy;
use crate::models::{Device, DeviceOutcome, DeviceReport, DeviceState, InfraModel, RunMetrics};
use crate::session::{Connector, DeviceSession, ErrorMatch, OutputChecker, SessionGuard};
use crate::utils::{format_duration, truncate_lines};

/// How the apply loop for one device ended
enum ApplyOutcome {
    AllApplied,
    Aborted { artifact: String, found: ErrorMatch },
    TransportFailed { artifact: String, error: String },
}

/// FleetOrchestrator pushes rendered artifacts to every device of a model,
/// one device at a time, and records what happened to each.
pub struct FleetOrchestrator<C: Connector> {
    connector: C,
    checker: OutputChecker,
    on_connect_error: ConnectFailurePolicy,
}

impl<C: Connector> FleetOrchestrator<C> {
    pub fn new(connector: C, checker: OutputChecker, on_connect_error: ConnectFailurePolicy) -> Self {
        Self {
            connector,
            checker,
            on_connect_error,
        }
    }

    /// Drive every device in model order through connect, apply, save and disconnect.
    ///
    /// A device's failure never stops the loop unless the connect policy is
    /// [`ConnectFailurePolicy::Abort`] and that device could not be reached.
    pub fn run_fleet(&self, model: &InfraModel, store: &ArtifactStore) -> RunMetrics {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("fleet", %run_id);
        let _enter = span.enter();

        tracing::info!("Connecting to {} devices and applying configurations", model.devices.len());

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut devices = Vec::with_capacity(model.devices.len());
        let mut halted_at = None;

        for device in &model.devices {
            let report = self.run_device(device, store.select_for(&device.hostname), store);
            let connect_failed = matches!(report.outcome, DeviceOutcome::ConnectFailed { .. });
            devices.push(report);

            if connect_failed && self.on_connect_error == ConnectFailurePolicy::Abort {
                tracing::error!(
                    "Stopping fleet run: device '{}' is unreachable and ON_CONNECT_ERROR=abort",
                    device.hostname
                );
                halted_at = Some(device.hostname.clone());
                break;
            }
        }

        let total_elapsed = clock.elapsed();
        tracing::info!(
            "Total time taken to configure all devices: {}",
            format_duration(total_elapsed)
        );

        RunMetrics {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total_elapsed,
            devices,
            halted_at,
        }
    }

    /// One device's full turn. The session, once opened, is released on every path.
    fn run_device(
        &self,
        device: &Device,
        artifacts: &[ConfigArtifact],
        store: &ArtifactStore,
    ) -> DeviceReport {
        let hostname = device.hostname.as_str();
        let host = device.connection.host.as_str();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut trail = vec![DeviceState::Idle];
        let mut sent = 0;

        tracing::info!("Processing {} config files for device '{}'", artifacts.len(), hostname);

        let outcome = match read_artifacts(artifacts, store) {
            Err((artifact, error)) => {
                tracing::error!("Cannot read '{}' for device '{}': {}", artifact, hostname, error);
                DeviceOutcome::ArtifactFailed { artifact, error }
            }
            Ok(texts) => {
                trail.push(DeviceState::Connecting);
                match self.connector.connect(&device.connection) {
                    Err(e) => {
                        tracing::error!("Could not connect to device '{}' at IP '{}': {}", hostname, host, e);
                        DeviceOutcome::ConnectFailed { error: e.to_string() }
                    }
                    Ok(session) => {
                        trail.push(DeviceState::Connected);
                        tracing::info!("Connected to device '{}' at IP '{}'", hostname, host);

                        let mut session = SessionGuard::new(session, host);
                        let applied = self.apply_artifacts(&mut *session, hostname, &texts, &mut trail, &mut sent);
                        let outcome = match applied {
                            ApplyOutcome::AllApplied => {
                                trail.push(DeviceState::AllApplied);
                                self.save(&mut *session, hostname, host, &mut trail)
                            }
                            ApplyOutcome::Aborted { artifact, found } => {
                                trail.push(DeviceState::Aborted);
                                trail.push(DeviceState::NotSaved);
                                DeviceOutcome::Aborted {
                                    artifact,
                                    marker: found.marker,
                                    line: found.line,
                                }
                            }
                            ApplyOutcome::TransportFailed { artifact, error } => {
                                trail.push(DeviceState::Aborted);
                                trail.push(DeviceState::NotSaved);
                                DeviceOutcome::TransportFailed { artifact, error }
                            }
                        };

                        session.close();
                        trail.push(DeviceState::Disconnected);
                        tracing::info!("Disconnected from device '{}' at IP '{}'", hostname, host);
                        outcome
                    }
                }
            }
        };
        trail.push(DeviceState::Terminal);

        let elapsed = clock.elapsed();
        tracing::info!(
            "Time taken to configure device '{}': {}",
            hostname,
            format_duration(elapsed)
        );

        DeviceReport {
            hostname: hostname.to_string(),
            host: host.to_string(),
            started_at,
            finished_at: Utc::now(),
            elapsed,
            artifacts_sent: sent,
            outcome,
            trail,
        }
    }

    /// Send artifacts in order, stopping at the first rejected one
    fn apply_artifacts<S: DeviceSession>(
        &self,
        session: &mut S,
        hostname: &str,
        texts: &[(String, String)],
        trail: &mut Vec<DeviceState>,
        sent: &mut usize,
    ) -> ApplyOutcome {
        for (index, (name, text)) in texts.iter().enumerate() {
            trail.push(DeviceState::ApplyingArtifact(index));
            tracing::info!("Applying configuration from '{}' to device '{}'", name, hostname);

            *sent += 1;
            let output = match session.send_config(text) {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!("Sending '{}' to device '{}' failed: {}", name, hostname, e);
                    return ApplyOutcome::TransportFailed {
                        artifact: name.clone(),
                        error: e.to_string(),
                    };
                }
            };
            tracing::debug!("Output from '{}':\n{}", name, truncate_lines(&output, 40));

            if let Some(found) = self.checker.find_error(&output) {
                tracing::error!(
                    "Errors found in configuration '{}' for device '{}': {}. Aborting remaining configurations",
                    name,
                    hostname,
                    found.line
                );
                return ApplyOutcome::Aborted {
                    artifact: name.clone(),
                    found,
                };
            }
            tracing::info!("Configuration from '{}' applied successfully to device '{}'", name, hostname);
        }

        ApplyOutcome::AllApplied
    }

    fn save<S: DeviceSession>(
        &self,
        session: &mut S,
        hostname: &str,
        host: &str,
        trail: &mut Vec<DeviceState>,
    ) -> DeviceOutcome {
        let result = session.save_configuration().and_then(|output| {
            match self.checker.find_error(&output) {
                Some(found) => Err(crate::error::PushError::save(host, found.line)),
                None => Ok(()),
            }
        });

        match result {
            Ok(()) => {
                trail.push(DeviceState::Saved);
                tracing::info!("Configuration saved on device '{}' at IP '{}'", hostname, host);
                DeviceOutcome::Saved
            }
            Err(e) => {
                trail.push(DeviceState::NotSaved);
                tracing::error!("Saving configuration on device '{}' failed: {}", hostname, e);
                DeviceOutcome::SaveFailed { error: e.to_string() }
            }
        }
    }
}

/// Load every artifact text up front so a missing file never leaves a device half-configured
fn read_artifacts(
    artifacts: &[ConfigArtifact],
    store: &ArtifactStore,
) -> Result<Vec<(String, String)>, (String, String)> {
    artifacts
        .iter()
        .map(|a| {
            store
                .read(a)
                .map(|text| (a.name.clone(), text))
                .map_err(|e| (a.name.clone(), e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PushError;
    use crate::models::Connection;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connect(String),
        Send(String, String),
        Save(String),
        Disconnect(String),
    }

    /// Per-host fault script; send indexes are 1-based
    #[derive(Debug, Clone, Default)]
    struct Script {
        refuse_connect: bool,
        reject_on_send: Option<usize>,
        drop_on_send: Option<usize>,
        save_error: bool,
        save_output: Option<String>,
        delay: Duration,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        scripts: HashMap<String, Script>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeConnector {
        fn script(mut self, host: &str, script: Script) -> Self {
            self.scripts.insert(host.to_string(), script);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, host: &str, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls()
                .iter()
                .filter(|c| pred(*c) && call_host(c) == host)
                .count()
        }

        fn sends(&self, host: &str) -> usize {
            self.count(host, |c| matches!(c, Call::Send(..)))
        }

        fn saves(&self, host: &str) -> usize {
            self.count(host, |c| matches!(c, Call::Save(..)))
        }

        fn disconnects(&self, host: &str) -> usize {
            self.count(host, |c| matches!(c, Call::Disconnect(..)))
        }
    }

    fn call_host(call: &Call) -> &str {
        match call {
            Call::Connect(h) | Call::Send(h, _) | Call::Save(h) | Call::Disconnect(h) => h,
        }
    }

    struct FakeSession {
        host: String,
        script: Script,
        sent: usize,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Connector for FakeConnector {
        type Session = FakeSession;

        fn connect(&self, connection: &Connection) -> Result<FakeSession, PushError> {
            let script = self.scripts.get(&connection.host).cloned().unwrap_or_default();
            std::thread::sleep(script.delay);
            self.calls.lock().unwrap().push(Call::Connect(connection.host.clone()));
            if script.refuse_connect {
                return Err(PushError::connect(&connection.host, "connection refused"));
            }
            Ok(FakeSession {
                host: connection.host.clone(),
                script,
                sent: 0,
                calls: self.calls.clone(),
            })
        }
    }

    impl DeviceSession for FakeSession {
        fn send_config(&mut self, text: &str) -> Result<String, PushError> {
            self.sent += 1;
            self.calls.lock().unwrap().push(Call::Send(self.host.clone(), text.to_string()));
            if self.script.drop_on_send == Some(self.sent) {
                return Err(PushError::transport(&self.host, "channel closed"));
            }
            if self.script.reject_on_send == Some(self.sent) {
                return Ok(format!("{}\n% Invalid input detected at '^' marker.\nr(config)#", text));
            }
            Ok(format!("{}\nr(config)#end\nr#", text))
        }

        fn save_configuration(&mut self) -> Result<String, PushError> {
            self.calls.lock().unwrap().push(Call::Save(self.host.clone()));
            if self.script.save_error {
                return Err(PushError::save(&self.host, "flash full"));
            }
            Ok(self
                .script
                .save_output
                .clone()
                .unwrap_or_else(|| "Building configuration...\n[OK]\nr#".to_string()))
        }

        fn disconnect(&mut self) {
            self.calls.lock().unwrap().push(Call::Disconnect(self.host.clone()));
        }
    }

    /// Devices as (hostname, host, config files); every artifact text is "<hostname> <file>"
    fn fixture(devices: &[(&str, &str, &[&str])]) -> (InfraModel, ArtifactStore, tempfile::TempDir) {
        let mut yaml = String::from("modelo:\n  infra_spec:\n    devices:\n");
        for (hostname, host, files) in devices {
            yaml.push_str(&format!(
                "      - hostname: {}\n        connection: {{ host: {} }}\n        data: x\n",
                hostname, host
            ));
            if files.is_empty() {
                yaml.push_str("        config_spec: []\n");
                continue;
            }
            yaml.push_str("        config_spec:\n");
            for file in *files {
                yaml.push_str(&format!(
                    "          - {{ template: t.j2, data_path: data, config_file: {} }}\n",
                    file
                ));
            }
        }
        let model = InfraModel::from_yaml(&yaml).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "cfg").unwrap();
        for (hostname, _, files) in devices {
            for file in *files {
                store.write(hostname, file, &format!("{} {}", hostname, file)).unwrap();
            }
        }
        (model, store, dir)
    }

    fn orchestrator(connector: &FakeConnector, policy: ConnectFailurePolicy) -> FleetOrchestrator<FakeConnector> {
        FleetOrchestrator::new(connector.clone(), OutputChecker::default(), policy)
    }

    #[test]
    fn test_clean_device_is_saved_once() {
        let (model, store, _dir) = fixture(&[("r1", "10.0.0.1", &["a.cfg", "b.cfg", "c.cfg"])]);
        let connector = FakeConnector::default();

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);
        let r1 = metrics.device("r1").unwrap();

        assert_eq!(r1.outcome, DeviceOutcome::Saved);
        assert_eq!(r1.artifacts_sent, 3);
        assert_eq!(connector.sends("10.0.0.1"), 3);
        assert_eq!(connector.saves("10.0.0.1"), 1);
        assert_eq!(connector.disconnects("10.0.0.1"), 1);
        assert_eq!(
            r1.trail,
            vec![
                DeviceState::Idle,
                DeviceState::Connecting,
                DeviceState::Connected,
                DeviceState::ApplyingArtifact(0),
                DeviceState::ApplyingArtifact(1),
                DeviceState::ApplyingArtifact(2),
                DeviceState::AllApplied,
                DeviceState::Saved,
                DeviceState::Disconnected,
                DeviceState::Terminal,
            ]
        );
        assert!(metrics.all_saved());
    }

    #[test]
    fn test_first_rejected_artifact_stops_device() {
        let (model, store, _dir) = fixture(&[("r1", "10.0.0.1", &["a.cfg", "b.cfg", "c.cfg", "d.cfg"])]);
        let connector = FakeConnector::default().script(
            "10.0.0.1",
            Script { reject_on_send: Some(2), ..Default::default() },
        );

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);
        let r1 = metrics.device("r1").unwrap();

        assert_eq!(connector.sends("10.0.0.1"), 2);
        assert_eq!(connector.saves("10.0.0.1"), 0);
        assert_eq!(connector.disconnects("10.0.0.1"), 1);
        assert_eq!(r1.artifacts_sent, 2);
        match &r1.outcome {
            DeviceOutcome::Aborted { artifact, line, .. } => {
                assert_eq!(artifact, "r1_b.cfg");
                assert!(line.starts_with("% Invalid input"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(r1.trail.ends_with(&[
            DeviceState::ApplyingArtifact(1),
            DeviceState::Aborted,
            DeviceState::NotSaved,
            DeviceState::Disconnected,
            DeviceState::Terminal,
        ]));
    }

    #[test]
    fn test_transport_failure_still_disconnects() {
        let (model, store, _dir) = fixture(&[
            ("r1", "10.0.0.1", &["a.cfg", "b.cfg"]),
            ("r2", "10.0.0.2", &["a.cfg"]),
        ]);
        let connector = FakeConnector::default().script(
            "10.0.0.1",
            Script { drop_on_send: Some(1), ..Default::default() },
        );

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        assert!(matches!(
            metrics.device("r1").unwrap().outcome,
            DeviceOutcome::TransportFailed { .. }
        ));
        assert_eq!(connector.sends("10.0.0.1"), 1);
        assert_eq!(connector.saves("10.0.0.1"), 0);
        assert_eq!(connector.disconnects("10.0.0.1"), 1);
        assert_eq!(
            metrics.device("r1").unwrap().trail,
            vec![
                DeviceState::Idle,
                DeviceState::Connecting,
                DeviceState::Connected,
                DeviceState::ApplyingArtifact(0),
                DeviceState::Aborted,
                DeviceState::NotSaved,
                DeviceState::Disconnected,
                DeviceState::Terminal,
            ]
        );
        assert_eq!(metrics.device("r2").unwrap().outcome, DeviceOutcome::Saved);
    }

    #[test]
    fn test_marker_text_in_clean_config_is_saved() {
        let (model, store, dir) = fixture(&[("r1", "10.0.0.1", &["a.cfg"])]);
        std::fs::write(
            dir.path().join("r1_a.cfg"),
            "interface Gi0/1\n description 100% error-free uplink\n",
        )
        .unwrap();
        let connector = FakeConnector::default();

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        assert_eq!(metrics.device("r1").unwrap().outcome, DeviceOutcome::Saved);
        assert_eq!(connector.saves("10.0.0.1"), 1);
    }

    #[test]
    fn test_connect_failure_skips_device() {
        let (model, store, _dir) = fixture(&[
            ("r1", "10.0.0.1", &["a.cfg"]),
            ("r2", "10.0.0.2", &["a.cfg"]),
        ]);
        let connector = FakeConnector::default().script(
            "10.0.0.1",
            Script { refuse_connect: true, ..Default::default() },
        );

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);
        let r1 = metrics.device("r1").unwrap();

        assert!(matches!(r1.outcome, DeviceOutcome::ConnectFailed { .. }));
        assert_eq!(r1.trail, vec![DeviceState::Idle, DeviceState::Connecting, DeviceState::Terminal]);
        assert_eq!(connector.sends("10.0.0.1"), 0);
        assert_eq!(connector.disconnects("10.0.0.1"), 0);
        assert_eq!(metrics.device("r2").unwrap().outcome, DeviceOutcome::Saved);
        assert!(metrics.halted_at.is_none());
        assert!(!metrics.all_saved());
    }

    #[test]
    fn test_connect_failure_abort_policy_halts() {
        let (model, store, _dir) = fixture(&[
            ("r1", "10.0.0.1", &["a.cfg"]),
            ("r2", "10.0.0.2", &["a.cfg"]),
        ]);
        let connector = FakeConnector::default().script(
            "10.0.0.1",
            Script { refuse_connect: true, ..Default::default() },
        );

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Abort).run_fleet(&model, &store);

        assert_eq!(metrics.halted_at.as_deref(), Some("r1"));
        assert_eq!(metrics.devices.len(), 1);
        assert!(!connector.calls().contains(&Call::Connect("10.0.0.2".to_string())));
    }

    #[test]
    fn test_save_failures_are_per_device() {
        let (model, store, _dir) = fixture(&[
            ("r1", "10.0.0.1", &["a.cfg"]),
            ("r2", "10.0.0.2", &["a.cfg"]),
            ("r3", "10.0.0.3", &["a.cfg"]),
        ]);
        let connector = FakeConnector::default()
            .script("10.0.0.1", Script { save_error: true, ..Default::default() })
            .script(
                "10.0.0.2",
                Script {
                    save_output: Some("% Error opening nvram:startup-config\nr2#".to_string()),
                    ..Default::default()
                },
            );

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        for host in ["10.0.0.1", "10.0.0.2"] {
            assert_eq!(connector.saves(host), 1);
            assert_eq!(connector.disconnects(host), 1);
        }
        assert!(matches!(metrics.device("r1").unwrap().outcome, DeviceOutcome::SaveFailed { .. }));
        match &metrics.device("r2").unwrap().outcome {
            DeviceOutcome::SaveFailed { error } => assert!(error.contains("nvram")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(metrics.device("r3").unwrap().outcome, DeviceOutcome::Saved);
        assert_eq!(metrics.saved_count(), 1);
    }

    #[test]
    fn test_hostname_prefix_does_not_leak() {
        let (model, store, _dir) = fixture(&[
            ("r1", "10.0.0.1", &["base.cfg"]),
            ("r10", "10.0.0.10", &["base.cfg", "extra.cfg"]),
        ]);
        let connector = FakeConnector::default();

        orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        let r1_texts: Vec<String> = connector
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(h, text) if h == "10.0.0.1" => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(r1_texts, vec!["r1 base.cfg".to_string()]);
        assert_eq!(connector.sends("10.0.0.10"), 2);
    }

    #[test]
    fn test_device_without_artifacts_still_saves() {
        let (model, store, _dir) = fixture(&[("r1", "10.0.0.1", &[])]);
        let connector = FakeConnector::default();

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        assert_eq!(metrics.device("r1").unwrap().outcome, DeviceOutcome::Saved);
        assert_eq!(connector.sends("10.0.0.1"), 0);
        assert_eq!(connector.saves("10.0.0.1"), 1);
    }

    #[test]
    fn test_unreadable_artifact_skips_connect() {
        let (model, store, dir) = fixture(&[("r1", "10.0.0.1", &["a.cfg"])]);
        std::fs::remove_file(dir.path().join("r1_a.cfg")).unwrap();
        let connector = FakeConnector::default();

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        assert!(matches!(
            metrics.device("r1").unwrap().outcome,
            DeviceOutcome::ArtifactFailed { .. }
        ));
        assert!(connector.calls().is_empty());
    }

    #[test]
    fn test_total_time_covers_devices() {
        let (model, store, _dir) = fixture(&[
            ("r1", "10.0.0.1", &["a.cfg"]),
            ("r2", "10.0.0.2", &["a.cfg"]),
            ("r3", "10.0.0.3", &["a.cfg"]),
        ]);
        let slow = Script { delay: Duration::from_millis(20), ..Default::default() };
        let connector = FakeConnector::default()
            .script("10.0.0.1", slow.clone())
            .script("10.0.0.2", Script { delay: Duration::from_millis(40), ..Default::default() })
            .script("10.0.0.3", slow);

        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        let max = metrics.devices.iter().map(|d| d.elapsed).max().unwrap();
        assert!(max >= Duration::from_millis(40));
        assert!(metrics.total_elapsed >= max);
        assert!(metrics.total_elapsed >= metrics.sum_device_elapsed());
        assert!(metrics.devices.iter().all(|d| d.finished_at >= d.started_at));
    }

    #[test]
    fn test_render_then_push_two_devices() {
        use crate::render::{render_all, Renderer};

        let model = InfraModel::from_yaml(
            r#"
modelo:
  infra_spec:
    devices:
      - hostname: leaf-a
        connection: { host: 10.1.0.1, device_type: arista_eos }
        config_spec:
          - { template: vlans.j2, data_path: vlans, config_file: vlans.cfg }
          - { template: ntp.j2, data_path: ntp, config_file: ntp.cfg }
        vlans: [10, 20]
        ntp: 10.1.255.1
      - hostname: leaf-b
        connection: { host: 10.1.0.2, device_type: arista_eos }
        config_spec:
          - { template: vlans.j2, data_path: vlans, config_file: vlans.cfg }
          - { template: ntp.j2, data_path: ntp, config_file: ntp.cfg }
        vlans: [30]
        ntp: 10.1.255.1
"#,
        )
        .unwrap();
        let renderer = Renderer::from_raw(&[
            ("vlans.j2", "{% for v in vlans %}vlan {{ v }}\n{% endfor %}"),
            ("ntp.j2", "ntp server {{ ntp }}\n"),
        ])
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path(), "cfg").unwrap();
        render_all(&model, &renderer, &mut store).unwrap();

        let connector = FakeConnector::default().script(
            "10.1.0.2",
            Script { reject_on_send: Some(1), ..Default::default() },
        );
        let metrics = orchestrator(&connector, ConnectFailurePolicy::Skip).run_fleet(&model, &store);

        assert_eq!(metrics.devices.len(), 2);
        assert_eq!(metrics.device("leaf-a").unwrap().outcome, DeviceOutcome::Saved);
        assert!(matches!(
            metrics.device("leaf-b").unwrap().outcome,
            DeviceOutcome::Aborted { .. }
        ));
        assert_eq!(connector.sends("10.1.0.1"), 2);
        assert_eq!(connector.sends("10.1.0.2"), 1);
        assert_eq!(connector.saves("10.1.0.2"), 0);
        assert!(connector
            .calls()
            .contains(&Call::Send("10.1.0.1".to_string(), "vlan 10\nvlan 20\n".to_string())));
    }
}
