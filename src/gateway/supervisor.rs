//! Gateway process supervision.
//!
//! [`GatewaySupervisor`] owns at most one gateway child process. Starting it
//! walks the full chain: consent, binary discovery, auto-provisioning when
//! the binary is missing, environment assembly from configuration, spawn,
//! and a grace interval before the process counts as running. Child stdout
//! and stderr are forwarded line-by-line over a channel while it runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::consent::{ConsentGate, ConsentKind};
use crate::error::{GatewayError, Result};
use crate::gateway::health::{HealthProbe, HealthStatus};
use crate::gateway::install::{self, ArchiveInstaller, InstalledBinary, ProgressCallback};
use crate::gateway::release::ReleaseResolver;
use crate::paths;

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No process owned.
    Stopped,
    /// Spawned, inside the startup grace interval.
    Starting,
    /// Spawned and alive past the grace interval.
    Running,
    /// The process exited on its own with this code.
    Crashed(i32),
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Crashed(code) => write!(f, "crashed (exit code {code})"),
        }
    }
}

/// How a [`GatewaySupervisor::start`] call concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new gateway process was spawned and survived the grace interval.
    Started,
    /// A live process was already owned; nothing was spawned.
    AlreadyRunning,
    /// The user did not authorize the start (or the download it required).
    Declined,
}

/// How a [`GatewaySupervisor::provision`] call concluded.
#[derive(Debug)]
pub enum ProvisionOutcome {
    /// A release was downloaded and unpacked.
    Installed(InstalledBinary),
    /// A managed binary was already present; nothing was downloaded.
    AlreadyInstalled(PathBuf),
    /// The user did not authorize the download.
    Declined,
}

/// Which output stream a forwarded line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of gateway output.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Stream the line arrived on.
    pub stream: LogStream,
    /// Line content without the trailing newline.
    pub line: String,
}

/// Snapshot returned by [`GatewaySupervisor::status`]; recomputed per query.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    /// Whether the gateway is considered up (health probe first, then the
    /// owned handle's liveness).
    pub running: bool,
    /// Result of the health probe that informed `running`.
    pub health: HealthStatus,
    /// Process id of the owned child, if any.
    pub pid: Option<u32>,
    /// Time since the owned child was spawned, if any.
    pub uptime: Option<Duration>,
    /// Configured listen port.
    pub port: u16,
    /// Configured work mode.
    pub work_mode: String,
    /// Whether the PII firewall is configured on.
    pub pii_enabled: bool,
    /// Configured PII firewall mode.
    pub pii_mode: String,
    /// Names of providers with configured API keys.
    pub providers: Vec<String>,
}

/// Owned child process plus identity captured at spawn time.
struct GatewayHandle {
    child: Child,
    pid: u32,
    spawned_at: Instant,
}

/// Owns and supervises the gateway child process.
pub struct GatewaySupervisor {
    config: Config,
    gate: ConsentGate,
    client: reqwest::Client,
    handle: Option<GatewayHandle>,
    state: SupervisorState,
    log_rx: Option<mpsc::UnboundedReceiver<LogLine>>,
}

impl GatewaySupervisor {
    /// Create a supervisor over `config`, gating privileged actions
    /// through `gate`. No process is spawned until [`start`](Self::start).
    pub fn new(config: Config, gate: ConsentGate) -> Self {
        let client = reqwest::Client::builder().build().unwrap_or_default();
        Self {
            config,
            gate,
            client,
            handle: None,
            state: SupervisorState::Stopped,
            log_rx: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The configuration this supervisor runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the gateway process.
    ///
    /// No-op success when a live process is already owned. Asks consent
    /// for the start (and for the download, when the binary has to be
    /// provisioned first); a refusal is the [`StartOutcome::Declined`]
    /// outcome, not an error. After spawning, waits the configured grace
    /// interval and fails with `ProcessCrashed` if the process already
    /// exited.
    ///
    /// # Errors
    ///
    /// Provisioning errors pass through; `BinaryStillMissing` when no
    /// executable can be found and none can be installed; `SpawnFailed` or
    /// `ProcessCrashed` for launch failures.
    pub async fn start(&mut self) -> Result<StartOutcome> {
        if self.child_alive() {
            debug!("gateway already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if !self.gate.authorize(ConsentKind::Start) {
            info!("gateway start not authorized");
            return Ok(StartOutcome::Declined);
        }

        let Some(binary) = self.ensure_binary().await? else {
            info!("gateway download not authorized");
            return Ok(StartOutcome::Declined);
        };

        self.state = SupervisorState::Starting;
        if let Err(e) = self.spawn_child(&binary) {
            self.state = SupervisorState::Stopped;
            return Err(e);
        }

        tokio::time::sleep(self.config.gateway.start_grace()).await;
        if let Some(code) = self.sample_exit() {
            self.state = SupervisorState::Crashed(code);
            warn!(code, "gateway exited during the startup grace interval");
            return Err(GatewayError::ProcessCrashed(code));
        }

        self.state = SupervisorState::Running;
        info!(port = self.config.gateway.port, "gateway running");
        Ok(StartOutcome::Started)
    }

    /// Stop the owned gateway process. Idempotent; kill failures of an
    /// already-dead process are ignored.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            info!(pid = handle.pid, "stopping gateway process");
            let _ = handle.child.kill();
            let _ = handle.child.wait();
        }
        self.log_rx = None;
        self.state = SupervisorState::Stopped;
    }

    /// Report liveness and configuration-derived details.
    ///
    /// The health probe decides first: a healthy answer means running even
    /// when the process is externally managed, a degraded answer means not
    /// running, and only an unreachable endpoint falls back to the owned
    /// handle's liveness.
    pub async fn status(&mut self) -> GatewayStatus {
        let base_url = self.config.gateway.effective_base_url();
        let probe = HealthProbe::new(
            self.client.clone(),
            &base_url,
            self.config.gateway.health_timeout(),
        );
        let health = probe.check().await;
        let running = match &health {
            HealthStatus::Healthy(_) => true,
            HealthStatus::Degraded(_) => false,
            HealthStatus::Unreachable(_) => self.child_alive(),
        };
        GatewayStatus {
            running,
            health,
            pid: self.handle.as_ref().map(|h| h.pid),
            uptime: self.handle.as_ref().map(|h| h.spawned_at.elapsed()),
            port: self.config.gateway.port,
            work_mode: self.config.gateway.work_mode.clone(),
            pii_enabled: self.config.gateway.pii_firewall.enabled,
            pii_mode: self.config.gateway.pii_firewall.mode.clone(),
            providers: self.config.configured_providers(),
        }
    }

    /// Download and install the configured gateway release.
    ///
    /// With `force` false, an already-present managed binary short-circuits
    /// without consent or network traffic. The download itself is consent
    /// gated; refusal is the [`ProvisionOutcome::Declined`] outcome.
    ///
    /// # Errors
    ///
    /// Resolution and install errors pass through unchanged.
    pub async fn provision(
        &mut self,
        force: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<ProvisionOutcome> {
        let install_dir = self.install_dir();
        if !force && let Some(existing) = install::find_gateway_binary(&install_dir) {
            debug!(path = %existing.display(), "gateway binary already installed");
            return Ok(ProvisionOutcome::AlreadyInstalled(existing));
        }

        if !self.gate.authorize(ConsentKind::Download) {
            info!("gateway download not authorized");
            return Ok(ProvisionOutcome::Declined);
        }

        let version = self.config.gateway.version.clone();
        let resolver = ReleaseResolver::new(self.client.clone(), &self.config.gateway.release_feed);
        let asset = resolver.resolve(&version).await?;
        info!(version = %version, asset = %asset.name, "installing gateway release");

        let download_client = reqwest::Client::builder()
            .timeout(self.config.gateway.download_timeout())
            .build()
            .unwrap_or_default();
        let installer = ArchiveInstaller::new(download_client, &install_dir);
        let installed = installer.install(&asset, progress).await?;
        Ok(ProvisionOutcome::Installed(installed))
    }

    /// Receive the next forwarded log line, waiting until one arrives.
    ///
    /// Returns `None` when no process has been started or both output
    /// streams have closed.
    pub async fn recv_log(&mut self) -> Option<LogLine> {
        self.log_rx.as_mut()?.recv().await
    }

    /// Try to receive a forwarded log line without waiting.
    pub fn try_recv_log(&mut self) -> Option<LogLine> {
        self.log_rx.as_mut()?.try_recv().ok()
    }

    /// Directory the managed binary is installed into.
    fn install_dir(&self) -> PathBuf {
        self.config
            .gateway
            .install_dir
            .clone()
            .unwrap_or_else(paths::bin_dir)
    }

    /// Find an executable gateway binary: explicit config override first,
    /// then the managed install directory, then PATH.
    fn locate_binary(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.gateway.binary_path {
            if is_executable(path) {
                return Some(path.clone());
            }
            warn!(path = %path.display(), "configured binary_path is not an executable file");
        }
        if let Some(path) = install::find_gateway_binary(&self.install_dir())
            && is_executable(&path)
        {
            return Some(path);
        }
        which::which(paths::GATEWAY_BINARY_PREFIX).ok()
    }

    /// Resolve the binary to spawn, provisioning it when allowed.
    ///
    /// `Ok(None)` means the user declined the provisioning download.
    async fn ensure_binary(&mut self) -> Result<Option<PathBuf>> {
        if let Some(path) = self.locate_binary() {
            return Ok(Some(path));
        }
        if !self.config.gateway.auto_install {
            return Err(GatewayError::BinaryStillMissing(
                "gateway binary not found and auto_install is disabled".to_owned(),
            ));
        }
        match self.provision(false, None).await? {
            ProvisionOutcome::Declined => Ok(None),
            ProvisionOutcome::Installed(_) | ProvisionOutcome::AlreadyInstalled(_) => {
                match self.locate_binary() {
                    Some(path) => Ok(Some(path)),
                    None => Err(GatewayError::BinaryStillMissing(format!(
                        "gateway binary still not executable under {}",
                        self.install_dir().display()
                    ))),
                }
            }
        }
    }

    fn spawn_child(&mut self, binary: &Path) -> Result<()> {
        let cwd = binary.parent().unwrap_or_else(|| Path::new("."));
        let mut child = Command::new(binary)
            .current_dir(cwd)
            .envs(gateway_environment(&self.config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GatewayError::SpawnFailed(format!("{}: {e}", binary.display())))?;

        let pid = child.id();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || forward_lines(stdout, LogStream::Stdout, tx));
        }
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || forward_lines(stderr, LogStream::Stderr, tx));
        }

        self.handle = Some(GatewayHandle {
            child,
            pid,
            spawned_at: Instant::now(),
        });
        self.log_rx = Some(rx);
        info!(pid, path = %binary.display(), "gateway process spawned");
        Ok(())
    }

    /// Poll the owned child for an exit, clearing the handle if it died.
    fn sample_exit(&mut self) -> Option<i32> {
        let handle = self.handle.as_mut()?;
        match handle.child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                self.handle = None;
                Some(code)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not poll gateway process");
                None
            }
        }
    }

    /// Whether the owned child is still alive, updating state when it is
    /// found to have exited on its own.
    fn child_alive(&mut self) -> bool {
        if self.handle.is_none() {
            return false;
        }
        match self.sample_exit() {
            Some(code) => {
                warn!(code, "gateway process exited");
                self.state = SupervisorState::Crashed(code);
                false
            }
            None => true,
        }
    }
}

impl Drop for GatewaySupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map configuration fields to the gateway's environment variables.
///
/// Every populated field becomes one variable; empty strings, unset
/// options, and providers without keys are omitted so the binary's own
/// defaults apply.
pub fn gateway_environment(config: &Config) -> Vec<(String, String)> {
    let gw = &config.gateway;
    let mut env = Vec::new();

    for (name, provider) in &config.providers {
        if provider.api_key.is_empty() {
            continue;
        }
        env.push((
            format!("{}_API_KEY", name.to_uppercase()),
            provider.api_key.clone(),
        ));
    }

    if !gw.work_mode.is_empty() {
        env.push(("TOKLIGENCE_WORK_MODE".to_owned(), gw.work_mode.clone()));
    }
    env.push(("TOKLIGENCE_PORT".to_owned(), gw.port.to_string()));
    if let Some(admin_port) = gw.admin_port {
        env.push(("TOKLIGENCE_ADMIN_PORT".to_owned(), admin_port.to_string()));
    }
    env.push((
        "TOKLIGENCE_PII_FIREWALL_ENABLED".to_owned(),
        gw.pii_firewall.enabled.to_string(),
    ));
    if !gw.pii_firewall.mode.is_empty() {
        env.push((
            "TOKLIGENCE_PII_FIREWALL_MODE".to_owned(),
            gw.pii_firewall.mode.clone(),
        ));
    }
    if !gw.model_routes.is_empty() {
        env.push(("TOKLIGENCE_MODEL_ROUTES".to_owned(), gw.model_routes.clone()));
    }
    if !gw.log_level.is_empty() {
        env.push(("TOKLIGENCE_LOG_LEVEL".to_owned(), gw.log_level.clone()));
    }

    env
}

/// Read lines from a child stream and forward them over the channel.
fn forward_lines<R: std::io::Read>(
    reader: R,
    stream: LogStream,
    tx: mpsc::UnboundedSender<LogLine>,
) {
    use std::io::BufRead;
    let reader = std::io::BufReader::new(reader);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if tx.send(LogLine { stream, line }).is_err() {
            break;
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::ProviderConfig;
    use crate::consent::{ConsentDecision, ConsentPrompt};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Prompt that answers every request with a fixed decision.
    struct FixedPrompt(ConsentDecision);

    impl ConsentPrompt for FixedPrompt {
        fn request(&self, _kind: ConsentKind) -> ConsentDecision {
            self.0
        }
    }

    /// Prompt that allows starts but refuses downloads.
    struct StartOnlyPrompt;

    impl ConsentPrompt for StartOnlyPrompt {
        fn request(&self, kind: ConsentKind) -> ConsentDecision {
            match kind {
                ConsentKind::Start => ConsentDecision::AllowOnce,
                ConsentKind::Download => ConsentDecision::Cancel,
            }
        }
    }

    fn gate_with(dir: &Path, prompt: impl ConsentPrompt + 'static) -> ConsentGate {
        ConsentGate::load(dir.join("consent.toml"), Box::new(prompt)).unwrap()
    }

    fn env_value<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn environment_maps_provider_keys_uppercased() {
        let mut config = Config::default();
        config.providers.insert(
            "openai".to_owned(),
            ProviderConfig {
                api_key: "sk-test".to_owned(),
            },
        );
        config.providers.insert(
            "anthropic".to_owned(),
            ProviderConfig {
                api_key: String::new(),
            },
        );

        let env = gateway_environment(&config);
        assert_eq!(env_value(&env, "OPENAI_API_KEY"), Some("sk-test"));
        assert_eq!(env_value(&env, "ANTHROPIC_API_KEY"), None);
    }

    #[test]
    fn environment_includes_gateway_settings() {
        let mut config = Config::default();
        config.gateway.port = 9090;
        config.gateway.admin_port = Some(9091);
        config.gateway.work_mode = "proxy".to_owned();
        config.gateway.model_routes = "gpt-*=openai".to_owned();
        config.gateway.log_level = "debug".to_owned();
        config.gateway.pii_firewall.enabled = true;
        config.gateway.pii_firewall.mode = "mask".to_owned();

        let env = gateway_environment(&config);
        assert_eq!(env_value(&env, "TOKLIGENCE_PORT"), Some("9090"));
        assert_eq!(env_value(&env, "TOKLIGENCE_ADMIN_PORT"), Some("9091"));
        assert_eq!(env_value(&env, "TOKLIGENCE_WORK_MODE"), Some("proxy"));
        assert_eq!(env_value(&env, "TOKLIGENCE_MODEL_ROUTES"), Some("gpt-*=openai"));
        assert_eq!(env_value(&env, "TOKLIGENCE_LOG_LEVEL"), Some("debug"));
        assert_eq!(env_value(&env, "TOKLIGENCE_PII_FIREWALL_ENABLED"), Some("true"));
        assert_eq!(env_value(&env, "TOKLIGENCE_PII_FIREWALL_MODE"), Some("mask"));
    }

    #[test]
    fn environment_omits_unset_fields() {
        let mut config = Config::default();
        config.gateway.admin_port = None;
        config.gateway.model_routes = String::new();

        let env = gateway_environment(&config);
        assert_eq!(env_value(&env, "TOKLIGENCE_ADMIN_PORT"), None);
        assert_eq!(env_value(&env, "TOKLIGENCE_MODEL_ROUTES"), None);
        // The firewall flag always carries the concrete configured value.
        assert_eq!(env_value(&env, "TOKLIGENCE_PII_FIREWALL_ENABLED"), Some("false"));
    }

    #[test]
    fn new_supervisor_is_stopped_with_no_logs() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
        let mut supervisor = GatewaySupervisor::new(Config::default(), gate);
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(supervisor.try_recv_log().is_none());
    }

    #[test]
    fn state_and_outcome_display() {
        assert_eq!(SupervisorState::Stopped.to_string(), "stopped");
        assert_eq!(SupervisorState::Running.to_string(), "running");
        assert_eq!(
            SupervisorState::Crashed(7).to_string(),
            "crashed (exit code 7)"
        );
        assert_eq!(LogStream::Stderr.to_string(), "stderr");
    }

    #[tokio::test]
    async fn start_declined_when_consent_refused() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::Cancel));
        let mut supervisor = GatewaySupervisor::new(Config::default(), gate);

        let outcome = supervisor.start().await.unwrap();
        assert_eq!(outcome, StartOutcome::Declined);
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn start_declined_when_download_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.gateway.install_dir = Some(dir.path().join("bin"));
        config.gateway.binary_path = None;
        let gate = gate_with(dir.path(), StartOnlyPrompt);
        let mut supervisor = GatewaySupervisor::new(config, gate);

        let outcome = supervisor.start().await.unwrap();
        assert_eq!(outcome, StartOutcome::Declined);
    }

    #[tokio::test]
    async fn start_fails_when_missing_and_auto_install_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.gateway.install_dir = Some(dir.path().join("bin"));
        config.gateway.auto_install = false;
        let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
        let mut supervisor = GatewaySupervisor::new(config, gate);

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, GatewayError::BinaryStillMissing(_)));
    }

    #[tokio::test]
    async fn status_reports_degraded_endpoint_as_not_running() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.gateway.base_url = server.uri();
        let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
        let mut supervisor = GatewaySupervisor::new(config, gate);

        let status = supervisor.status().await;
        assert!(!status.running);
        assert!(
            matches!(status.health, HealthStatus::Degraded(503)),
            "expected Degraded(503), got: {:?}",
            status.health
        );
    }

    #[tokio::test]
    async fn status_trusts_a_healthy_endpoint_it_did_not_spawn() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ok"})),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.gateway.base_url = server.uri();
        let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
        let mut supervisor = GatewaySupervisor::new(config, gate);

        let status = supervisor.status().await;
        assert!(status.running, "healthy probe counts as running");
        assert!(status.pid.is_none());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("tokligence-gateway");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn config_for(binary: PathBuf) -> Config {
            let mut config = Config::default();
            config.gateway.binary_path = Some(binary);
            config.gateway.start_grace_ms = 50;
            config
        }

        #[tokio::test]
        async fn start_twice_owns_a_single_process() {
            let dir = tempfile::tempdir().unwrap();
            let binary = write_script(dir.path(), "sleep 30");
            let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
            let mut supervisor = GatewaySupervisor::new(config_for(binary), gate);

            assert_eq!(supervisor.start().await.unwrap(), StartOutcome::Started);
            assert_eq!(supervisor.state(), SupervisorState::Running);
            let first_pid = supervisor.handle.as_ref().map(|h| h.pid);

            assert_eq!(
                supervisor.start().await.unwrap(),
                StartOutcome::AlreadyRunning
            );
            assert_eq!(supervisor.handle.as_ref().map(|h| h.pid), first_pid);

            supervisor.stop();
            assert_eq!(supervisor.state(), SupervisorState::Stopped);
            // Idempotent
            supervisor.stop();
            assert_eq!(supervisor.state(), SupervisorState::Stopped);
        }

        #[tokio::test]
        async fn early_exit_is_a_crash() {
            let dir = tempfile::tempdir().unwrap();
            let binary = write_script(dir.path(), "exit 7");
            let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
            let mut supervisor = GatewaySupervisor::new(config_for(binary), gate);

            let err = supervisor.start().await.unwrap_err();
            assert!(matches!(err, GatewayError::ProcessCrashed(7)));
            assert_eq!(supervisor.state(), SupervisorState::Crashed(7));
        }

        #[tokio::test]
        async fn child_output_is_forwarded() {
            let dir = tempfile::tempdir().unwrap();
            let binary = write_script(dir.path(), "echo ready; sleep 30");
            let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
            let mut supervisor = GatewaySupervisor::new(config_for(binary), gate);

            assert_eq!(supervisor.start().await.unwrap(), StartOutcome::Started);
            let line = tokio::time::timeout(Duration::from_secs(5), supervisor.recv_log())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(line.stream, LogStream::Stdout);
            assert_eq!(line.line, "ready");
            supervisor.stop();
        }

        #[tokio::test]
        async fn environment_reaches_the_child() {
            let dir = tempfile::tempdir().unwrap();
            let binary = write_script(dir.path(), "echo \"port=$TOKLIGENCE_PORT\"; sleep 30");
            let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
            let mut config = config_for(binary);
            config.gateway.port = 18080;
            let mut supervisor = GatewaySupervisor::new(config, gate);

            assert_eq!(supervisor.start().await.unwrap(), StartOutcome::Started);
            let line = tokio::time::timeout(Duration::from_secs(5), supervisor.recv_log())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(line.line, "port=18080");
            supervisor.stop();
        }

        #[test]
        fn executable_check_requires_exec_bit() {
            let dir = tempfile::tempdir().unwrap();
            let plain = dir.path().join("plain");
            std::fs::write(&plain, b"data").unwrap();
            assert!(!is_executable(&plain));

            let script = write_script(dir.path(), "exit 0");
            assert!(is_executable(&script));
            assert!(!is_executable(&dir.path().join("missing")));
        }

        #[test]
        fn locate_prefers_configured_override() {
            let dir = tempfile::tempdir().unwrap();
            let binary = write_script(dir.path(), "exit 0");
            let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
            let mut config = Config::default();
            config.gateway.binary_path = Some(binary.clone());
            config.gateway.install_dir = Some(dir.path().join("bin"));
            let supervisor = GatewaySupervisor::new(config, gate);

            assert_eq!(supervisor.locate_binary(), Some(binary));
        }

        #[test]
        fn locate_falls_back_to_install_dir() {
            let dir = tempfile::tempdir().unwrap();
            let bin_dir = dir.path().join("bin");
            std::fs::create_dir_all(&bin_dir).unwrap();
            let binary = write_script(&bin_dir, "exit 0");
            let gate = gate_with(dir.path(), FixedPrompt(ConsentDecision::AllowOnce));
            let mut config = Config::default();
            config.gateway.install_dir = Some(bin_dir);
            let supervisor = GatewaySupervisor::new(config, gate);

            assert_eq!(supervisor.locate_binary(), Some(binary));
        }
    }
}
