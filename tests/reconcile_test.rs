use kv_sidecar::{
    ConfigApplier, ConfigDeriver, CycleOutcome, DeriverConfig, JsonFileBaselineStore, PodFileSource, ProcessSupervisor,
    ReconciliationState, Reconciler, ReconcilerConfig, RealClock, RestartOutcome, RestartPolicy, RetryPolicy,
    ScriptedProcessControl, TemplateFileApplier,
};
use serde_json::json;
use slog::Drain;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::time::Duration;

const OPTION_GROUP: &str = "cfg/ssdb-x1";

const TEMPLATE: &str = concat!(
    "work_dir = {{.project_prefix}}/var\n",
    "\n",
    "server:\n",
    "\tauth: {{.server_auth}}\n",
    "\n",
    "replication:\n",
    "\tbinlog: {{if .replication_enabled}}yes{{else}}no{{end}}\n",
    "\tsync_speed: -1\n",
    "{{- range .replicas}}\n",
    "\tslaveof:\n",
    "\t\tid: svc_{{.id}}\n",
    "\t\ttype: {{.role}}\n",
    "\t\thost: {{.host}}\n",
    "\t\tport: {{.port}}\n",
    "{{- end}}\n",
    "\n",
    "leveldb:\n",
    "\tcache_size: {{.leveldb_cache_size}}\n",
    "\twrite_buffer_size: {{.leveldb_write_buffer_size}}\n",
    "\tcompression: {{.leveldb_compression}}\n",
);

#[tokio::test]
async fn first_cycle_renders_restarts_and_persists() -> Result<(), Box<dyn Error>> {
    let env = TestEnv::new()?;
    let control = ScriptedProcessControl::new();
    env.publish(1, &pod(1 << 30, "50", &[]))?;
    let mut reconciler = env.reconciler(&control);

    let outcome = reconciler.run_cycle().await?;

    assert_eq!(
        outcome,
        CycleOutcome::Applied {
            restart: RestartOutcome::Restarted { pid: Some(4242) }
        }
    );
    let expected = format!(
        concat!(
            "work_dir = {}/var\n",
            "\n",
            "server:\n",
            "\tauth: s3cret\n",
            "\n",
            "replication:\n",
            "\tbinlog: no\n",
            "\tsync_speed: -1\n",
            "\n",
            "leveldb:\n",
            "\tcache_size: 56\n",
            "\twrite_buffer_size: 8\n",
            "\tcompression: no\n",
        ),
        env.prefix().display()
    );
    assert_eq!(fs::read_to_string(env.config_path())?, expected);
    assert_eq!(control.restarts(), vec![env.config_path()]);

    let baseline: serde_json::Value = serde_json::from_slice(&fs::read(env.baseline_path())?)?;
    assert_eq!(baseline["inited"], true);
    assert_eq!(baseline["root_auth"], "s3cret");
    assert_eq!(baseline["resource"]["cache_size"], 56 << 20);
    assert_eq!(baseline["resource"]["write_buffer_size"], 8 << 20);

    Ok(())
}

#[tokio::test]
async fn restarted_controller_resumes_from_disk() -> Result<(), Box<dyn Error>> {
    let env = TestEnv::new()?;
    let control = ScriptedProcessControl::new();
    env.publish(1, &pod(1 << 30, "50", &[(1, "10.0.0.1")]))?;
    env.reconciler(&control).run_cycle().await?;
    let rendered = fs::read_to_string(env.config_path())?;
    fs::write(env.config_path(), "sentinel")?;

    // A new controller process: empty memory, same disk, process still alive.
    let mut reconciler = env.reconciler(&control);
    let outcome = reconciler.run_cycle().await?;

    assert_eq!(outcome, CycleOutcome::Converged);
    assert!(rendered.contains("svc_1"));
    assert_eq!(fs::read_to_string(env.config_path())?, "sentinel");
    assert_eq!(control.restart_count(), 1);

    Ok(())
}

#[tokio::test]
async fn topology_changes_render_but_reordering_does_not() -> Result<(), Box<dyn Error>> {
    let env = TestEnv::new()?;
    let control = ScriptedProcessControl::new();
    let mut reconciler = env.reconciler(&control);

    env.publish(1, &pod(1 << 30, "50", &[]))?;
    reconciler.run_cycle().await?;

    // Replica 0 is us and must never show up as our own mirror.
    env.publish(2, &pod(1 << 30, "50", &[(0, "10.0.0.0"), (1, "10.0.0.1"), (2, "10.0.0.2")]))?;
    let outcome = reconciler.run_cycle().await?;

    assert_eq!(
        outcome,
        CycleOutcome::Applied {
            restart: RestartOutcome::AlreadyRunning { pid: 4242 }
        }
    );
    let rendered = fs::read_to_string(env.config_path())?;
    assert!(rendered.contains("\tbinlog: yes\n"));
    assert!(rendered.contains("\tslaveof:\n\t\tid: svc_1\n\t\ttype: mirror\n\t\thost: 10.0.0.1\n\t\tport: 8888"));
    assert!(rendered.contains("id: svc_2"));
    assert!(!rendered.contains("id: svc_0"));

    env.publish(3, &pod(1 << 30, "50", &[(2, "10.0.0.2"), (1, "10.0.0.1"), (0, "10.0.0.0")]))?;
    fs::write(env.config_path(), "sentinel")?;
    let outcome = reconciler.run_cycle().await?;

    assert_eq!(outcome, CycleOutcome::Converged);
    assert_eq!(fs::read_to_string(env.config_path())?, "sentinel");

    Ok(())
}

#[tokio::test]
async fn run_loop_converges_and_stops_on_shutdown() -> Result<(), Box<dyn Error>> {
    let env = TestEnv::new()?;
    let control = ScriptedProcessControl::new();
    env.publish(1, &pod(2 << 30, "50", &[]))?;
    let reconciler = env.reconciler(&control);
    let (shutdown_handle, shutdown_signal) = kv_sidecar::shutdown_signal();

    let task = tokio::spawn(reconciler.run(shutdown_signal));
    wait_until(Duration::from_secs(5), || env.config_path().exists()).await;

    // cache: floor(2048 MiB * 60%) / 10 = 122.88 MiB, aligned up to 128.
    env.publish(2, &pod(2 << 30, "60", &[]))?;
    wait_until(Duration::from_secs(5), || {
        fs::read_to_string(env.config_path())
            .map(|s| s.contains("cache_size: 128\n"))
            .unwrap_or(false)
    })
    .await;

    shutdown_handle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task).await??;
    assert_eq!(control.restart_count(), 1);

    Ok(())
}

// -- helpers --

struct TestEnv {
    dir: tempfile::TempDir,
}

impl TestEnv {
    fn new() -> Result<Self, Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("etc"))?;
        fs::write(dir.path().join("etc/ssdb.conf.default"), TEMPLATE)?;

        Ok(TestEnv { dir })
    }

    fn prefix(&self) -> &Path {
        self.dir.path()
    }

    fn pod_path(&self) -> PathBuf {
        self.prefix().join("pod_instance.json")
    }

    fn config_path(&self) -> PathBuf {
        self.prefix().join("etc/ssdb.conf")
    }

    fn baseline_path(&self) -> PathBuf {
        self.prefix().join("etc/init_option.json")
    }

    /// Writes the pod descriptor with an mtime derived from `version`, so each publish is
    /// strictly newer regardless of filesystem timestamp granularity. The file is swapped in
    /// with a rename, so a running loop never sees a half-written descriptor.
    fn publish(&self, version: u64, pod: &serde_json::Value) -> Result<(), Box<dyn Error>> {
        let staging = self.prefix().join(".pod_instance.json.tmp");
        fs::write(&staging, serde_json::to_vec(pod)?)?;
        let file = fs::OpenOptions::new().write(true).open(&staging)?;
        file.set_modified(UNIX_EPOCH + Duration::from_secs(1_700_000_000 + version))?;
        drop(file);
        fs::rename(&staging, self.pod_path())?;
        Ok(())
    }

    fn reconciler(&self, control: &ScriptedProcessControl) -> Reconciler {
        let logger = create_root_logger_for_stdout(0);

        let applier = TemplateFileApplier::new(
            logger.clone(),
            self.prefix().join("etc/ssdb.conf.default"),
            self.config_path(),
        );
        let supervisor = ProcessSupervisor::new(
            logger.clone(),
            Box::new(control.clone()),
            applier.output_path().to_path_buf(),
            RestartPolicy::SkipIfRunning,
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        );

        Reconciler::new(
            logger.clone(),
            ReconcilerConfig {
                source: Box::new(PodFileSource::new(self.pod_path(), OPTION_GROUP)),
                deriver: ConfigDeriver::new(DeriverConfig::default()),
                state: ReconciliationState::new(
                    logger.clone(),
                    Box::new(JsonFileBaselineStore::new(self.baseline_path())),
                ),
                applier: Box::new(applier),
                supervisor,
                project_prefix: self.prefix().to_string_lossy().into_owned(),
                poll_interval: Duration::from_millis(10),
                clock: RealClock,
            },
        )
    }
}

fn pod(mem_limit: u64, cache_size_pct: &str, replicas: &[(u32, &str)]) -> serde_json::Value {
    let replicas: Vec<_> = replicas
        .iter()
        .map(|(id, host)| json!({ "id": id, "host": host, "port": 8888 }))
        .collect();

    json!({
        "meta": { "id": "pod-1", "updated": 1 },
        "spec": { "box": { "resources": { "mem_limit": mem_limit } } },
        "apps": [
            {
                "operate": {
                    "options": [
                        {
                            "name": OPTION_GROUP,
                            "items": [
                                { "name": "server_auth", "value": "s3cret" },
                                { "name": "cache_size", "value": cache_size_pct }
                            ]
                        }
                    ],
                    "replicas": replicas
                }
            }
        ]
    })
}

async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "Timed out waiting for condition");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn create_root_logger_for_stdout(instance: u32) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("instance" => instance))
}
