use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::Command;

/// ProcessControl is the OS-facing surface of the managed store process.
#[async_trait::async_trait]
pub trait ProcessControl: Send + Sync {
    async fn binary_exists(&self) -> bool;

    /// One process-table probe. No retries here; those belong to the supervisor.
    async fn find_pid(&self) -> Option<u32>;

    /// Asks the binary to (re)start itself against `config_path`. Blocks until the binary's own
    /// restart sequence finishes.
    async fn restart(&self, config_path: &Path) -> io::Result<()>;
}

// -- CommandProcessControl --

/// CommandProcessControl shells out to `pgrep -f <binary>` and `<binary> -d <config> -s restart`.
pub struct CommandProcessControl {
    logger: slog::Logger,
    binary: PathBuf,
}

impl CommandProcessControl {
    pub fn new<P: Into<PathBuf>>(logger: slog::Logger, binary: P) -> Self {
        CommandProcessControl {
            logger,
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl ProcessControl for CommandProcessControl {
    async fn binary_exists(&self) -> bool {
        match tokio::fs::metadata(&self.binary).await {
            Ok(metadata) => metadata.is_file(),
            Err(_) => false,
        }
    }

    async fn find_pid(&self) -> Option<u32> {
        let output = match Command::new("pgrep").arg("-f").arg(&self.binary).output().await {
            Ok(output) => output,
            Err(e) => {
                slog::debug!(self.logger, "pgrep failed to run: {}", e);
                return None;
            }
        };

        // `-f` matches full command lines, and ours carries the binary path whenever it was
        // passed as a flag. Beyond skipping ourselves, the first line wins.
        parse_first_pid(&String::from_utf8_lossy(&output.stdout), std::process::id())
    }

    async fn restart(&self, config_path: &Path) -> io::Result<()> {
        let output = Command::new(&self.binary)
            .arg("-d")
            .arg(config_path)
            .arg("-s")
            .arg("restart")
            .output()
            .await?;

        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} exited with {}: {}",
                    self.binary.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim(),
                ),
            ));
        }

        Ok(())
    }
}

fn parse_first_pid(stdout: &str, own_pid: u32) -> Option<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .find(|pid| *pid > 0 && *pid != own_pid)
}

// -- ScriptedProcessControl --

/// ScriptedProcessControl is an in-memory stand-in for the managed process. Clones share state,
/// so a test keeps one handle to script and inspect while the supervisor owns the other.
#[derive(Clone)]
pub struct ScriptedProcessControl {
    inner: Arc<Mutex<ScriptedInner>>,
}

struct ScriptedInner {
    binary_present: bool,
    running_pid: Option<u32>,
    pid_after_restart: Option<u32>,
    hidden_probes: usize,
    fail_restarts: bool,
    probes: usize,
    restarts: Vec<PathBuf>,
}

impl Default for ScriptedProcessControl {
    fn default() -> Self {
        ScriptedProcessControl {
            inner: Arc::new(Mutex::new(ScriptedInner {
                binary_present: true,
                running_pid: None,
                pid_after_restart: Some(4242),
                hidden_probes: 0,
                fail_restarts: false,
                probes: 0,
                restarts: vec![],
            })),
        }
    }
}

impl ScriptedProcessControl {
    /// Binary present, process not running, a restart brings it up as pid 4242.
    pub fn new() -> Self {
        ScriptedProcessControl::default()
    }

    pub fn set_binary_present(&self, present: bool) {
        self.lock().binary_present = present;
    }

    pub fn set_running(&self, pid: Option<u32>) {
        self.lock().running_pid = pid;
    }

    pub fn set_pid_after_restart(&self, pid: Option<u32>) {
        self.lock().pid_after_restart = pid;
    }

    /// The next `probes` calls to `find_pid()` see nothing, as if the process table lagged.
    pub fn hide_pid_for_probes(&self, probes: usize) {
        self.lock().hidden_probes = probes;
    }

    pub fn fail_restarts(&self, fail: bool) {
        self.lock().fail_restarts = fail;
    }

    pub fn running_pid(&self) -> Option<u32> {
        self.lock().running_pid
    }

    pub fn probe_count(&self) -> usize {
        self.lock().probes
    }

    pub fn restart_count(&self) -> usize {
        self.lock().restarts.len()
    }

    /// Config paths passed to each `restart()` call, in order.
    pub fn restarts(&self) -> Vec<PathBuf> {
        self.lock().restarts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ProcessControl for ScriptedProcessControl {
    async fn binary_exists(&self) -> bool {
        self.lock().binary_present
    }

    async fn find_pid(&self) -> Option<u32> {
        let mut inner = self.lock();
        inner.probes += 1;
        if inner.hidden_probes > 0 {
            inner.hidden_probes -= 1;
            return None;
        }
        inner.running_pid
    }

    async fn restart(&self, config_path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        inner.restarts.push(config_path.to_path_buf());
        if inner.fail_restarts {
            return Err(io::Error::new(io::ErrorKind::Other, "scripted restart failure"));
        }
        inner.running_pid = inner.pid_after_restart;
        Ok(())
    }
}
