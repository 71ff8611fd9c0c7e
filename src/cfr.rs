//! CFR decompiler subprocess.
//!
//! CFR runs through the `java` launcher (override with `JARDEX_JAVA`).
//! Each invocation is independent and carries a soft timeout; a timed-out
//! or failed run surfaces as [`JardexError::DecompilerUnavailable`] and is
//! never retried here.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::JardexError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Cfr {
    cfr_jar: PathBuf,
    timeout: Duration,
}

impl Cfr {
    pub fn new(cfr_jar: PathBuf) -> Self {
        Self {
            cfr_jar,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Decompile a single class out of `jar_path`. Returns the raw CFR
    /// stdout, one or more source units.
    pub fn decompile_class(&self, jar_path: &Path, class_name: &str) -> Result<String, JardexError> {
        let jar = path_str(jar_path)?;
        let cfr = path_str(&self.cfr_jar)?;
        self.run(&[
            "-jar",
            cfr,
            "--extraclasspath",
            jar,
            class_name,
            "--silent",
            "true",
            "--comments",
            "false",
        ])
    }

    fn run(&self, args: &[&str]) -> Result<String, JardexError> {
        let java_bin = std::env::var("JARDEX_JAVA").unwrap_or_else(|_| "java".to_string());
        let mut child = Command::new(&java_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                JardexError::DecompilerUnavailable(format!(
                    "failed to launch {java_bin} (is a JRE installed?): {e}"
                ))
            })?;

        // Drain both pipes on their own threads so a chatty child never
        // blocks on a full pipe while we poll for exit.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = std::thread::spawn(move || drain(stdout_pipe));
        let stderr_reader = std::thread::spawn(move || drain(stderr_pipe));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(JardexError::DecompilerUnavailable(format!(
                            "decompilation timed out after {:?}",
                            self.timeout
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(JardexError::DecompilerUnavailable(format!(
                        "failed to wait for decompiler: {e}"
                    )));
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(JardexError::DecompilerUnavailable(format!(
                "CFR decompilation failed: {}",
                stderr.trim()
            )));
        }

        Ok(stdout)
    }
}

/// Serializes tests that override the `JARDEX_JAVA` launcher.
#[cfg(test)]
pub(crate) fn java_env_lock() -> &'static std::sync::Mutex<()> {
    static LOCK: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    LOCK.get_or_init(|| std::sync::Mutex::new(()))
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

fn path_str(path: &Path) -> Result<&str, JardexError> {
    path.to_str().ok_or_else(|| {
        JardexError::DecompilerUnavailable(format!("path is not valid UTF-8: {}", path.display()))
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use super::java_env_lock;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "jardex_cfr_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_executable(path: &Path, content: &str) {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn decompile_class_passes_extraclasspath() {
        let _guard = java_env_lock().lock().expect("env lock poisoned");
        let base = temp_dir("extraclasspath");
        let fake_java = base.join("java");
        write_executable(
            &fake_java,
            r#"#!/bin/sh
if [ "$3" = "--extraclasspath" ]; then
  echo "package org.example;"
  echo "public class Demo {"
  echo "}"
else
  echo "unexpected args" >&2
  exit 1
fi
"#,
        );

        // SAFETY: Guarded by java_env_lock and removed before returning.
        unsafe { std::env::set_var("JARDEX_JAVA", &fake_java) };
        let cfr = Cfr::new(base.join("cfr.jar"));
        let out = cfr.decompile_class(&base.join("demo.jar"), "org.example.Demo");
        // SAFETY: Guarded by java_env_lock.
        unsafe { std::env::remove_var("JARDEX_JAVA") };

        assert!(out.unwrap().contains("public class Demo"));
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn failure_surfaces_stderr_as_unavailable() {
        let _guard = java_env_lock().lock().expect("env lock poisoned");
        let base = temp_dir("failure");
        let fake_java = base.join("java");
        write_executable(
            &fake_java,
            r#"#!/bin/sh
echo "boom from fake cfr" >&2
exit 1
"#,
        );

        // SAFETY: Guarded by java_env_lock and removed before returning.
        unsafe { std::env::set_var("JARDEX_JAVA", &fake_java) };
        let cfr = Cfr::new(base.join("cfr.jar"));
        let err = cfr
            .decompile_class(&base.join("demo.jar"), "org.example.Demo")
            .unwrap_err();
        // SAFETY: Guarded by java_env_lock.
        unsafe { std::env::remove_var("JARDEX_JAVA") };

        let msg = err.to_string();
        assert!(msg.contains("boom from fake cfr"));
        assert!(matches!(err, JardexError::DecompilerUnavailable(_)));
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn timeout_kills_the_subprocess() {
        let _guard = java_env_lock().lock().expect("env lock poisoned");
        let base = temp_dir("timeout");
        let fake_java = base.join("java");
        write_executable(&fake_java, "#!/bin/sh\nsleep 30\n");

        // SAFETY: Guarded by java_env_lock and removed before returning.
        unsafe { std::env::set_var("JARDEX_JAVA", &fake_java) };
        let cfr = Cfr::new(base.join("cfr.jar")).with_timeout(Duration::from_millis(200));
        let err = cfr
            .decompile_class(&base.join("demo.jar"), "org.example.Demo")
            .unwrap_err();
        // SAFETY: Guarded by java_env_lock.
        unsafe { std::env::remove_var("JARDEX_JAVA") };

        assert!(err.to_string().contains("timed out"));
        let _ = fs::remove_dir_all(base);
    }
}
