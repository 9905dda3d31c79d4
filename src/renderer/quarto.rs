use crate::error::{QmdRenderError, Result};
use crate::renderer::params::write_params_file;
use crate::renderer::{RenderOutcome, RenderRequest, Renderer};
use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const QUARTO_PATH_ENV: &str = "QUARTO_PATH";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[cfg(windows)]
const QUARTO_CANDIDATES: &[&str] = &["quarto.exe", "quarto.cmd"];
#[cfg(not(windows))]
const QUARTO_CANDIDATES: &[&str] = &["quarto"];

/// Renders documents by running the `quarto` command line tool.
pub struct QuartoRenderer {
    program: Option<PathBuf>,
    timeout: Option<Duration>,
    running: Arc<AtomicBool>,
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl QuartoRenderer {
    pub fn new() -> Self {
        Self {
            program: None,
            timeout: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shares a run flag; clearing it kills an in-flight render.
    pub fn with_cancellation(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves the quarto binary: explicit program, then `QUARTO_PATH`, then `PATH`.
    pub fn locate(&self) -> Result<PathBuf> {
        if let Some(ref program) = self.program {
            if program.is_file() {
                return Ok(program.clone());
            }
            return Err(QmdRenderError::QuartoNotFound {
                searched: vec![program.display().to_string()],
            });
        }

        if let Some(env_path) = std::env::var_os(QUARTO_PATH_ENV).filter(|p| !p.is_empty()) {
            let env_path = PathBuf::from(env_path);
            if env_path.is_file() {
                return Ok(env_path);
            }
            return Err(QmdRenderError::QuartoNotFound {
                searched: vec![format!("{}={}", QUARTO_PATH_ENV, env_path.display())],
            });
        }

        let path_var = std::env::var_os("PATH").unwrap_or_default();
        find_in_path(QUARTO_CANDIDATES, &path_var).ok_or_else(|| QmdRenderError::QuartoNotFound {
            searched: vec![QUARTO_PATH_ENV.to_string(), "PATH".to_string()],
        })
    }

    /// Runs `quarto --version` and returns the trimmed version string.
    pub fn version(&self) -> Result<String> {
        let program = self.locate()?;
        let output = Command::new(&program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| QmdRenderError::Spawn {
                program: program.display().to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(QmdRenderError::VersionCheck {
                program: program.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs quarto in its own process group and waits for it. With
    /// `stream_stdout` the child writes straight to our stdout instead of
    /// being captured.
    fn run(&self, program: &Path, args: &[OsString], stream_stdout: bool) -> Result<ProcessOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(if stream_stdout {
                Stdio::inherit()
            } else {
                Stdio::piped()
            })
            .stderr(Stdio::piped());
        isolate_process_group(&mut command);

        let mut child = command.spawn().map_err(|e| QmdRenderError::Spawn {
            program: program.display().to_string(),
            source: e,
        })?;

        let stdout = child.stdout.take().map(|s| drain_lines(s, "stdout"));
        let stderr = child.stderr.take().map(|s| drain_lines(s, "stderr"));

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            let stopped = if !self.is_running() {
                tracing::warn!("render cancelled, stopping quarto");
                Some(QmdRenderError::Cancelled)
            } else {
                match self.timeout {
                    Some(timeout) if started.elapsed() > timeout => {
                        tracing::warn!(?timeout, "render timed out, stopping quarto");
                        Some(QmdRenderError::Timeout { timeout })
                    }
                    _ => None,
                }
            };

            if let Some(error) = stopped {
                kill_process_tree(&mut child);
                // The whole group is gone, so both pipes are closed and the
                // drain threads finish with whatever was written before the kill.
                let partial = join_lines(stderr);
                let _ = join_lines(stdout);
                if !partial.is_empty() {
                    tracing::debug!(stderr = %partial, "quarto output before it was stopped");
                }
                return Err(error);
            }

            thread::sleep(POLL_INTERVAL);
        };

        Ok(ProcessOutput {
            status,
            stdout: join_lines(stdout),
            stderr: join_lines(stderr),
        })
    }
}

impl Default for QuartoRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for QuartoRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutcome> {
        if !self.is_running() {
            return Err(QmdRenderError::Cancelled);
        }

        let program = self.locate()?;

        // Removed on drop, so it must outlive the child process.
        let params_file = write_params_file(&request.options.execute_params)?;
        let args = build_args(request, params_file.as_ref().map(|f| f.path()));

        tracing::debug!(
            program = %program.display(),
            args = ?args,
            "running quarto"
        );

        let started = Instant::now();
        let output = self.run(&program, &args, request.options.writes_to_stdout())?;
        drop(params_file);

        if !output.status.success() {
            return Err(QmdRenderError::RenderFailed {
                status: output.status.to_string(),
                stderr: output.stderr,
            });
        }

        let duration = started.elapsed();
        tracing::info!(
            input = %request.input,
            format = %request.output_format,
            elapsed_ms = duration.as_millis() as u64,
            "render finished"
        );

        Ok(RenderOutcome {
            program,
            arguments: args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            output_path: request.expected_output_path(),
            stdout: output.stdout,
            stderr: output.stderr,
            duration,
        })
    }
}

/// Builds the `quarto render` argument list. Input and format are passed unchanged.
pub fn build_args(request: &RenderRequest, params_file: Option<&Path>) -> Vec<OsString> {
    let options = &request.options;
    let mut args: Vec<OsString> = vec!["render".into(), request.input.clone().into()];

    args.push("--to".into());
    args.push(request.output_format.clone().into());

    if let Some(ref output_file) = options.output_file {
        args.push("--output".into());
        args.push(output_file.into());
    }

    if !options.execute {
        args.push("--no-execute".into());
    }

    if let Some(path) = params_file {
        args.push("--execute-params".into());
        args.push(path.as_os_str().to_owned());
    }

    if let Some(ref dir) = options.execute_dir {
        args.push("--execute-dir".into());
        args.push(dir.as_os_str().to_owned());
    }

    match options.cache {
        Some(true) => args.push("--cache".into()),
        Some(false) => args.push("--no-cache".into()),
        None => {}
    }

    if options.cache_refresh {
        args.push("--cache-refresh".into());
    }

    if let Some(keepalive) = options.kernel_keepalive {
        args.push("--kernel-keepalive".into());
        args.push(keepalive.to_string().into());
    }

    if options.kernel_restart {
        args.push("--kernel-restart".into());
    }

    if options.debug {
        args.push("--debug".into());
    }

    if options.quiet {
        args.push("--quiet".into());
    }

    for (key, value) in &options.metadata {
        args.push("-M".into());
        args.push(format!("{}:{}", key, value).into());
    }

    args.extend(options.pandoc_args.iter().map(OsString::from));
    args
}

/// Returns the first candidate found as a file in any directory of `path_var`.
pub fn find_in_path(candidates: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Puts the child in a new process group so that everything quarto starts
/// (deno, pandoc, jupyter kernels) can be signalled together.
#[cfg(unix)]
fn isolate_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_process_group(_command: &mut Command) {}

/// Kills the child together with every process it spawned, then reaps it.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    // The child leads its own group, so its pid is the group id.
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(windows)]
fn kill_process_tree(child: &mut Child) {
    let _ = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &child.id().to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(any(unix, windows)))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain_lines<R: Read + Send + 'static>(reader: R, stream: &'static str) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            tracing::debug!(stream, "{}", line);
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

fn join_lines(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderOptions;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_default_args_forward_input_and_format() {
        let request = RenderRequest::new("linear_equations.qmd", "html");
        let args = build_args(&request, None);
        assert_eq!(
            as_strings(&args),
            vec!["render", "linear_equations.qmd", "--to", "html"]
        );
    }

    #[test]
    fn test_full_args_order() {
        let mut metadata = BTreeMap::new();
        metadata.insert("author".to_string(), "Ada".to_string());

        let options = RenderOptions {
            output_file: Some("out.html".to_string()),
            execute: false,
            execute_dir: Some(PathBuf::from("/work")),
            cache: Some(false),
            cache_refresh: true,
            kernel_keepalive: Some(60),
            kernel_restart: true,
            debug: true,
            quiet: true,
            metadata,
            pandoc_args: vec!["--toc".to_string()],
            ..RenderOptions::default()
        };
        let request = RenderRequest::new("doc.qmd", "pdf").with_options(options);
        let args = build_args(&request, Some(Path::new("/tmp/params.yml")));

        assert_eq!(
            as_strings(&args),
            vec![
                "render",
                "doc.qmd",
                "--to",
                "pdf",
                "--output",
                "out.html",
                "--no-execute",
                "--execute-params",
                "/tmp/params.yml",
                "--execute-dir",
                "/work",
                "--no-cache",
                "--cache-refresh",
                "--kernel-keepalive",
                "60",
                "--kernel-restart",
                "--debug",
                "--quiet",
                "-M",
                "author:Ada",
                "--toc",
            ]
        );
    }

    #[test]
    fn test_find_in_path() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let binary = second.path().join("quarto");
        std::fs::write(&binary, "").unwrap();

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(find_in_path(&["quarto"], &path_var), Some(binary));
        assert_eq!(find_in_path(&["pandoc"], &path_var), None);
        assert_eq!(find_in_path(&["quarto"], OsStr::new("")), None);
    }

    #[test]
    fn test_explicit_program_must_exist() {
        let renderer = QuartoRenderer::new().with_program("/no/such/quarto");
        assert!(matches!(
            renderer.locate(),
            Err(QmdRenderError::QuartoNotFound { .. })
        ));
    }

    #[test]
    fn test_cancellation_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        let renderer = QuartoRenderer::new().with_cancellation(flag.clone());
        assert!(renderer.is_running());

        renderer.cancel();
        assert!(!flag.load(Ordering::SeqCst));

        let result = renderer.render(&RenderRequest::new("doc.qmd", "html"));
        assert!(matches!(result, Err(QmdRenderError::Cancelled)));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("quarto");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_successful_render_captures_output() {
            let dir = TempDir::new().unwrap();
            let program = script(dir.path(), "echo \"rendering $2\"; echo warn >&2");
            let renderer = QuartoRenderer::new().with_program(&program);

            let outcome = renderer
                .render(&RenderRequest::new("doc.qmd", "html"))
                .unwrap();
            assert_eq!(outcome.program, program);
            assert_eq!(outcome.stdout, "rendering doc.qmd\n");
            assert_eq!(outcome.stderr, "warn\n");
            assert_eq!(outcome.arguments, vec!["render", "doc.qmd", "--to", "html"]);
            assert_eq!(outcome.output_path, Some(PathBuf::from("doc.html")));
        }

        #[test]
        fn test_nonzero_exit_is_render_failure() {
            let dir = TempDir::new().unwrap();
            let program = script(dir.path(), "echo 'ERROR: No valid input files' >&2; exit 1");
            let renderer = QuartoRenderer::new().with_program(program);

            match renderer.render(&RenderRequest::new("missing.qmd", "html")) {
                Err(QmdRenderError::RenderFailed { stderr, .. }) => {
                    assert!(stderr.contains("No valid input files"));
                }
                other => panic!("expected render failure, got {:?}", other.map(|o| o.arguments)),
            }
        }

        #[test]
        fn test_timeout_kills_render() {
            let dir = TempDir::new().unwrap();
            let program = script(dir.path(), "exec sleep 5");
            let renderer = QuartoRenderer::new()
                .with_program(program)
                .with_timeout(Some(Duration::from_millis(200)));

            let started = Instant::now();
            let result = renderer.render(&RenderRequest::new("doc.qmd", "html"));
            assert!(matches!(result, Err(QmdRenderError::Timeout { .. })));
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_params_file_is_passed_and_removed() {
            let dir = TempDir::new().unwrap();
            let record = dir.path().join("params-path");
            let program = script(
                dir.path(),
                &format!("echo \"$6\" > '{}'; cat \"$6\"", record.display()),
            );
            let renderer = QuartoRenderer::new().with_program(program);

            let mut options = RenderOptions::default();
            options
                .execute_params
                .insert("alpha".to_string(), serde_json::json!(2));
            let request = RenderRequest::new("doc.qmd", "html").with_options(options);

            let outcome = renderer.render(&request).unwrap();
            assert!(outcome.stdout.contains("\"alpha\": 2"));

            let params_path = std::fs::read_to_string(&record).unwrap();
            assert!(!Path::new(params_path.trim()).exists());
        }

        /// A quarto stand-in that leaves a background job behind, the way
        /// quarto leaves deno, pandoc or a kernel running. The job touches
        /// `marker` unless it is killed first.
        fn script_with_background_job(dir: &Path, marker: &Path) -> PathBuf {
            script(
                dir,
                &format!("(sleep 1; touch '{}') &\nwait", marker.display()),
            )
        }

        #[test]
        fn test_timeout_kills_child_processes() {
            let dir = TempDir::new().unwrap();
            let marker = dir.path().join("survived");
            let program = script_with_background_job(dir.path(), &marker);
            let renderer = QuartoRenderer::new()
                .with_program(program)
                .with_timeout(Some(Duration::from_millis(200)));

            let result = renderer.render(&RenderRequest::new("doc.qmd", "html"));
            assert!(matches!(result, Err(QmdRenderError::Timeout { .. })));

            thread::sleep(Duration::from_millis(1500));
            assert!(!marker.exists(), "background job outlived the timeout");
        }

        #[test]
        fn test_cancel_during_render_kills_child_processes() {
            let dir = TempDir::new().unwrap();
            let marker = dir.path().join("survived");
            let program = script_with_background_job(dir.path(), &marker);
            let flag = Arc::new(AtomicBool::new(true));
            let renderer = QuartoRenderer::new()
                .with_program(program)
                .with_cancellation(flag.clone());

            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                flag.store(false, Ordering::SeqCst);
            });

            let started = Instant::now();
            let result = renderer.render(&RenderRequest::new("doc.qmd", "html"));
            let elapsed = started.elapsed();
            canceller.join().unwrap();

            assert!(matches!(result, Err(QmdRenderError::Cancelled)));
            assert!(elapsed < Duration::from_millis(900), "cancel took {:?}", elapsed);

            thread::sleep(Duration::from_millis(1500));
            assert!(!marker.exists(), "background job outlived the cancel");
        }

        #[test]
        fn test_version() {
            let dir = TempDir::new().unwrap();
            let program = script(dir.path(), "echo 1.4.550");
            let renderer = QuartoRenderer::new().with_program(program);
            assert_eq!(renderer.version().unwrap(), "1.4.550");
        }

        #[test]
        fn test_failing_version_is_not_a_render_failure() {
            let dir = TempDir::new().unwrap();
            let program = script(dir.path(), "echo 'deno: not found' >&2; exit 127");
            let renderer = QuartoRenderer::new().with_program(&program);

            match renderer.version() {
                Err(QmdRenderError::VersionCheck { program: reported, stderr, .. }) => {
                    assert_eq!(reported, program.display().to_string());
                    assert!(stderr.contains("deno: not found"));
                }
                other => panic!("expected version check error, got {:?}", other),
            }
        }
    }
}
