//! tracecheck-cli: command-line surface for tracecheck.
//!
//! `tracecheck [-t|-T] [--json] [--config FILE] [--log-file FILE] <inputfile> <outputfile>`
//! checks the trace in `inputfile` and writes `PASS` or `FAIL` to
//! `outputfile`.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracecheck_core::diagnostics::{DiagnosticLogger, Verbosity};
use tracecheck_core::{run_streamed, Config, DiagnosticSink, Outcome, Verdict};

/// Stable crate label used by smoke tests.
pub fn crate_label() -> &'static str {
    "tracecheck-cli"
}

static VERSION: OnceLock<String> = OnceLock::new();

/// Set the version string for `--version` output.
pub fn set_version(version: &str) {
    let _ = VERSION.set(version.to_string());
}

fn get_version() -> &'static str {
    VERSION.get().map(|s| s.as_str()).unwrap_or("dev")
}

fn usage_text() -> String {
    "\
Usage: tracecheck [-t|-T] [flags] <inputfile> <outputfile>

Checks an instrumented run's trace against the event sequences declared by
its !EXPECTED lines and writes PASS or FAIL to <outputfile>.

Flags:
  -t                   print per-test diagnostics
  -T                   print per-line diagnostics (implies -t)
      --json           print a JSON run report instead of diagnostics
      --config FILE    YAML config file
      --log-file FILE  append diagnostics to FILE with timestamps
  -h, --help           help for tracecheck
      --version        version for tracecheck
"
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// File-system seam so the command can run against in-memory fixtures.
pub trait TraceBackend {
    fn load_config(&self, path: Option<&str>) -> Result<Config, String>;
    fn open_trace(&self, path: &str) -> Result<Box<dyn BufRead>, String>;
    /// Remove `path` if it exists.
    fn remove_file(&self, path: &str) -> Result<(), String>;
    fn write_verdict(&self, path: &str, verdict: Verdict) -> Result<(), String>;
    /// Sink that appends each diagnostic to `path` as the run produces it.
    fn open_log(&self, path: &Path) -> Result<Box<dyn DiagnosticSink>, String>;
    fn append_log(&self, path: &Path, lines: &[String]) -> Result<(), String>;
}

pub struct FilesystemBackend;

impl TraceBackend for FilesystemBackend {
    fn load_config(&self, path: Option<&str>) -> Result<Config, String> {
        tracecheck_core::load_config(path)
            .map(|(cfg, _used)| cfg)
            .map_err(|err| err.to_string())
    }

    fn open_trace(&self, path: &str) -> Result<Box<dyn BufRead>, String> {
        let file = fs::File::open(path).map_err(|err| format!("open {path}: {err}"))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn remove_file(&self, path: &str) -> Result<(), String> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(format!("remove {path}: {err}")),
        }
    }

    fn write_verdict(&self, path: &str, verdict: Verdict) -> Result<(), String> {
        fs::write(path, format!("{verdict}\n")).map_err(|err| format!("write {path}: {err}"))
    }

    fn open_log(&self, path: &Path) -> Result<Box<dyn DiagnosticSink>, String> {
        let logger =
            DiagnosticLogger::new(path).map_err(|err| format!("open {}: {err}", path.display()))?;
        Ok(Box::new(logger))
    }

    fn append_log(&self, path: &Path, lines: &[String]) -> Result<(), String> {
        let mut logger =
            DiagnosticLogger::new(path).map_err(|err| format!("open {}: {err}", path.display()))?;
        logger
            .write_all_lines(lines)
            .map_err(|err| format!("write {}: {err}", path.display()))
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    verbosity: Option<Verbosity>,
    json: bool,
    config_file: Option<String>,
    log_file: Option<String>,
    input: String,
    output: String,
}

fn parse_args(args: &[String]) -> Result<CliArgs, (i32, String)> {
    let mut parsed = CliArgs::default();
    let mut positional = Vec::new();
    let mut i = 0;

    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => return Err((0, usage_text())),
            "--version" => return Err((0, format!("tracecheck version {}\n", get_version()))),
            "-t" => parsed.verbosity = parsed.verbosity.max(Some(Verbosity::Test)),
            "-T" => parsed.verbosity = Some(Verbosity::Line),
            "--json" => parsed.json = true,
            "--config" | "--log-file" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return Err((2, format!("flag {arg} requires a value\n")));
                };
                if arg == "--config" {
                    parsed.config_file = Some(value.clone());
                } else {
                    parsed.log_file = Some(value.clone());
                }
            }
            v if v.starts_with("--config=") => {
                parsed.config_file = v.strip_prefix("--config=").map(str::to_string);
            }
            v if v.starts_with("--log-file=") => {
                parsed.log_file = v.strip_prefix("--log-file=").map(str::to_string);
            }
            v if v.starts_with('-') && v.len() > 1 => {
                return Err((2, format!("unknown flag: {v}\n")));
            }
            v => positional.push(v.to_string()),
        }
        i += 1;
    }

    match positional.len() {
        0 | 1 => Err((0, usage_text())),
        2 => {
            let mut positional = positional.into_iter();
            parsed.input = positional.next().unwrap_or_default();
            parsed.output = positional.next().unwrap_or_default();
            Ok(parsed)
        }
        _ => Err((2, format!("unexpected argument: {}\n", positional[2]))),
    }
}

fn execute(args: &[String], backend: &dyn TraceBackend) -> Result<CommandOutput, (i32, String)> {
    let parsed = match parse_args(args) {
        Ok(parsed) => parsed,
        Err((0, text)) => {
            return Ok(CommandOutput {
                stdout: text,
                stderr: String::new(),
                exit_code: 0,
            });
        }
        Err(err) => return Err(err),
    };

    let mut config = backend
        .load_config(parsed.config_file.as_deref())
        .map_err(|err| (1, format!("Error loading config: {err}\n")))?;
    if let Some(verbosity) = parsed.verbosity {
        config.logging.verbosity = verbosity;
    }
    if let Some(path) = &parsed.log_file {
        config.logging.file = Some(PathBuf::from(path));
    }

    backend
        .remove_file(&parsed.output)
        .map_err(|err| (1, format!("{err}\n")))?;
    let reader = backend
        .open_trace(&parsed.input)
        .map_err(|err| (1, format!("{err}\n")))?;
    let sink = match &config.logging.file {
        Some(path) => Some(backend.open_log(path).map_err(|err| (1, format!("{err}\n")))?),
        None => None,
    };
    // JSON output carries only the diagnostic tail.
    let outcome = run_streamed(&config, reader, sink, !parsed.json)
        .map_err(|err| (1, format!("{err}\n")))?;

    backend
        .write_verdict(&parsed.output, outcome.verdict)
        .map_err(|err| (1, format!("{err}\n")))?;
    if let Some(path) = &config.logging.file {
        let mut lines = outcome.warnings();
        lines.push(format!("verdict: {}", outcome.verdict));
        backend
            .append_log(path, &lines)
            .map_err(|err| (1, format!("{err}\n")))?;
    }

    Ok(CommandOutput {
        stdout: render_stdout(&outcome, parsed.json)?,
        stderr: String::new(),
        exit_code: 0,
    })
}

fn render_stdout(outcome: &Outcome, json: bool) -> Result<String, (i32, String)> {
    if json {
        let mut text = serde_json::to_string_pretty(&outcome.report())
            .map_err(|err| (1, format!("encode report: {err}\n")))?;
        text.push('\n');
        return Ok(text);
    }
    let mut text = String::new();
    for line in outcome.diagnostics.iter().chain(outcome.warnings().iter()) {
        text.push_str(line);
        text.push('\n');
    }
    Ok(text)
}

pub fn run_cli_for_test(args: &[&str], backend: &dyn TraceBackend) -> CommandOutput {
    let owned: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
    run_cli(&owned, backend)
}

pub fn run_cli(args: &[String], backend: &dyn TraceBackend) -> CommandOutput {
    match execute(args, backend) {
        Ok(output) => output,
        Err((exit_code, message)) => CommandOutput {
            stdout: String::new(),
            stderr: message,
            exit_code,
        },
    }
}

#[cfg(test)]
pub(crate) mod tests_common;
