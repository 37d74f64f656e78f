//! Shared mock backend for CLI unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Cursor};
use std::path::Path;
use std::rc::Rc;

use tracecheck_core::classify::format_debug_line;
use tracecheck_core::parse::{TraceRecord, TRACE_MIN_LEN};
use tracecheck_core::{Boundary, Config, DiagnosticSink, Verdict};

use crate::TraceBackend;

pub struct MockTraceBackend {
    traces: HashMap<String, String>,
    config: Result<Config, String>,
    removed: RefCell<Vec<String>>,
    written: RefCell<HashMap<String, String>>,
    logged: Rc<RefCell<HashMap<String, Vec<String>>>>,
    broken_logs: HashSet<String>,
}

/// Streams into the mock's shared log map.
struct MockLogSink {
    path: String,
    logged: Rc<RefCell<HashMap<String, Vec<String>>>>,
}

impl DiagnosticSink for MockLogSink {
    fn emit(&mut self, message: &str) -> std::io::Result<()> {
        self.logged
            .borrow_mut()
            .entry(self.path.clone())
            .or_default()
            .push(message.to_string());
        Ok(())
    }
}

impl MockTraceBackend {
    pub fn new() -> Self {
        Self {
            traces: HashMap::new(),
            config: Ok(Config::default()),
            removed: RefCell::new(Vec::new()),
            written: RefCell::new(HashMap::new()),
            logged: Rc::new(RefCell::new(HashMap::new())),
            broken_logs: HashSet::new(),
        }
    }

    pub fn with_broken_log(mut self, path: &str) -> Self {
        self.broken_logs.insert(path.to_string());
        self
    }

    pub fn with_trace(mut self, path: &str, lines: &[String]) -> Self {
        self.traces.insert(path.to_string(), lines.join("\n"));
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Ok(config);
        self
    }

    pub fn with_config_error(mut self, message: &str) -> Self {
        self.config = Err(message.to_string());
        self
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.borrow().clone()
    }

    /// Verdict file contents without the trailing newline.
    pub fn written(&self, path: &str) -> Option<String> {
        self.written
            .borrow()
            .get(path)
            .map(|text| text.trim_end().to_string())
    }

    pub fn logged(&self, path: &str) -> Vec<String> {
        self.logged.borrow().get(path).cloned().unwrap_or_default()
    }
}

impl TraceBackend for MockTraceBackend {
    fn load_config(&self, _path: Option<&str>) -> Result<Config, String> {
        self.config.clone()
    }

    fn open_trace(&self, path: &str) -> Result<Box<dyn BufRead>, String> {
        match self.traces.get(path) {
            Some(text) => Ok(Box::new(Cursor::new(text.clone().into_bytes()))),
            None => Err(format!("open {path}: not found")),
        }
    }

    fn remove_file(&self, path: &str) -> Result<(), String> {
        self.removed.borrow_mut().push(path.to_string());
        self.written.borrow_mut().remove(path);
        Ok(())
    }

    fn write_verdict(&self, path: &str, verdict: Verdict) -> Result<(), String> {
        self.written
            .borrow_mut()
            .insert(path.to_string(), format!("{verdict}\n"));
        Ok(())
    }

    fn open_log(&self, path: &Path) -> Result<Box<dyn DiagnosticSink>, String> {
        let path = path.display().to_string();
        if self.broken_logs.contains(&path) {
            return Err(format!("open {path}: permission denied"));
        }
        Ok(Box::new(MockLogSink {
            path,
            logged: Rc::clone(&self.logged),
        }))
    }

    fn append_log(&self, path: &Path, lines: &[String]) -> Result<(), String> {
        self.logged
            .borrow_mut()
            .entry(path.display().to_string())
            .or_default()
            .extend(lines.iter().cloned());
        Ok(())
    }
}

/// Shorter lines are dropped by the parser, so a fixture that renders one
/// would silently lose its event.
fn record(boundary: Boundary, leave: bool, class_name: &str, method: &str, signature: &str) -> String {
    let line = TraceRecord {
        boundary,
        leave,
        thread_id: "1".to_string(),
        class_name: class_name.to_string(),
        method_name: method.to_string(),
        signature: signature.to_string(),
    }
    .to_string();
    assert!(line.len() >= TRACE_MIN_LEN, "fixture line too short: {line:?}");
    line
}

const RUN_SIGNATURE: &str = "(Ljava/lang/String;)V";

/// A passing single-test trace for `II A.main A.run`; the CALL line is at
/// index 4 and `!TESTEXIT` is last.
pub fn happy_trace() -> Vec<String> {
    vec![
        "!EXPECTED II A.main A.run".to_string(),
        record(
            Boundary::CalleeOnly,
            true,
            "java.io.PrintStream",
            "println",
            "(Ljava/lang/String;)V",
        ),
        record(Boundary::Both, false, "A", "run", RUN_SIGNATURE),
        format_debug_line(1, 3, "AGENT", "createFrame: numParams = 1, maxLocals = 1"),
        format_debug_line(2, 6, "CALL", "0 A.run(Ljava/lang/String;)V A.main([Ljava/lang/String;)V"),
        format_debug_line(3, 9, "RETURN", "A.run(Ljava/lang/String;)V"),
        record(Boundary::Both, true, "A", "run", RUN_SIGNATURE),
        format_debug_line(4, 12, "AGENT", "popFrameAndPush: isVoid = true"),
        "!TESTEXIT".to_string(),
    ]
}
