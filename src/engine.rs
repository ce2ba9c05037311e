//! Execution engine: runs a Python snippet in a fresh interpreter, captures
//! its output streams, and extracts the conventional `result` binding.
//!
//! Each call builds a brand-new RustPython interpreter and scope, so nothing
//! leaks between executions beyond the language's own builtins. Faults raised
//! by the submitted code are caught at this boundary and reported through
//! [`ExecutionOutcome::error`]; they never take the engine down.
//!
//! The working directory is process-global state. [`CwdGuard`] restores it
//! unconditionally, and a failed restore is a fatal [`EngineError`], not
//! something to swallow. Callers must serialize executions (the server keeps
//! the executor behind a mutex).

use std::fmt;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use rustpython_vm::builtins::PyBaseExceptionRef;
use rustpython_vm::compiler::Mode;
use rustpython_vm::scope::Scope;
use rustpython_vm::{AsObject, Interpreter, PyObjectRef, PyResult, Settings, VirtualMachine};

use crate::output_capture::{self, CaptureStreams};

/// Stringified results longer than this are written to a spill file.
pub const MAX_RESULT_CHARS: usize = 5000;

const RESULT_BINDING: &str = "result";
const RESULT_SPILL_PREFIX: &str = "execute_code_result_";
const RESULT_SPILL_SUFFIX: &str = ".txt";

/// A fault raised while evaluating submitted code: the Python exception class
/// name plus its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub kind: String,
    pub message: String,
}

impl ExecutionError {
    fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The structured result of one execution attempt. Built exactly once per
/// request and never mutated afterwards.
///
/// Exactly one of `success == true` or `error.is_some()` holds; a failed
/// execution never carries a `result`. Stdout/stderr are always present, even
/// when the code faulted partway through.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Stringified `result` binding, or the overflow placeholder when the
    /// value was spilled. `None` means the code never bound `result`, which
    /// is distinct from `result = None` (captured as `"None"`).
    pub result: Option<String>,
    /// Path of the spill file holding the full result, when it overflowed.
    pub result_file: Option<PathBuf>,
    pub error: Option<ExecutionError>,
}

impl ExecutionOutcome {
    fn fault(error: ExecutionError, stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            result: None,
            result_file: None,
            error: Some(error),
        }
    }
}

/// Fatal engine failures. Execution faults are *not* represented here; they
/// are data ([`ExecutionOutcome::error`]). These variants mean the engine
/// could not uphold its own contract and the call must surface an internal
/// error.
#[derive(Debug)]
pub enum EngineError {
    /// The caller's working directory could not be restored after execution.
    RestoreWorkingDir(io::Error),
    /// The result overflowed and the spill file could not be created/written.
    ResultSpill(io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::RestoreWorkingDir(err) => {
                write!(f, "failed to restore working directory: {err}")
            }
            EngineError::ResultSpill(err) => {
                write!(f, "failed to write result spill file: {err}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::RestoreWorkingDir(err) | EngineError::ResultSpill(err) => Some(err),
        }
    }
}

/// Executes Python snippets one at a time. Holds no state between calls; the
/// `&mut self` receiver exists so an `Arc<Mutex<CodeExecutor>>` naturally
/// serializes executions, which the process-global working directory requires.
#[derive(Debug, Default)]
pub struct CodeExecutor;

impl CodeExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `code` as a full program with `working_dir` as its current
    /// directory. One-shot and synchronous; failures are reported, never
    /// retried.
    pub fn execute(
        &mut self,
        code: &str,
        working_dir: &str,
    ) -> Result<ExecutionOutcome, EngineError> {
        let target = match resolve_working_dir(working_dir) {
            Ok(path) => path,
            Err(error) => return Ok(ExecutionOutcome::fault(error, String::new(), String::new())),
        };
        let guard = match CwdGuard::enter(&target) {
            Ok(guard) => guard,
            Err(err) => {
                return Ok(ExecutionOutcome::fault(
                    os_error(working_dir, &err),
                    String::new(),
                    String::new(),
                ));
            }
        };

        let streams = CaptureStreams::new();
        let evaluated = evaluate(code, &streams);
        let (stdout, stderr) = streams.into_strings();

        // Restore before any spill IO so relative temp-dir env vars resolve
        // against the caller's directory again.
        guard.restore().map_err(EngineError::RestoreWorkingDir)?;

        match evaluated {
            Evaluated::Completed(value) => {
                let (result, result_file) = match value {
                    Some(text) => spill_if_oversized(text).map_err(EngineError::ResultSpill)?,
                    None => (None, None),
                };
                Ok(ExecutionOutcome {
                    success: true,
                    stdout,
                    stderr,
                    result,
                    result_file,
                    error: None,
                })
            }
            Evaluated::Faulted(error) => Ok(ExecutionOutcome::fault(error, stdout, stderr)),
        }
    }
}

enum Evaluated {
    /// Evaluation finished normally; carries the stringified `result`
    /// binding if the code set one.
    Completed(Option<String>),
    Faulted(ExecutionError),
}

/// Compile and run the snippet in a fresh interpreter. Every fault (compile
/// error, runtime exception, even a raising `__str__` on the result value) is
/// converted here; nothing propagates past this function.
fn evaluate(code: &str, streams: &CaptureStreams) -> Evaluated {
    let interp = build_interpreter();
    interp.enter(|vm| {
        output_capture::install(vm, streams);

        let code_obj = match vm.compile(code, Mode::Exec, "<execute_code>".to_owned()) {
            Ok(obj) => obj,
            Err(err) => {
                return Evaluated::Faulted(ExecutionError::new("SyntaxError", err.to_string()));
            }
        };

        let scope = vm.new_scope_with_builtins();
        let _ = scope
            .globals
            .set_item("__name__", vm.ctx.new_str("__main__").into(), vm);

        if let Err(exc) = vm.run_code_obj(code_obj, scope.clone()) {
            return Evaluated::Faulted(fault_from_exception(vm, &exc));
        }

        match extract_result(vm, &scope) {
            Ok(value) => Evaluated::Completed(value),
            Err(exc) => Evaluated::Faulted(fault_from_exception(vm, &exc)),
        }
    })
}

fn build_interpreter() -> Interpreter {
    Interpreter::with_init(Settings::default(), |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
    })
}

/// Read the `result` binding from the executed scope's globals, stringified
/// with `str()` semantics. A sentinel default distinguishes "never bound"
/// from `result = None`.
fn extract_result(vm: &VirtualMachine, scope: &Scope) -> PyResult<Option<String>> {
    let globals: PyObjectRef = scope.globals.as_object().to_owned();
    let sentinel: PyObjectRef = vm.ctx.new_dict().into();
    let bound = vm.call_method(
        &globals,
        "get",
        (vm.ctx.new_str(RESULT_BINDING), sentinel.clone()),
    )?;
    if bound.is(&sentinel) {
        return Ok(None);
    }
    let text = bound.str(vm)?;
    Ok(Some(text.as_str().to_owned()))
}

fn fault_from_exception(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> ExecutionError {
    let kind = exc.class().name().to_string();
    let message = exc
        .as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_else(|_| "<unprintable exception>".to_owned());
    ExecutionError { kind, message }
}

/// Resolve the requested working directory. Failure is an execution error
/// reported in the outcome, never a crash; the error kind follows the Python
/// OSError family so it reads like the faults user code raises itself.
fn resolve_working_dir(raw: &str) -> Result<PathBuf, ExecutionError> {
    let resolved = Path::new(raw)
        .canonicalize()
        .map_err(|err| os_error(raw, &err))?;
    if !resolved.is_dir() {
        return Err(ExecutionError::new(
            "NotADirectoryError",
            format!("not a directory: {}", resolved.display()),
        ));
    }
    Ok(resolved)
}

fn os_error(raw: &str, err: &io::Error) -> ExecutionError {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => "FileNotFoundError",
        io::ErrorKind::PermissionDenied => "PermissionError",
        io::ErrorKind::NotADirectory => "NotADirectoryError",
        _ => "OSError",
    };
    ExecutionError::new(kind, format!("{raw}: {err}"))
}

/// Scoped acquisition of the process working directory. `restore()` is the
/// checked release; `Drop` only covers unwinding so the directory still comes
/// back on a panic between enter and restore.
struct CwdGuard {
    original: PathBuf,
    restored: bool,
}

impl CwdGuard {
    fn enter(target: &Path) -> io::Result<Self> {
        let original = std::env::current_dir()?;
        std::env::set_current_dir(target)?;
        Ok(Self {
            original,
            restored: false,
        })
    }

    fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        std::env::set_current_dir(&self.original)
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if !self.restored {
            let _ = std::env::set_current_dir(&self.original);
        }
    }
}

/// Keep results up to [`MAX_RESULT_CHARS`] inline; write longer ones to a
/// uniquely named temp file and substitute a placeholder naming the file and
/// the original length. The file is deliberately left on disk for the caller.
fn spill_if_oversized(text: String) -> io::Result<(Option<String>, Option<PathBuf>)> {
    let chars = text.chars().count();
    if chars <= MAX_RESULT_CHARS {
        return Ok((Some(text), None));
    }

    let mut file = tempfile::Builder::new()
        .prefix(RESULT_SPILL_PREFIX)
        .suffix(RESULT_SPILL_SUFFIX)
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    let (_, path) = file.keep().map_err(|err| err.error)?;

    let placeholder = format!(
        "[Result too large ({chars} chars), written to {}]",
        path.display()
    );
    Ok((Some(placeholder), Some(path)))
}

/// Every execution switches the process working directory, so in-process
/// tests that run the engine must not overlap. Integration tests are exempt:
/// each spawned server serializes internally.
#[cfg(test)]
pub(crate) fn test_cwd_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(Mutex::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
