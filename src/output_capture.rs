//! Call-scoped capture of the interpreter's stdout/stderr.
//!
//! Instead of redirecting the host process streams, each execution installs
//! writer objects as `sys.stdout` / `sys.stderr` on its own VM. Python's
//! `print()` calls `sys.stdout.write(s)` followed by `sys.stdout.write('\n')`,
//! so everything the executed code emits lands in the per-call buffers and
//! never reaches the real process streams (which carry the MCP transport).

use std::sync::{Arc, Mutex};

use rustpython_vm::function::FuncArgs;
use rustpython_vm::{PyObjectRef, PyResult, VirtualMachine};

/// Shared sinks for one execution. Cloning is cheap; all clones append to the
/// same buffers.
#[derive(Clone, Default)]
pub(crate) struct CaptureStreams {
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
}

impl CaptureStreams {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Snapshot the captured text. The VM-side writer objects may still hold
    /// clones of the buffers, so this copies rather than unwrapping the Arcs.
    pub(crate) fn into_strings(self) -> (String, String) {
        let stdout = self
            .stdout
            .lock()
            .expect("stdout capture mutex poisoned")
            .clone();
        let stderr = self
            .stderr
            .lock()
            .expect("stderr capture mutex poisoned")
            .clone();
        (stdout, stderr)
    }
}

/// Replace `sys.stdout` and `sys.stderr` with buffer-backed writer objects.
pub(crate) fn install(vm: &VirtualMachine, streams: &CaptureStreams) {
    let stdout = writer_object(vm, "<stdout-capture>", Arc::clone(&streams.stdout));
    let stderr = writer_object(vm, "<stderr-capture>", Arc::clone(&streams.stderr));
    let _ = vm.sys_module.set_attr("stdout", stdout, vm);
    let _ = vm.sys_module.set_attr("stderr", stderr, vm);
}

/// Build a minimal Python object with `write(s)` and `flush()` methods whose
/// writes append to `sink`. A module object is used as the namespace; it
/// supports arbitrary attributes and is the simplest writable carrier.
fn writer_object(vm: &VirtualMachine, name: &str, sink: Arc<Mutex<String>>) -> PyObjectRef {
    let write_fn = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let data = args
                .args
                .first()
                .and_then(|obj| obj.str(vm).ok())
                .map(|s| s.as_str().to_owned())
                .unwrap_or_default();
            sink.lock().expect("capture mutex poisoned").push_str(&data);
            // Text-stream contract: report characters written, not bytes.
            Ok(vm.ctx.new_int(data.chars().count()).into())
        },
    );
    let flush_fn = vm.new_function(
        "flush",
        move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> { Ok(vm.ctx.none()) },
    );

    let ns = vm.new_module(name, vm.ctx.new_dict(), None);
    let _ = ns.set_attr("write", write_fn, vm);
    let _ = ns.set_attr("flush", flush_fn, vm);
    // Some Python code probes these attributes before writing.
    let _ = ns.set_attr("closed", vm.ctx.new_bool(false), vm);
    let _ = ns.set_attr("encoding", vm.ctx.new_str("utf-8"), vm);
    ns.into()
}
