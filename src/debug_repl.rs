//! Interactive debug loop over stdio: type a snippet, terminate it with an
//! `END` line, and the rendered report is printed back. Exercises the same
//! engine and formatter path as the MCP server without needing a client.

use std::io::{self, BufRead, Write};

use crate::engine::CodeExecutor;
use crate::report;

pub(crate) fn run() -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("debug repl: end each snippet with END on its own line | Ctrl-D to exit");

    let mut executor = CodeExecutor::new();
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let mut stdout = io::stdout();

    loop {
        let Some(snippet) = read_snippet(&mut stdin)? else {
            break;
        };
        if snippet.trim().is_empty() {
            continue;
        }
        let outcome = executor.execute(&snippet, ".")?;
        let report = report::render(&outcome, &snippet)?;
        writeln!(stdout, "{}", report.text())?;
        stdout.flush()?;
    }

    Ok(())
}

/// Accumulate lines until a line ending with `END`. Returns `None` on EOF
/// before any input; EOF mid-snippet is an error so a truncated paste is not
/// silently executed.
fn read_snippet(reader: &mut impl BufRead) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let mut snippet = String::new();
    let mut saw_input = false;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            if saw_input {
                return Err("EOF reached while reading input; expected END".into());
            }
            return Ok(None);
        }
        saw_input = true;
        let (chunk, done) = split_end_marker(&line);
        snippet.push_str(&chunk);
        if done {
            return Ok(Some(snippet));
        }
    }
}

fn split_end_marker(line: &str) -> (String, bool) {
    let body = line.trim_end_matches(['\n', '\r']);
    if let Some(prefix) = body.strip_suffix("END") {
        return (prefix.to_string(), true);
    }
    (line.to_string(), false)
}
