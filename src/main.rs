mod debug_repl;
mod diagnostics;
mod engine;
mod event_log;
mod highlight;
mod install;
mod output_capture;
mod report;
mod server;

use std::path::PathBuf;

#[derive(Debug)]
enum CliCommand {
    RunServer(CliOptions),
    Install(install::InstallOptions),
    HighlightTest,
}

#[derive(Debug)]
struct CliOptions {
    debug_repl: bool,
    debug_events_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(target_family = "unix")]
    // The server writes its responses to stdout. If a downstream reader
    // disconnects and closes its read end, future writes can raise SIGPIPE and
    // terminate the process on Unix. Ignore SIGPIPE so we surface broken-pipe
    // errors normally instead of crashing.
    ignore_sigpipe();
    diagnostics::startup_log("main: entry");

    match parse_cli_args()? {
        CliCommand::HighlightTest => {
            run_highlight_test();
            Ok(())
        }
        CliCommand::Install(options) => install::run(options),
        CliCommand::RunServer(options) => {
            event_log::initialize(
                options.debug_events_dir,
                event_log::StartupContext {
                    mode: if options.debug_repl {
                        "debug_repl".to_string()
                    } else {
                        "server".to_string()
                    },
                },
            )?;
            if options.debug_repl {
                diagnostics::startup_log("main: debug repl mode");
                return debug_repl::run();
            }
            diagnostics::startup_log("main: server mode");
            server::run().await
        }
    }
}

#[cfg(target_family = "unix")]
fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

fn parse_cli_args() -> Result<CliCommand, Box<dyn std::error::Error>> {
    let mut parser = ArgParser::new();
    if let Some(arg) = parser.peek()
        && arg == "install"
    {
        parser.next();
        return Ok(CliCommand::Install(parse_install_args(&mut parser)?));
    }
    parse_server_args(&mut parser)
}

fn parse_server_args(parser: &mut ArgParser) -> Result<CliCommand, Box<dyn std::error::Error>> {
    let mut debug_repl = false;
    let mut debug_events_dir = None;

    while let Some(arg) = parser.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--debug-repl" => {
                debug_repl = true;
            }
            "--highlight-test" => {
                return Ok(CliCommand::HighlightTest);
            }
            "--debug-events-dir" => {
                let value = parser.next_value("--debug-events-dir")?;
                if value.trim().is_empty() {
                    return Err("missing value for --debug-events-dir".into());
                }
                debug_events_dir = Some(PathBuf::from(value));
            }
            _ if arg.starts_with("--debug-events-dir=") => {
                let value = arg.split_once('=').map(|(_, value)| value).unwrap_or("");
                if value.trim().is_empty() {
                    return Err("missing value for --debug-events-dir".into());
                }
                debug_events_dir = Some(PathBuf::from(value));
            }
            _ => return Err(format!("unknown argument: {arg}").into()),
        }
    }

    Ok(CliCommand::RunServer(CliOptions {
        debug_repl,
        debug_events_dir,
    }))
}

fn parse_install_args(
    parser: &mut ArgParser,
) -> Result<install::InstallOptions, Box<dyn std::error::Error>> {
    let mut targets = Vec::new();
    let mut server_name = install::DEFAULT_SERVER_NAME.to_string();
    let mut command = None;
    let mut args = Vec::new();

    while let Some(arg) = parser.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_install_usage();
                std::process::exit(0);
            }
            "--client" => {
                let value = parser.next_value("--client")?;
                parse_install_targets_value(&value, &mut targets)?;
            }
            _ if arg.starts_with("--client=") => {
                let value = arg.split_once('=').map(|(_, value)| value).unwrap_or("");
                if value.is_empty() {
                    return Err("missing value for --client".into());
                }
                parse_install_targets_value(value, &mut targets)?;
            }
            "--server-name" => {
                server_name = parser.next_value("--server-name")?;
            }
            _ if arg.starts_with("--server-name=") => {
                let value = arg.split_once('=').map(|(_, value)| value).unwrap_or("");
                if value.is_empty() {
                    return Err("missing value for --server-name".into());
                }
                server_name = value.to_string();
            }
            "--command" => {
                command = Some(parser.next_value("--command")?);
            }
            _ if arg.starts_with("--command=") => {
                let value = arg.split_once('=').map(|(_, value)| value).unwrap_or("");
                if value.is_empty() {
                    return Err("missing value for --command".into());
                }
                command = Some(value.to_string());
            }
            "--arg" => {
                args.push(parser.next_value("--arg")?);
            }
            _ if arg.starts_with("--arg=") => {
                let value = arg.split_once('=').map(|(_, value)| value).unwrap_or("");
                if value.is_empty() {
                    return Err("missing value for --arg".into());
                }
                args.push(value.to_string());
            }
            _ => {
                if let Some(flag) = arg.strip_prefix('-') {
                    return Err(format!("unknown install option: -{flag}").into());
                }
                targets.push(
                    install::InstallTarget::parse(&arg)
                        .map_err(|err| -> Box<dyn std::error::Error> { err.into() })?,
                );
            }
        }
    }

    Ok(install::InstallOptions {
        targets,
        server_name,
        command,
        args,
    })
}

fn parse_install_targets_value(
    raw: &str,
    targets: &mut Vec<install::InstallTarget>,
) -> Result<(), Box<dyn std::error::Error>> {
    for part in raw.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            return Err("empty --client value (expected codex|claude)".into());
        }
        targets.push(
            install::InstallTarget::parse(trimmed)
                .map_err(|err| -> Box<dyn std::error::Error> { err.into() })?,
        );
    }
    Ok(())
}

struct ArgParser {
    args: Vec<String>,
    index: usize,
}

impl ArgParser {
    fn new() -> Self {
        // Lossy on purpose: a stray non-UTF-8 argument should produce an
        // "unknown argument" error, not a panic before parsing starts.
        Self {
            args: std::env::args_os()
                .skip(1)
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            index: 0,
        }
    }

    fn next(&mut self) -> Option<String> {
        let value = self.args.get(self.index)?.clone();
        self.index += 1;
        Some(value)
    }

    fn peek(&self) -> Option<&str> {
        self.args.get(self.index).map(String::as_str)
    }

    fn next_value(&mut self, flag: &str) -> Result<String, Box<dyn std::error::Error>> {
        self.next()
            .ok_or_else(|| format!("missing value for {flag}").into())
    }
}

fn run_highlight_test() {
    let sample = "import math\n\nresult = math.sqrt(91)";
    println!("Testing syntax highlighting:");
    println!("{}", "=".repeat(50));
    println!("{}", highlight::highlight_python(sample));
    println!("{}", "=".repeat(50));
}

fn print_usage() {
    println!(
        "Usage:\n\
mcp-pyexec [--debug-repl] [--debug-events-dir <dir>]\n\
mcp-pyexec install [codex] [claude] [--client <codex|claude>]... [--server-name <name>] [--command <path>] [--arg <value>]...\n\
mcp-pyexec --highlight-test\n\n\
--debug-repl: run the execute_code engine interactively over stdio (end snippets with END)\n\
--debug-events-dir: optional directory for per-startup JSONL debug event logs (env: {})\n\
--highlight-test: print a syntax-highlighted sample snippet and exit\n\
install: update MCP config for existing agent homes only (does not create ~/.codex or ~/.claude)",
        event_log::DEBUG_EVENTS_DIR_ENV
    );
}

fn print_install_usage() {
    println!(
        "Usage:\n\
mcp-pyexec install [codex] [claude] [--client <codex|claude>]... [--server-name <name>] [--command <path>] [--arg <value>]...\n\n\
If no target is specified, all existing agent homes are used:\n\
- codex: $CODEX_HOME or ~/.codex\n\
- claude: ~/.claude\n\
Missing homes are not created."
    );
}
