//! `install` subcommand: register this server in existing agent homes.
//!
//! Updates Codex (`$CODEX_HOME/config.toml`, default `~/.codex`) and Claude
//! (`~/.claude/settings.json` or `config.json`) MCP configurations. Missing
//! homes are never created; the command only edits configs that already have
//! somewhere to live.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map as JsonMap, Value as JsonValue};
use toml_edit::{Array, DocumentMut, Item, Table, value};

pub const DEFAULT_SERVER_NAME: &str = "pyexec";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallTarget {
    Codex,
    Claude,
}

impl InstallTarget {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            _ => Err(format!(
                "invalid install target: {raw} (expected codex|claude)"
            )),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub targets: Vec<InstallTarget>,
    pub server_name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
}

pub fn run(options: InstallOptions) -> Result<(), Box<dyn std::error::Error>> {
    let command = match options.command {
        Some(command) => command,
        None => default_command()?,
    };
    let targets = resolve_target_roots(&options.targets)?;

    for (target, root) in targets {
        match target {
            InstallTarget::Codex => {
                let path = root.join("config.toml");
                upsert_codex_config(&path, &options.server_name, &command, &options.args)?;
                println!("Updated {} MCP config: {}", target.label(), path.display());
            }
            InstallTarget::Claude => {
                let path = resolve_claude_config_path(&root);
                upsert_claude_config(&path, &options.server_name, &command, &options.args)?;
                println!("Updated {} MCP config: {}", target.label(), path.display());
            }
        }
    }
    Ok(())
}

/// Explicit targets must exist; with no targets, every existing agent home is
/// used, and finding none is an error.
fn resolve_target_roots(
    targets: &[InstallTarget],
) -> Result<Vec<(InstallTarget, PathBuf)>, Box<dyn std::error::Error>> {
    if !targets.is_empty() {
        let mut resolved = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for target in targets {
            if !seen.insert(*target) {
                continue;
            }
            let root = target_home(*target)?;
            if !root.is_dir() {
                return Err(format!(
                    "{} home does not exist: {} (install does not create it)",
                    target.label(),
                    root.display()
                )
                .into());
            }
            resolved.push((*target, root));
        }
        return Ok(resolved);
    }

    let mut resolved = Vec::new();
    for target in [InstallTarget::Codex, InstallTarget::Claude] {
        let root = target_home(target)?;
        if root.is_dir() {
            resolved.push((target, root));
        }
    }
    if resolved.is_empty() {
        return Err(
            "no existing agent home found (expected ~/.codex and/or ~/.claude; not creating new directories)"
                .into(),
        );
    }
    Ok(resolved)
}

fn target_home(target: InstallTarget) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match target {
        InstallTarget::Codex => {
            if let Some(root) = env::var_os("CODEX_HOME").filter(|value| !value.is_empty()) {
                return Ok(PathBuf::from(root));
            }
            Ok(home_dir()?.join(".codex"))
        }
        InstallTarget::Claude => Ok(home_dir()?.join(".claude")),
    }
}

fn home_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    resolve_home_dir_from_env(env::var_os("HOME"), env::var_os("USERPROFILE"))
        .ok_or_else(|| "cannot determine home directory (expected HOME or USERPROFILE)".into())
}

fn resolve_home_dir_from_env(
    home: Option<OsString>,
    userprofile: Option<OsString>,
) -> Option<PathBuf> {
    home.filter(|value| !value.is_empty())
        .or(userprofile.filter(|value| !value.is_empty()))
        .map(PathBuf::from)
}

fn default_command() -> Result<String, Box<dyn std::error::Error>> {
    let exe = env::current_exe()?;
    Ok(exe.to_string_lossy().to_string())
}

fn resolve_claude_config_path(root: &Path) -> PathBuf {
    let settings = root.join("settings.json");
    if settings.is_file() {
        return settings;
    }
    let config = root.join("config.json");
    if config.is_file() {
        return config;
    }
    settings
}

fn upsert_codex_config(
    config_path: &Path,
    server_name: &str,
    command: &str,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = if config_path.is_file() {
        fs::read_to_string(config_path)?
            .parse::<DocumentMut>()
            .map_err(|err| {
                format!(
                    "failed to parse codex config {}: {err}",
                    config_path.display()
                )
            })?
    } else {
        DocumentMut::new()
    };

    upsert_codex_server(&mut doc, server_name, command, args)?;
    atomic_write(config_path, &doc.to_string())?;
    Ok(())
}

fn upsert_codex_server(
    doc: &mut DocumentMut,
    server_name: &str,
    command: &str,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    if doc.get("mcp_servers").is_some_and(|item| !item.is_table()) {
        return Err("`mcp_servers` must be a TOML table".into());
    }
    if !doc.contains_key("mcp_servers") {
        let mut table = Table::new();
        table.set_implicit(true);
        doc.insert("mcp_servers", Item::Table(table));
    }

    let server_item = &mut doc["mcp_servers"][server_name];
    if server_item.is_none() {
        *server_item = Item::Table(Table::new());
    } else if !server_item.is_table() {
        return Err(format!("`mcp_servers.{server_name}` must be a TOML table").into());
    }

    doc["mcp_servers"][server_name]["command"] = value(command);
    let mut toml_args = Array::default();
    for arg in args {
        toml_args.push(arg.as_str());
    }
    doc["mcp_servers"][server_name]["args"] = Item::Value(toml_args.into());
    Ok(())
}

fn upsert_claude_config(
    config_path: &Path,
    server_name: &str,
    command: &str,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut root = if config_path.is_file() {
        let raw = fs::read_to_string(config_path)?;
        serde_json::from_str::<JsonValue>(&raw).map_err(|err| {
            format!(
                "failed to parse JSON claude config {}: {err}",
                config_path.display()
            )
        })?
    } else {
        JsonValue::Object(JsonMap::new())
    };

    upsert_claude_server(&mut root, server_name, command, args)?;
    let mut serialized = serde_json::to_string_pretty(&root)?;
    serialized.push('\n');
    atomic_write(config_path, &serialized)?;
    Ok(())
}

fn upsert_claude_server(
    root: &mut JsonValue,
    server_name: &str,
    command: &str,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(root_obj) = root.as_object_mut() else {
        return Err("claude config root must be a JSON object".into());
    };
    let mcp_servers = root_obj
        .entry("mcpServers".to_string())
        .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    let Some(mcp_obj) = mcp_servers.as_object_mut() else {
        return Err("claude config `mcpServers` must be a JSON object".into());
    };
    mcp_obj.insert(
        server_name.to_string(),
        JsonValue::Object(JsonMap::from_iter([
            (
                "command".to_string(),
                JsonValue::String(command.to_string()),
            ),
            (
                "args".to_string(),
                JsonValue::Array(args.iter().cloned().map(JsonValue::String).collect()),
            ),
        ])),
    );
    Ok(())
}

/// Write via a sibling temp file and rename, so a crash mid-write never
/// leaves a half-written agent config behind.
fn atomic_write(path: &Path, contents: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = path.parent().ok_or("config path has no parent directory")?;
    let mut temp = tempfile::Builder::new()
        .prefix(".mcp-pyexec-install-")
        .tempfile_in(dir)?;
    std::io::Write::write_all(&mut temp, contents.as_bytes())?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codex_upsert_creates_server_table() {
        let mut doc = DocumentMut::new();
        upsert_codex_server(
            &mut doc,
            "pyexec",
            "/usr/local/bin/mcp-pyexec",
            &["--debug-repl".to_string()],
        )
        .expect("upsert");
        let rendered = doc.to_string();
        assert!(
            rendered.contains("[mcp_servers.pyexec]"),
            "got: {rendered}"
        );
        assert!(
            rendered.contains("command = \"/usr/local/bin/mcp-pyexec\""),
            "got: {rendered}"
        );
        assert!(rendered.contains("--debug-repl"), "got: {rendered}");
    }

    #[test]
    fn codex_upsert_preserves_unrelated_config() {
        let mut doc = "model = \"gpt-5\"\n\n[mcp_servers.other]\ncommand = \"other\"\n"
            .parse::<DocumentMut>()
            .expect("parse");
        upsert_codex_server(&mut doc, "pyexec", "/bin/pyexec", &[]).expect("upsert");
        let rendered = doc.to_string();
        assert!(rendered.contains("model = \"gpt-5\""), "got: {rendered}");
        assert!(rendered.contains("[mcp_servers.other]"), "got: {rendered}");
        assert!(rendered.contains("[mcp_servers.pyexec]"), "got: {rendered}");
    }

    #[test]
    fn codex_upsert_rejects_non_table_server_entry() {
        let mut doc = "mcp_servers = 1\n".parse::<DocumentMut>().expect("parse");
        let err = upsert_codex_server(&mut doc, "pyexec", "/bin/pyexec", &[])
            .expect_err("expected type error");
        assert!(
            err.to_string().contains("must be a TOML table"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn claude_upsert_adds_mcp_servers_entry() {
        let mut root = serde_json::json!({ "theme": "dark" });
        upsert_claude_server(
            &mut root,
            "pyexec",
            "/bin/pyexec",
            &["--debug-events-dir=/tmp/events".to_string()],
        )
        .expect("upsert");
        assert_eq!(root["theme"], "dark");
        assert_eq!(root["mcpServers"]["pyexec"]["command"], "/bin/pyexec");
        assert_eq!(
            root["mcpServers"]["pyexec"]["args"][0],
            "--debug-events-dir=/tmp/events"
        );
    }

    #[test]
    fn claude_upsert_rejects_non_object_root() {
        let mut root = serde_json::json!([1, 2, 3]);
        let err = upsert_claude_server(&mut root, "pyexec", "/bin/pyexec", &[])
            .expect_err("expected type error");
        assert!(
            err.to_string().contains("must be a JSON object"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn home_dir_prefers_home_over_userprofile() {
        let resolved = resolve_home_dir_from_env(
            Some(OsString::from("/home/dev")),
            Some(OsString::from("C:\\Users\\dev")),
        );
        assert_eq!(resolved, Some(PathBuf::from("/home/dev")));
    }

    #[test]
    fn home_dir_falls_back_to_userprofile() {
        let resolved =
            resolve_home_dir_from_env(Some(OsString::new()), Some(OsString::from("C:\\Users\\dev")));
        assert_eq!(resolved, Some(PathBuf::from("C:\\Users\\dev")));
    }
}
