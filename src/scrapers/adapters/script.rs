//! Subprocess adapter.
//!
//! The script gets one JSON object on stdin and answers with one JSON value
//! on stdout. Stderr is forwarded to the log line by line.

use std::path::Path;
use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, trace, warn};

use super::{AdapterCall, StoredEntity};
use crate::error::{Result, ScrapeError};
use crate::models::{ContentType, Input, ScrapedContent};

/// Log level a script asked for on one stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Progress,
}

impl ScriptLevel {
    fn from_marker(c: char) -> Option<Self> {
        match c {
            't' => Some(ScriptLevel::Trace),
            'd' => Some(ScriptLevel::Debug),
            'i' => Some(ScriptLevel::Info),
            'w' => Some(ScriptLevel::Warn),
            'e' => Some(ScriptLevel::Error),
            'p' => Some(ScriptLevel::Progress),
            _ => None,
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "TRACE" => Some(ScriptLevel::Trace),
            "DEBUG" => Some(ScriptLevel::Debug),
            "INFO" => Some(ScriptLevel::Info),
            "WARN" | "WARNING" => Some(ScriptLevel::Warn),
            "ERROR" => Some(ScriptLevel::Error),
            _ => None,
        }
    }
}

/// Split a stderr line into its level and message.
///
/// Lines are either prefixed `\x01<c>\x02` or with a `LEVEL:` word. Anything
/// else is an error.
fn parse_log_line(line: &str) -> (ScriptLevel, &str) {
    let mut chars = line.chars();
    if chars.next() == Some('\x01') {
        if let (Some(c), Some('\x02')) = (chars.next(), chars.next()) {
            if let Some(level) = ScriptLevel::from_marker(c) {
                return (level, chars.as_str());
            }
        }
    }

    if let Some((word, rest)) = line.split_once(':') {
        if let Some(level) = ScriptLevel::from_word(word.trim()) {
            return (level, rest.trim_start());
        }
    }

    (ScriptLevel::Error, line)
}

async fn forward_stderr<R: AsyncRead + Unpin>(name: String, stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let (level, message) = parse_log_line(&line);
        match level {
            ScriptLevel::Trace => trace!("[Scrape / {}] {}", name, message),
            ScriptLevel::Debug | ScriptLevel::Progress => debug!("[Scrape / {}] {}", name, message),
            ScriptLevel::Info => info!("[Scrape / {}] {}", name, message),
            ScriptLevel::Warn => warn!("[Scrape / {}] {}", name, message),
            ScriptLevel::Error => error!("[Scrape / {}] {}", name, message),
        }
    }
}

/// The command line with `python`/`python3` swapped for the configured
/// interpreter.
fn resolve_argv(argv: &[String], python: Option<&str>) -> Vec<String> {
    let mut argv = argv.to_vec();
    if let (Some(first), Some(python)) = (argv.first_mut(), python.filter(|p| !p.is_empty())) {
        if first == "python" || first == "python3" {
            *first = python.to_string();
        }
    }
    argv
}

async fn run_script(call: &AdapterCall<'_>, argv: &[String], input: &Value) -> Result<Value> {
    let argv = resolve_argv(argv, call.env.config.python_path.as_deref());
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ScrapeError::Configuration(format!("{}: empty script command", call.def.id)))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = call.def.dir.as_deref().filter(|d| d != &Path::new("")) {
        cmd.current_dir(dir);
    }

    debug!("Running script {:?}", argv);
    let mut child = cmd.spawn().map_err(|e| {
        ScrapeError::Subprocess(format!("error running scraper script {}: {}", program, e))
    })?;

    let payload = serde_json::to_vec(input)
        .map_err(|e| ScrapeError::Subprocess(format!("could not encode script input: {}", e)))?;
    let name = call.def.name.clone();

    call.ctx
        .run(async move {
            let mut stdin = child.stdin.take();
            let mut stdout = child
                .stdout
                .take()
                .ok_or_else(|| ScrapeError::Subprocess("script stdout unavailable".to_string()))?;
            let stderr_task = child.stderr.take().map(|e| tokio::spawn(forward_stderr(name, e)));

            let write = async {
                if let Some(mut stdin) = stdin.take() {
                    if let Err(e) = stdin.write_all(&payload).await {
                        debug!("Script did not read its input: {}", e);
                    }
                }
            };
            let read = async {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            };
            let ((), output) = tokio::join!(write, read);
            let output = output?;

            let status = child.wait().await?;
            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            if !status.success() {
                return Err(ScrapeError::Subprocess(format!(
                    "scraper script exited with {}",
                    status
                )));
            }

            serde_json::Deserializer::from_slice(&output)
                .into_iter::<Value>()
                .next()
                .ok_or_else(|| ScrapeError::Subprocess("scraper script returned no output".to_string()))?
                .map_err(|e| ScrapeError::Subprocess(format!("could not unmarshal json: {}", e)))
        })
        .await
}

fn decode(ty: ContentType, value: Value) -> Result<Option<ScrapedContent>> {
    if value.is_null() {
        return Ok(None);
    }
    ScrapedContent::from_json(ty, value)
        .map(Some)
        .map_err(|e| ScrapeError::Subprocess(format!("could not decode {} from script: {}", ty, e)))
}

pub(super) async fn by_name(
    call: &AdapterCall<'_>,
    argv: &[String],
    name: &str,
    ty: ContentType,
) -> Result<Vec<ScrapedContent>> {
    let output = run_script(call, argv, &json!({ "name": name })).await?;
    match output {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| decode(ty, item).transpose())
            .collect(),
        other => Ok(decode(ty, other)?.into_iter().collect()),
    }
}

pub(super) async fn by_url(
    call: &AdapterCall<'_>,
    argv: &[String],
    url: &str,
    ty: ContentType,
) -> Result<Option<ScrapedContent>> {
    let output = run_script(call, argv, &json!({ "url": url })).await?;
    decode(ty, output)
}

pub(super) async fn by_fragment(
    call: &AdapterCall<'_>,
    argv: &[String],
    input: &Input,
    ty: ContentType,
) -> Result<Option<ScrapedContent>> {
    let fragment = match ty {
        ContentType::Performer => serde_json::to_value(&input.performer),
        ContentType::Scene => serde_json::to_value(&input.scene),
        ContentType::Gallery => serde_json::to_value(&input.gallery),
        ContentType::Movie => {
            return Err(ScrapeError::InvalidInput(
                "movie fragments are not accepted as scrape input".to_string(),
            ))
        }
    }
    .map_err(|e| ScrapeError::Subprocess(format!("could not encode script input: {}", e)))?;

    let output = run_script(call, argv, &fragment).await?;
    decode(ty, output)
}

pub(super) async fn by_stored(
    call: &AdapterCall<'_>,
    argv: &[String],
    stored: &StoredEntity,
) -> Result<Option<ScrapedContent>> {
    let input = match stored {
        StoredEntity::Scene(scene) => serde_json::to_value(scene),
        StoredEntity::Gallery(gallery) => serde_json::to_value(gallery),
    }
    .map_err(|e| ScrapeError::Subprocess(format!("could not encode script input: {}", e)))?;

    let output = run_script(call, argv, &input).await?;
    decode(stored.content_type(), output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_line_markers() {
        assert_eq!(parse_log_line("\x01w\x02careful"), (ScriptLevel::Warn, "careful"));
        assert_eq!(parse_log_line("\x01d\x02detail"), (ScriptLevel::Debug, "detail"));
        assert_eq!(parse_log_line("INFO: hello"), (ScriptLevel::Info, "hello"));
        assert_eq!(parse_log_line("warning:  spaced"), (ScriptLevel::Warn, "spaced"));
    }

    #[test]
    fn test_unmarked_lines_are_errors() {
        assert_eq!(parse_log_line("Traceback (most recent call last):"), (ScriptLevel::Error, "Traceback (most recent call last):"));
        assert_eq!(parse_log_line("\x01z\x02odd"), (ScriptLevel::Error, "\x01z\x02odd"));
    }

    #[test]
    fn test_resolve_argv_python() {
        let argv = vec!["python3".to_string(), "scrape.py".to_string()];
        assert_eq!(
            resolve_argv(&argv, Some("/opt/py/bin/python")),
            vec!["/opt/py/bin/python", "scrape.py"]
        );
        assert_eq!(resolve_argv(&argv, None), argv);

        let node = vec!["node".to_string(), "scrape.js".to_string()];
        assert_eq!(resolve_argv(&node, Some("/opt/py/bin/python")), node);
    }

    #[test]
    fn test_decode_null_is_none() {
        assert!(decode(ContentType::Scene, Value::Null).unwrap().is_none());
        let scene = decode(ContentType::Scene, json!({"title": "T"})).unwrap().unwrap();
        assert!(matches!(scene, ScrapedContent::Scene(s) if s.title.as_deref() == Some("T")));
    }
}
