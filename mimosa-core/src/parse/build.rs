/*!
Parses `docker build` and `docker buildx build` invocations.

Recognizes the flags that affect either the resulting image (tags, platform,
build args, target stage, labels) or the context mimosa reads from disk
(`-f`/`--file`, the positional context path). Flags that only affect local
UI (`--progress`, `--quiet`) or local cache behavior (`--pull`, `--no-cache`)
are intentionally excluded from the canonical command bytes: two builds that
differ only in those flags must still hit the same cache entry.
*/
use super::error::{self, Result};
use super::reference::TagRef;
use super::{BuildTarget, ParsedCommand};
use crate::context::{enumerate_context_files, BuildContext};
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};

const DEFAULT_TARGET: &str = "default";
const IGNORE_FILE_NAME: &str = ".dockerignore";

/// Flags that take a value and are part of the cache-relevant command
/// shape. Order does not matter for fingerprinting (the caller sorts), but
/// we do need to know which bare words are a flag's argument rather than a
/// second positional context path.
const VALUE_FLAGS: &[(&str, &str)] = &[
    ("-t", "--tag"),
    ("-f", "--file"),
    ("", "--platform"),
    ("", "--build-arg"),
    ("", "--target"),
    ("", "--label"),
    ("", "--output"),
    ("-o", ""),
    ("", "--network"),
    ("", "--cache-from"),
    ("", "--cache-to"),
    ("", "--secret"),
    ("", "--ssh"),
    ("", "--add-host"),
    ("", "--progress"),
];

/// Flags that never affect the build's cacheable identity: purely local UI
/// or local Docker daemon cache behavior. `--progress` is a value flag (see
/// `VALUE_FLAGS`) and is excluded from the canonical bytes in `record_flag`
/// instead of here, since it still needs its value token consumed.
const IGNORED_FLAGS: &[&str] = &["--quiet", "-q", "--pull", "--no-cache"];

struct ParsedArgs {
    tags: Vec<String>,
    dockerfile: Option<String>,
    context_path: String,
    /// Every recognized cache-relevant flag/value pair, in canonical
    /// (sorted) form, used to build the fingerprint input.
    canonical_flags: Vec<(String, String)>,
}

fn flag_takes_value(arg: &str) -> bool {
    VALUE_FLAGS
        .iter()
        .any(|(short, long)| (!short.is_empty() && arg == *short) || (!long.is_empty() && arg == *long))
}

fn split_inline_value(arg: &str) -> Option<(&str, &str)> {
    arg.split_once('=')
}

fn parse_args(argv: &[String]) -> Result<ParsedArgs> {
    let mut tags = Vec::new();
    let mut dockerfile = None;
    let mut positionals = Vec::new();
    let mut canonical_flags = Vec::new();

    let mut iter = argv.iter().peekable();
    while let Some(arg) = iter.next() {
        if IGNORED_FLAGS.contains(&arg.as_str()) {
            continue;
        }

        if let Some((flag, value)) = split_inline_value(arg) {
            if flag_takes_value(flag) {
                record_flag(flag, value, &mut tags, &mut dockerfile, &mut canonical_flags);
                continue;
            }
        }

        if flag_takes_value(arg) {
            let value = iter
                .next()
                .ok_or_else(|| error::Error::UnsupportedCommand {
                    command: argv.to_vec(),
                })?;
            record_flag(arg, value, &mut tags, &mut dockerfile, &mut canonical_flags);
            continue;
        }

        if arg.starts_with('-') {
            // Unrecognized flag: preserve it in the fingerprint as a bare
            // marker so a change in unknown flags still invalidates cache,
            // without us pretending to understand its semantics.
            canonical_flags.push((arg.clone(), String::new()));
            continue;
        }

        positionals.push(arg.clone());
    }

    ensure!(
        positionals.len() <= 1,
        error::UnsupportedCommandSnafu {
            command: argv.to_vec(),
        }
    );

    let context_path = positionals.into_iter().next().unwrap_or_else(|| ".".to_string());

    canonical_flags.sort();
    Ok(ParsedArgs {
        tags,
        dockerfile,
        context_path,
        canonical_flags,
    })
}

fn record_flag(
    flag: &str,
    value: &str,
    tags: &mut Vec<String>,
    dockerfile: &mut Option<String>,
    canonical_flags: &mut Vec<(String, String)>,
) {
    match flag {
        "-t" | "--tag" => tags.push(value.to_string()),
        "-f" | "--file" => *dockerfile = Some(value.to_string()),
        "--progress" => {}
        other => canonical_flags.push((other.to_string(), value.to_string())),
    }
}

/// Parse a `docker build` / `docker buildx build` argv (with the leading
/// `build`/`buildx build` words already stripped) into a single-target
/// `ParsedCommand`.
pub fn parse(argv: &[String], cwd: &Path) -> Result<ParsedCommand> {
    let parsed = parse_args(argv)?;

    let tags: Vec<TagRef> = parsed
        .tags
        .iter()
        .map(|t| {
            TagRef::parse(t).ok_or_else(|| error::Error::InvalidTagReference {
                reference: t.clone(),
            })
        })
        .collect::<Result<_>>()?;

    let context_root = cwd.join(&parsed.context_path);
    let context_root = context_root.canonicalize().unwrap_or(context_root);

    let dockerfile_path = match &parsed.dockerfile {
        Some(path) => cwd.join(path),
        None => context_root.join("Dockerfile"),
    };
    let dockerfile_outside_context = dockerfile_path
        .canonicalize()
        .map(|p| !p.starts_with(&context_root))
        .unwrap_or(true);

    let ignore_path = context_root.join(IGNORE_FILE_NAME);
    let ignore_path = ignore_path.is_file().then_some(ignore_path);

    let files = enumerate_context_files(&context_root, ignore_path.as_deref())
        .context(error::ContextSnafu)?;
    let mut context = BuildContext::from_paths(&context_root, &files).context(error::ContextSnafu)?;

    if dockerfile_outside_context {
        let bytes = std::fs::read(&dockerfile_path).unwrap_or_default();
        context.insert_external("Dockerfile", bytes);
    }

    let target = BuildTarget {
        name: DEFAULT_TARGET.to_string(),
        tags,
        context,
    };

    let mut full_argv = vec!["build".to_string()];
    full_argv.extend(argv.iter().cloned());

    let flag_bytes = canonical_flag_bytes(argv)?;
    ParsedCommand::with_flag_bytes(vec![target], full_argv, flag_bytes)
}

/// Fold the canonicalized flag set into the bytes the fingerprinter hashes
/// alongside each target's tags. Exposed separately from `ParsedCommand`
/// since bake commands build this list differently per target.
pub(crate) fn canonical_flag_bytes(argv: &[String]) -> Result<Vec<u8>> {
    let parsed = parse_args(argv)?;
    let mut out = Vec::new();
    for (flag, value) in &parsed.canonical_flags {
        out.extend_from_slice(flag.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn parses_tag_and_context() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");

        let argv = vec!["-t".to_string(), "reg.local/app:v1".to_string(), ".".to_string()];
        let parsed = parse(&argv, dir.path()).unwrap();
        assert_eq!(parsed.targets.len(), 1);
        assert_eq!(parsed.targets[0].tags[0].to_string(), "reg.local/app:v1");
    }

    #[test]
    fn progress_and_pull_flags_do_not_affect_canonical_bytes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");

        let a = vec!["-t".to_string(), "reg.local/app:v1".to_string(), ".".to_string()];
        let b = vec![
            "-t".to_string(),
            "reg.local/app:v1".to_string(),
            "--progress".to_string(),
            "plain".to_string(),
            "--pull".to_string(),
            ".".to_string(),
        ];

        let flags_a = canonical_flag_bytes(&a).unwrap();
        let flags_b = canonical_flag_bytes(&b).unwrap();
        assert_eq!(flags_a, flags_b);
    }

    #[test]
    fn build_arg_changes_canonical_bytes() {
        let a = vec!["-t".to_string(), "reg.local/app:v1".to_string()];
        let b = vec![
            "-t".to_string(),
            "reg.local/app:v1".to_string(),
            "--build-arg".to_string(),
            "FOO=bar".to_string(),
        ];
        assert_ne!(canonical_flag_bytes(&a).unwrap(), canonical_flag_bytes(&b).unwrap());
    }

    #[test]
    fn dockerfile_outside_context_is_included_under_a_logical_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ctx/app.txt", "hi");
        write(dir.path(), "docker/Dockerfile", "FROM alpine\n");

        let argv = vec![
            "-t".to_string(),
            "reg.local/app:v1".to_string(),
            "-f".to_string(),
            "docker/Dockerfile".to_string(),
            "ctx".to_string(),
        ];
        let parsed = parse(&argv, dir.path()).unwrap();
        let names: Vec<&str> = parsed.targets[0].context.iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"Dockerfile"));
        assert!(names.contains(&"app.txt"));
    }
}
