/*!
Parses `docker buildx bake` invocations: locates the bake definition file
(HCL, Compose YAML, or plain JSON), resolves each named target's tags,
context, Dockerfile and build args, and produces one `BuildTarget` per bake
target sharing a single fingerprint.

Format support is tiered by how much of the corpus's dependency stack
actually understands it: `docker-bake.json` and `docker-compose.yml` parse
with `serde_json`/`serde_yaml`, both already present for other config needs;
`docker-bake.hcl` gets a small hand-written block scanner, since no crate in
this dependency set understands HCL.
*/
use super::error::{self, Result};
use super::reference::TagRef;
use super::{BuildTarget, ParsedCommand};
use crate::context::{enumerate_context_files, BuildContext};
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const IGNORE_FILE_NAME: &str = ".dockerignore";
const DEFAULT_CANDIDATES: &[&str] = &["docker-bake.hcl", "docker-compose.yml", "docker-bake.json"];

#[derive(Debug, Clone, Default)]
struct BakeTarget {
    tags: Vec<String>,
    context: String,
    dockerfile: Option<String>,
    args: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct BakeFile {
    targets: BTreeMap<String, BakeTarget>,
}

/// Locate the bake file to use: an explicit `-f`/`--file` argument, or the
/// first of the default candidates that exists in `cwd`.
fn locate_bake_file(explicit: Option<&str>, cwd: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(cwd.join(path));
    }

    for candidate in DEFAULT_CANDIDATES {
        let path = cwd.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }

    error::NoBakeFileFoundSnafu {
        candidates: DEFAULT_CANDIDATES.iter().map(|c| cwd.join(c)).collect::<Vec<_>>(),
    }
    .fail()
}

fn load_bake_file(path: &Path) -> Result<BakeFile> {
    let contents = std::fs::read_to_string(path).context(error::BakeFileUnreadableSnafu { path })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json(&contents, path),
        Some("yml") | Some("yaml") => parse_compose_yaml(&contents, path),
        Some("hcl") => parse_hcl(&contents, path),
        _ => parse_hcl(&contents, path),
    }
}

#[derive(Debug, Deserialize)]
struct JsonBakeFile {
    #[serde(default)]
    target: BTreeMap<String, JsonBakeTarget>,
}

#[derive(Debug, Deserialize, Default)]
struct JsonBakeTarget {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    dockerfile: Option<String>,
    #[serde(default)]
    args: BTreeMap<String, String>,
}

fn parse_json(contents: &str, path: &Path) -> Result<BakeFile> {
    let parsed: JsonBakeFile = serde_json::from_str(contents).map_err(|e| error::Error::BakeFileParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut targets = BTreeMap::new();
    for (name, t) in parsed.target {
        targets.insert(
            name,
            BakeTarget {
                tags: t.tags,
                context: t.context.unwrap_or_else(|| ".".to_string()),
                dockerfile: t.dockerfile,
                args: t.args,
            },
        );
    }
    Ok(BakeFile { targets })
}

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Deserialize, Default)]
struct ComposeService {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    build: Option<ComposeBuild>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum ComposeBuild {
    #[default]
    None,
    Simple(String),
    Detailed {
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        dockerfile: Option<String>,
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
}

fn parse_compose_yaml(contents: &str, path: &Path) -> Result<BakeFile> {
    let parsed: ComposeFile = serde_yaml::from_str(contents).map_err(|e| error::Error::BakeFileParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut targets = BTreeMap::new();
    for (name, service) in parsed.services {
        let mut tags = Vec::new();
        if let Some(image) = service.image {
            tags.push(image);
        }

        let (context, dockerfile, args) = match service.build {
            Some(ComposeBuild::Simple(ctx)) => (ctx, None, BTreeMap::new()),
            Some(ComposeBuild::Detailed {
                context,
                dockerfile,
                args,
            }) => (context.unwrap_or_else(|| ".".to_string()), dockerfile, args),
            Some(ComposeBuild::None) | None => (".".to_string(), None, BTreeMap::new()),
        };

        targets.insert(
            name,
            BakeTarget {
                tags,
                context,
                dockerfile,
                args,
            },
        );
    }
    Ok(BakeFile { targets })
}

/// A minimal scanner for the subset of HCL used by `docker-bake.hcl` files:
/// `target "name" { tags = [...]; context = "..."; dockerfile = "..."; args
/// = { KEY = "value" } }`. Block bodies are found by brace matching; each
/// recognized attribute is extracted with a line-oriented regex rather than
/// a general HCL expression evaluator, which this dependency set has no
/// crate for.
fn parse_hcl(contents: &str, path: &Path) -> Result<BakeFile> {
    use regex::Regex;

    let target_header = Regex::new(r#"target\s+"([^"]+)"\s*\{"#).unwrap();
    let tags_re = Regex::new(r#"tags\s*=\s*\[([^\]]*)\]"#).unwrap();
    let string_field_re = |field: &str| {
        Regex::new(&format!(r#"{field}\s*=\s*"([^"]*)""#)).unwrap()
    };
    let context_re = string_field_re("context");
    let dockerfile_re = string_field_re("dockerfile");
    let args_block_re = Regex::new(r"args\s*=\s*\{([^}]*)\}").unwrap();
    let arg_entry_re = Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).unwrap();
    let string_item_re = Regex::new(r#""([^"]*)""#).unwrap();

    let mut targets = BTreeMap::new();

    for header in target_header.captures_iter(contents) {
        let name = header[1].to_string();
        let start = header.get(0).unwrap().end();
        let body = extract_block_body(contents, start).ok_or_else(|| error::Error::BakeFileParse {
            path: path.to_path_buf(),
            message: format!("unterminated target block '{name}'"),
        })?;

        let tags = tags_re
            .captures(body)
            .map(|c| {
                string_item_re
                    .captures_iter(&c[1])
                    .map(|m| m[1].to_string())
                    .collect()
            })
            .unwrap_or_default();

        let context = context_re
            .captures(body)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| ".".to_string());
        let dockerfile = dockerfile_re.captures(body).map(|c| c[1].to_string());

        let mut args = BTreeMap::new();
        if let Some(block) = args_block_re.captures(body) {
            for entry in arg_entry_re.captures_iter(&block[1]) {
                args.insert(entry[1].to_string(), entry[2].to_string());
            }
        }

        targets.insert(
            name,
            BakeTarget {
                tags,
                context,
                dockerfile,
                args,
            },
        );
    }

    Ok(BakeFile { targets })
}

/// Given the index just past an opening `{`, find the matching `}` and
/// return the slice between them.
fn extract_block_body(contents: &str, open_index: usize) -> Option<&str> {
    let bytes = contents.as_bytes();
    let mut depth = 1i32;
    let mut i = open_index;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&contents[open_index..i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parse a `docker buildx bake [TARGET...]` argv (with the leading
/// `buildx bake` words already stripped) into a multi-target
/// `ParsedCommand`.
pub fn parse(argv: &[String], cwd: &Path) -> Result<ParsedCommand> {
    let mut explicit_file = None;
    let mut requested_targets = Vec::new();

    let mut iter = argv.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-f" | "--file" => {
                explicit_file = iter.next().map(|s| s.as_str());
            }
            other if other.starts_with("--file=") => {
                explicit_file = Some(&other["--file=".len()..]);
            }
            other if !other.starts_with('-') => requested_targets.push(other.to_string()),
            _ => {}
        }
    }

    let bake_path = locate_bake_file(explicit_file, cwd)?;
    let bake_file = load_bake_file(&bake_path)?;

    let names: Vec<String> = if requested_targets.is_empty() {
        bake_file.targets.keys().cloned().collect()
    } else {
        requested_targets
    };

    let mut build_targets = Vec::new();
    let mut flag_bytes = Vec::new();

    for name in &names {
        let bt = bake_file
            .targets
            .get(name)
            .ok_or_else(|| error::Error::UnknownBakeTarget { target: name.clone() })?;

        let tags: Vec<TagRef> = bt
            .tags
            .iter()
            .map(|t| {
                TagRef::parse(t).ok_or_else(|| error::Error::InvalidTagReference { reference: t.clone() })
            })
            .collect::<Result<_>>()?;

        let context_root = cwd.join(&bt.context);
        let context_root = context_root.canonicalize().unwrap_or(context_root);

        let ignore_path = context_root.join(IGNORE_FILE_NAME);
        let ignore_path = ignore_path.is_file().then_some(ignore_path);

        let files = enumerate_context_files(&context_root, ignore_path.as_deref())
            .context(error::ContextSnafu)?;
        let mut context = BuildContext::from_paths(&context_root, &files).context(error::ContextSnafu)?;

        if let Some(dockerfile) = &bt.dockerfile {
            let dockerfile_path = cwd.join(dockerfile);
            let outside = dockerfile_path
                .canonicalize()
                .map(|p| !p.starts_with(&context_root))
                .unwrap_or(true);
            if outside {
                let bytes = std::fs::read(&dockerfile_path).unwrap_or_default();
                context.insert_external("Dockerfile", bytes);
            }
        }

        flag_bytes.extend_from_slice(name.as_bytes());
        let mut arg_pairs: Vec<(&String, &String)> = bt.args.iter().collect();
        arg_pairs.sort();
        for (k, v) in arg_pairs {
            flag_bytes.extend_from_slice(k.as_bytes());
            flag_bytes.push(b'=');
            flag_bytes.extend_from_slice(v.as_bytes());
            flag_bytes.push(0);
        }
        flag_bytes.push(0xff);

        build_targets.push(BuildTarget {
            name: name.clone(),
            tags,
            context,
        });
    }

    let mut full_argv = vec!["buildx".to_string(), "bake".to_string()];
    full_argv.extend(argv.iter().cloned());

    ParsedCommand::with_flag_bytes(build_targets, full_argv, flag_bytes)
}
