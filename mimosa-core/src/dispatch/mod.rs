/*!
The orchestrator: takes one invocation's argv, decides whether it is
cacheable, and drives it through lookup/retag or build/save.

State machine (`spec.md` §4.F, unchanged here):

```text
Start -> ParseArgs -> (HasPushDirective?) -> LookupCache -> Decide -> {Retag | RunBuild -> SaveMarkers} -> Report
                                              \_ error _/
```

Every pre-build error (parse, lookup, retag) falls back to running the
user's original command unchanged before propagating the error upward; a
post-build save failure is logged and never changes the exit code, since the
user's build already succeeded.
*/
pub mod error;

use crate::context::BuildContext;
use crate::fingerprint::fingerprint;
use crate::parse::{bake, build, has_push_directive, ParsedCommand};
use crate::registry::cache;
use crate::registry::RegistryClient;
use async_trait::async_trait;
use duct::cmd;
use error::Result;
use log::{info, warn};
use snafu::ResultExt;
use std::path::Path;

/// The injected collaborator that actually runs the (non-cached) build. A
/// trait so tests can substitute a fake without shelling out, modeled on the
/// `docker()` helper in `buildsys`'s builder: capture combined output, log
/// it, hand back the exit code rather than panicking on a nonzero status.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    async fn run(&self, dry_run: bool, argv: &[String]) -> std::io::Result<i32>;
}

/// Shells out to the real Docker CLI, in the spirit of `buildsys::builder`'s
/// `docker()`: stderr is folded into stdout, the combined output is logged,
/// and the exit code is returned as data rather than turned into an error.
#[derive(Debug, Default)]
pub struct DuctRunner;

#[async_trait]
impl Runner for DuctRunner {
    async fn run(&self, dry_run: bool, argv: &[String]) -> std::io::Result<i32> {
        if dry_run {
            info!("dry-run: would execute `docker {}`", argv.join(" "));
            return Ok(0);
        }

        let output = cmd("docker", argv)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        println!("{stdout}");

        Ok(output.status.code().unwrap_or(1))
    }
}

/// The end state of one dispatch pass: whether the cache was hit, and the
/// exit code the host process should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub cache_hit: bool,
    pub exit_code: i32,
}

impl Outcome {
    /// The machine-readable line emitted on the clean output channel.
    pub fn report_line(&self) -> String {
        format!("mimosa-cache-hit: {}", self.cache_hit)
    }
}

/// Split a raw argv (after an optional leading `docker`) into its command
/// kind and the remainder to hand to the matching parser.
enum CommandKind<'a> {
    Build(&'a [String]),
    Bake(&'a [String]),
}

fn classify(argv: &[String]) -> std::result::Result<CommandKind<'_>, crate::parse::error::Error> {
    let argv = match argv.first().map(String::as_str) {
        Some("docker") => &argv[1..],
        _ => argv,
    };

    match argv.first().map(String::as_str) {
        Some("build") => Ok(CommandKind::Build(&argv[1..])),
        Some("buildx") => match argv.get(1).map(String::as_str) {
            Some("build") => Ok(CommandKind::Build(&argv[2..])),
            Some("bake") => Ok(CommandKind::Bake(&argv[2..])),
            _ => crate::parse::error::UnsupportedCommandSnafu {
                command: argv.to_vec(),
            }
            .fail(),
        },
        _ => crate::parse::error::UnsupportedCommandSnafu {
            command: argv.to_vec(),
        }
        .fail(),
    }
}

/// Parse the raw argv, leaving the error unconverted: the caller runs the
/// plain-execution fallback before deciding how to report the failure.
fn parse_command(
    argv: &[String],
    cwd: &Path,
) -> std::result::Result<ParsedCommand, crate::parse::error::Error> {
    match classify(argv)? {
        CommandKind::Build(rest) => build::parse(rest, cwd),
        CommandKind::Bake(rest) => bake::parse(rest, cwd),
    }
}

fn targets_by_name(parsed: &ParsedCommand) -> Vec<(String, Vec<crate::parse::TagRef>)> {
    parsed
        .targets
        .iter()
        .map(|t| (t.name.clone(), t.tags.clone()))
        .collect()
}

/// Run one invocation through the full state machine.
pub async fn dispatch(
    registry: &dyn RegistryClient,
    runner: &dyn Runner,
    argv: &[String],
    cwd: &Path,
    dry_run: bool,
) -> Result<Outcome> {
    if !has_push_directive(argv) {
        warn!("no push directive in command, bypassing cache: {}", argv.join(" "));
        let exit_code = runner.run(dry_run, argv).await.context(error::RunnerErrorSnafu)?;
        let outcome = Outcome {
            cache_hit: false,
            exit_code,
        };
        println!("{}", outcome.report_line());
        return Ok(outcome);
    }

    let parsed = match parse_command(argv, cwd) {
        Ok(p) => p,
        Err(source) => {
            warn!("parse failed, falling back to plain execution: {}", source);
            let exit_code = runner.run(dry_run, argv).await.context(error::RunnerErrorSnafu)?;
            return Err(error::Error::Parse { source, exit_code });
        }
    };

    let hash = fingerprint(&parsed.canonical_bytes(), &merged_context(&parsed));
    let targets = targets_by_name(&parsed);

    let (hit, pairs) = match cache::exists(registry, &hash, &targets).await {
        Ok(v) => v,
        Err(source) => {
            warn!("cache lookup failed, falling back to plain execution: {}", source);
            let exit_code = runner.run(dry_run, &parsed.argv).await.context(error::RunnerErrorSnafu)?;
            return Err(error::Error::Lookup { source, exit_code });
        }
    };

    if hit {
        if let Err(source) = cache::retag_from_cache_tags(registry, &pairs, dry_run).await {
            warn!("retag failed, falling back to plain execution: {}", source);
            let exit_code = runner.run(dry_run, &parsed.argv).await.context(error::RunnerErrorSnafu)?;
            return Err(error::Error::Retag { source, exit_code });
        }

        let outcome = Outcome {
            cache_hit: true,
            exit_code: 0,
        };
        println!("{}", outcome.report_line());
        return Ok(outcome);
    }

    let exit_code = runner.run(dry_run, &parsed.argv).await.context(error::RunnerErrorSnafu)?;
    if exit_code != 0 {
        return error::RunnerFailedSnafu { code: exit_code }.fail();
    }

    if let Err(e) = cache::save_cache_tags(registry, &hash, &targets, dry_run).await {
        warn!("failed to save cache markers (build already succeeded): {}", e);
    }

    let outcome = Outcome {
        cache_hit: false,
        exit_code: 0,
    };
    println!("{}", outcome.report_line());
    Ok(outcome)
}

/// Fold every target's context into one combined context for fingerprinting:
/// a bake invocation's targets can share files, and the spec requires one
/// shared hash across the whole bake, not one per target.
fn merged_context(parsed: &ParsedCommand) -> BuildContext {
    let mut merged = BuildContext::new();
    for target in &parsed.targets {
        for (path, contents) in target.context.iter() {
            merged.insert_external(format!("{}\0{}", target.name, path), contents.to_vec());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Manifest;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeRegistry {
        manifests: Mutex<HashMap<String, Manifest>>,
    }

    impl FakeRegistry {
        fn seed(&self, reference: &str, body: &str) {
            self.manifests.lock().unwrap().insert(
                reference.to_string(),
                Manifest {
                    media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
                    bytes: body.as_bytes().to_vec(),
                },
            );
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn exists(&self, reference: &crate::parse::TagRef) -> crate::registry::error::Result<bool> {
            Ok(self.manifests.lock().unwrap().contains_key(&reference.to_string()))
        }

        async fn get_manifest(
            &self,
            reference: &crate::parse::TagRef,
        ) -> crate::registry::error::Result<Manifest> {
            self.manifests
                .lock()
                .unwrap()
                .get(&reference.to_string())
                .cloned()
                .ok_or_else(|| crate::registry::error::Error::UnexpectedStatus {
                    reference: reference.to_string(),
                    status: 404,
                })
        }

        async fn put_manifest(
            &self,
            reference: &crate::parse::TagRef,
            manifest: &Manifest,
        ) -> crate::registry::error::Result<()> {
            self.manifests
                .lock()
                .unwrap()
                .insert(reference.to_string(), manifest.clone());
            Ok(())
        }

        async fn delete_manifest(&self, reference: &crate::parse::TagRef) -> crate::registry::error::Result<()> {
            self.manifests.lock().unwrap().remove(&reference.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        invoked: Mutex<bool>,
    }

    #[async_trait]
    impl Runner for FakeRunner {
        async fn run(&self, _dry_run: bool, _argv: &[String]) -> std::io::Result<i32> {
            *self.invoked.lock().unwrap() = true;
            Ok(0)
        }
    }

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn no_push_directive_bypasses_cache_entirely() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");
        let registry = FakeRegistry::default();
        let runner = FakeRunner::default();

        let argv: Vec<String> = vec!["build", "-t", "reg.local/app:v1", "."]
            .into_iter()
            .map(String::from)
            .collect();
        let outcome = dispatch(&registry, &runner, &argv, dir.path(), false).await.unwrap();

        assert!(!outcome.cache_hit);
        assert_eq!(outcome.exit_code, 0);
        assert!(*runner.invoked.lock().unwrap());
    }

    #[tokio::test]
    async fn miss_runs_build_and_saves_marker() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");
        let registry = FakeRegistry::default();
        registry.seed("reg.local/app:v1", "manifest-bytes");
        let runner = FakeRunner::default();

        let argv: Vec<String> = vec!["buildx", "build", "--push", "-t", "reg.local/app:v1", "."]
            .into_iter()
            .map(String::from)
            .collect();
        let outcome = dispatch(&registry, &runner, &argv, dir.path(), false).await.unwrap();

        assert!(!outcome.cache_hit);
        assert!(*runner.invoked.lock().unwrap());
        assert!(registry
            .manifests
            .lock()
            .unwrap()
            .keys()
            .any(|k| k.contains("mimosa-content-hash-")));
    }

    #[tokio::test]
    async fn hit_retags_without_invoking_runner() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");
        let registry = FakeRegistry::default();

        let argv: Vec<String> = vec!["buildx", "build", "--push", "-t", "reg.local/app:v1", "."]
            .into_iter()
            .map(String::from)
            .collect();
        let parsed = build::parse(&argv[2..], dir.path()).unwrap();
        let hash = fingerprint(&parsed.canonical_bytes(), &merged_context(&parsed));
        registry.seed(&format!("reg.local/app:mimosa-content-hash-{hash}"), "manifest-bytes");

        let runner = FakeRunner::default();
        let outcome = dispatch(&registry, &runner, &argv, dir.path(), false).await.unwrap();

        assert!(outcome.cache_hit);
        assert!(!*runner.invoked.lock().unwrap());
        assert!(registry.manifests.lock().unwrap().contains_key("reg.local/app:v1"));
    }
}
