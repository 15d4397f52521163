/*!
Parses a `docker build` / `docker buildx build` / `docker buildx bake`
invocation into the data the rest of mimosa needs: the tags a build would
produce, grouped by target, and the build context(s) behind them.

The two concrete command shapes live in their own submodules; this module
holds the shared result type, the reference value types, and the
push-directive gate the dispatcher consults before doing anything else.
*/
pub mod bake;
pub mod build;
pub mod error;
pub mod reference;

use crate::context::BuildContext;
use error::{MissingTagSnafu, Result};
pub use reference::{RepositoryRef, TagRef};
use snafu::ensure;

/// A single Dockerfile-and-context pairing along with the tags it produces.
/// For a plain `docker build` there is exactly one target, named `"default"`.
/// For `docker buildx bake` there is one entry per bake target.
#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub name: String,
    pub tags: Vec<TagRef>,
    pub context: BuildContext,
}

/// The result of parsing a build command: one or more targets sharing a
/// single fingerprint, plus the original argv the dispatcher falls back to
/// running verbatim.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub targets: Vec<BuildTarget>,
    pub argv: Vec<String>,
    /// Cache-relevant flag bytes (build args, platform, labels, ...) that
    /// don't belong to any single target, folded into the fingerprint
    /// alongside each target's name.
    pub flag_bytes: Vec<u8>,
}

impl ParsedCommand {
    /// Validate the invariants every parsed command must satisfy: at least
    /// one tag overall, and every target's tags sharing one repository.
    pub(crate) fn new(targets: Vec<BuildTarget>, argv: Vec<String>) -> Result<Self> {
        Self::with_flag_bytes(targets, argv, Vec::new())
    }

    pub(crate) fn with_flag_bytes(
        targets: Vec<BuildTarget>,
        argv: Vec<String>,
        flag_bytes: Vec<u8>,
    ) -> Result<Self> {
        let has_any_tag = targets.iter().any(|t| !t.tags.is_empty());
        ensure!(has_any_tag, MissingTagSnafu);

        for target in &targets {
            let mut tags = target.tags.iter();
            if let Some(first) = tags.next() {
                for other in tags {
                    ensure!(
                        first.same_repository(other),
                        error::CrossRepoTagsSnafu {
                            target: target.name.clone(),
                            first: first.repository_ref().to_string(),
                            other: other.repository_ref().to_string(),
                        }
                    );
                }
            }
        }

        Ok(Self {
            targets,
            argv,
            flag_bytes,
        })
    }

    /// The canonical bytes fed to the fingerprinter: every target's name,
    /// joined deterministically, plus the cache-relevant flag bytes. Tag
    /// values never participate here: the hash identifies *content*, and a
    /// requested tag is just where the result gets published, not what
    /// produced it — `docker build -t app:v1 .` and the same command with
    /// `-t app:v2` must fingerprint identically so a later run under a new
    /// tag can still hit the marker an earlier run saved. Tags stay on
    /// `BuildTarget`/`ParsedCommand` for the registry-cache layer, which is
    /// the only place they're needed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut targets = self.targets.clone();
        targets.sort_by(|a, b| a.name.cmp(&b.name));

        for target in &targets {
            out.extend_from_slice(target.name.as_bytes());
            out.push(0xff);
        }

        out.extend_from_slice(&self.flag_bytes);
        out
    }

    pub fn all_tags(&self) -> impl Iterator<Item = &TagRef> {
        self.targets.iter().flat_map(|t| t.tags.iter())
    }
}

/// True if the argv requests that the build result be pushed to a registry:
/// a bare `--push`, or a buildx `--output` whose value contains
/// `type=registry` or `push=true`. Only the raw CLI argv is inspected here;
/// a bake file's own per-target `push`/`output` settings are not read.
/// Builds that do not push are not a fit for this tool at all per the scope
/// note in the dispatch design: everything here only ever makes sense for
/// pushed builds, but we still gate explicitly rather than assume.
pub fn has_push_directive(argv: &[String]) -> bool {
    let mut iter = argv.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--push" {
            return true;
        }
        if let Some(value) = arg.strip_prefix("--output=") {
            if output_pushes(value) {
                return true;
            }
        } else if arg == "--output" || arg == "-o" {
            if let Some(value) = iter.peek() {
                if output_pushes(value) {
                    return true;
                }
            }
        }
    }
    false
}

fn output_pushes(value: &str) -> bool {
    value
        .split(',')
        .any(|kv| kv.trim() == "type=registry" || kv.trim() == "push=true")
}


#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, tags: &[&str]) -> BuildTarget {
        BuildTarget {
            name: name.to_string(),
            tags: tags.iter().map(|t| TagRef::parse(t).unwrap()).collect(),
            context: BuildContext::new(),
        }
    }

    #[test]
    fn rejects_a_command_with_no_tags_at_all() {
        let targets = vec![BuildTarget {
            name: "default".to_string(),
            tags: vec![],
            context: BuildContext::new(),
        }];
        let err = ParsedCommand::new(targets, vec![]).unwrap_err();
        assert!(matches!(err, error::Error::MissingTag));
    }

    #[test]
    fn rejects_cross_repository_tags_on_one_target() {
        let targets = vec![target("default", &["reg.local/app:v1", "reg.local/other:v1"])];
        let err = ParsedCommand::new(targets, vec![]).unwrap_err();
        assert!(matches!(err, error::Error::CrossRepoTags { .. }));
    }

    #[test]
    fn accepts_multiple_tags_sharing_one_repository() {
        let targets = vec![target("default", &["reg.local/app:v1", "reg.local/app:latest"])];
        assert!(ParsedCommand::new(targets, vec![]).is_ok());
    }

    #[test]
    fn canonical_bytes_are_tag_order_independent() {
        let a = ParsedCommand::new(vec![target("default", &["reg.local/app:v1", "reg.local/app:v2"])], vec![]).unwrap();
        let b = ParsedCommand::new(vec![target("default", &["reg.local/app:v2", "reg.local/app:v1"])], vec![]).unwrap();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn canonical_bytes_do_not_depend_on_the_requested_tag_value() {
        let a = ParsedCommand::new(vec![target("default", &["reg.local/app:v1"])], vec![]).unwrap();
        let b = ParsedCommand::new(vec![target("default", &["reg.local/app:v2"])], vec![]).unwrap();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn push_directive_detects_flag_and_output_forms() {
        assert!(has_push_directive(&["build".into(), "--push".into()]));
        assert!(has_push_directive(&[
            "buildx".into(),
            "build".into(),
            "--output=type=registry".into()
        ]));
        assert!(has_push_directive(&[
            "buildx".into(),
            "build".into(),
            "--output".into(),
            "type=registry,dest=foo".into()
        ]));
        assert!(!has_push_directive(&["build".into(), "-t".into(), "app:v1".into()]));
    }
}
