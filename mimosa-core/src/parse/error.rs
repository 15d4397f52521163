use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unsupported command shape: '{}'", command.join(" ")))]
    UnsupportedCommand { command: Vec<String> },

    #[snafu(display("At least one -t/--tag is required"))]
    MissingTag,

    #[snafu(display(
        "All tags for target '{}' must share one repository, found '{}' and '{}'",
        target,
        first,
        other
    ))]
    CrossRepoTags {
        target: String,
        first: String,
        other: String,
    },

    #[snafu(display("Invalid tag reference '{}'", reference))]
    InvalidTagReference { reference: String },

    #[snafu(display("Failed to read bake file '{}': {}", path.display(), source))]
    BakeFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("No bake definition file found (looked for {:?})", candidates))]
    NoBakeFileFound { candidates: Vec<PathBuf> },

    #[snafu(display("Failed to parse bake file '{}': {}", path.display(), message))]
    BakeFileParse { path: PathBuf, message: String },

    #[snafu(display("Unknown bake target '{}'", target))]
    UnknownBakeTarget { target: String },

    #[snafu(display("Failed to enumerate build context: {}", source))]
    Context { source: crate::context::error::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
