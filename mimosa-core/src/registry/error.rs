use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to build request for '{}': {}", reference, source))]
    BuildRequest {
        reference: String,
        source: reqwest::Error,
    },

    #[snafu(display("Request to '{}' failed: {}", reference, source))]
    Request {
        reference: String,
        source: reqwest::Error,
    },

    #[snafu(display(
        "Registry returned unexpected status {} for '{}'",
        status,
        reference
    ))]
    UnexpectedStatus { reference: String, status: u16 },

    #[snafu(display("Failed to read response body for '{}': {}", reference, source))]
    ReadBody {
        reference: String,
        source: reqwest::Error,
    },

    #[snafu(display("Manifest for '{}' is missing a Content-Type header", reference))]
    MissingContentType { reference: String },
}

pub type Result<T> = std::result::Result<T, Error>;
