/*!
Core library behind the `mimosa` build-cache wrapper: fingerprints a
`docker build` / `docker buildx build` / `docker buildx bake` invocation and
maps it onto OCI registry tags, so a build whose command and context are
unchanged can be served by retagging an image that was pushed before instead
of running the build tool again.

This crate owns everything except the host CLI's flag parsing and process
exit handling; see the `mimosa` binary crate for that thin front end.
*/
pub mod context;
pub mod dispatch;
pub mod fingerprint;
pub mod ignore;
pub mod parse;
pub mod registry;

pub use dispatch::{dispatch, DuctRunner, Outcome, Runner};
pub use fingerprint::{fingerprint, Fingerprint};
pub use registry::{HttpRegistryClient, RegistryClient};
