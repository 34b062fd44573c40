//! Write-through mirroring of HTTP responses
//!
//! A [`Mirror`] sits in front of another [`Handler`]. For every `GET` it
//! resolves the request path under the configured root, opens a
//! [`PendingFile`] next to the target and wraps the response in a
//! [`MirrorWriter`]. Body bytes reach the client and the pending file
//! together. The mirror is renamed over the target only once a complete
//! `200 OK` body has been written; anything else leaves the target as it
//! was and no temp file behind.
//!
//! ```text
//! Request ─▶ Mirror ─▶ next Handler
//!              │            │ write_header / write
//!              ▼            ▼
//!         PendingFile ◀─ MirrorWriter ─▶ client
//!              │ complete()
//!              ▼
//!           <root>/<path>  (+ sidecars)
//! ```

pub mod diagnostic;
pub mod digest;
pub mod handler;
pub mod path;
pub mod pending;
pub mod sidecar;
pub mod validate;
pub mod writer;

pub use diagnostic::{Diagnostic, Diagnostics};
pub use digest::{ContentDigest, ContentHasher};
pub use handler::{Disposition, Handler, Mirror, Placeholders, Replacer, Skip};
pub use pending::{PendingFile, PendingState};
pub use sidecar::{SidecarRecord, SidecarWriter};
pub use validate::MirrorEntry;
pub use writer::{MirrorOutcome, MirrorWriter, ResponseWriter, StreamResponse};
