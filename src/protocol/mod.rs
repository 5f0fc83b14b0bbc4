//! Protocol logic for the Consul HTTP API.
//!
//! Everything in this module is pure: no I/O, no shared state. The request
//! pipeline and the endpoint wrappers build on these functions.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`constants`] | Header names, parameter names, defaults |
//! | [`address`] | Agent address resolution |
//! | [`meta`] | `X-Consul-*` response metadata |
//! | [`status`] | Status code to error taxonomy |
//! | [`consistency`] | Consistency mode precedence |
//! | [`duration`] | Go-style duration strings |

pub mod address;
pub mod consistency;
pub mod constants;
pub mod duration;
pub mod meta;
pub mod status;

pub use address::{resolve_address, Address, AddressSpec, Protocol};
pub use consistency::{apply_consistency, resolve_consistency};
pub use duration::{format_duration, parse_duration};
pub use meta::{is_hidden, ResponseMeta};
pub use status::render;
