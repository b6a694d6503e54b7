//! Group state core of the [Messaging Layer Security](https://www.rfc-editor.org/rfc/rfc9420.html)
//! protocol: key packages, the ratchet tree, the key schedule and the
//! per-epoch secret tree, tied together by [`group::Group`].

pub mod crypto;
pub mod extensibility;
pub mod framing;
pub mod group;
pub mod key_package;
pub mod key_schedule;
pub mod ratchet_tree;
pub mod secret_tree;
pub mod utilities;
