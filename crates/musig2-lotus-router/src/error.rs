//! Router-level error taxonomy: channel/authority mismatches and malformed
//! envelopes. Cryptographic and session-lifecycle errors stay in
//! [`musig2_lotus_core::error::MusigError`]; this crate only adds the
//! concerns that are specific to message dispatch.

use thiserror::Error;

use crate::routing::MessageKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("message of kind {0:?} arrived on the wrong channel")]
    ChannelMismatch(MessageKind),

    #[error("message of kind {kind:?} requires authority {required:?}, sender has {actual:?}")]
    AuthorityViolation {
        kind: MessageKind,
        required: crate::routing::Authority,
        actual: crate::routing::Authority,
    },

    #[error("malformed envelope: {0}")]
    Malformed(String),
}
