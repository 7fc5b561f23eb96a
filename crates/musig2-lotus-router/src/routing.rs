//! Static message-kind -> (channel, authority, delivery) routing table.
//!
//! The engine never decides per-message where something goes or who's
//! allowed to send it; it asks this table. Keeping the policy here, rather
//! than scattered across dispatch match arms, is what lets
//! `AuthorityViolation`/`ChannelMismatch` be enforced uniformly before a
//! message kind is ever interpreted.

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    SignerAdvertisement,
    SignerUnavailable,
    SigningRequest,
    ParticipantJoined,
    SessionJoin,
    SessionReady,
    NonceCommit,
    NonceShare,
    NonceAck,
    NoncesComplete,
    PartialSigShare,
    PartialSigAck,
    PartialSigsComplete,
    SignatureFinalized,
    SessionAbort,
    ValidationError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Point-to-point, delivered in the order the sender sent them.
    Direct,
    /// Pub/sub topic; unordered, may be duplicated.
    Broadcast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authority {
    Any,
    Coordinator,
    Participant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    BestEffort,
    ReliableOrdered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub kind: MessageKind,
    pub channel: Channel,
    pub authority: Authority,
    pub delivery: Delivery,
}

/// Normative per §4.3. `SessionReady`/`SessionJoin` are direct because they
/// are addressed to a specific, already-known participant set; only
/// discovery-phase messages (advertisement, unavailability, signing
/// request) go out on the broadcast topic.
pub const ROUTING_TABLE: &[RouteEntry] = &[
    RouteEntry {
        kind: MessageKind::SignerAdvertisement,
        channel: Channel::Broadcast,
        authority: Authority::Any,
        delivery: Delivery::BestEffort,
    },
    RouteEntry {
        kind: MessageKind::SignerUnavailable,
        channel: Channel::Broadcast,
        authority: Authority::Any,
        delivery: Delivery::BestEffort,
    },
    RouteEntry {
        kind: MessageKind::SigningRequest,
        channel: Channel::Broadcast,
        authority: Authority::Any,
        delivery: Delivery::BestEffort,
    },
    RouteEntry {
        kind: MessageKind::ParticipantJoined,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::SessionJoin,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::SessionReady,
        channel: Channel::Direct,
        authority: Authority::Coordinator,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::NonceCommit,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::NonceShare,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::NonceAck,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::NoncesComplete,
        channel: Channel::Direct,
        authority: Authority::Coordinator,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::PartialSigShare,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::PartialSigAck,
        channel: Channel::Direct,
        authority: Authority::Participant,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::PartialSigsComplete,
        channel: Channel::Direct,
        authority: Authority::Coordinator,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::SignatureFinalized,
        channel: Channel::Direct,
        authority: Authority::Coordinator,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::SessionAbort,
        channel: Channel::Direct,
        authority: Authority::Any,
        delivery: Delivery::ReliableOrdered,
    },
    RouteEntry {
        kind: MessageKind::ValidationError,
        channel: Channel::Direct,
        authority: Authority::Any,
        delivery: Delivery::ReliableOrdered,
    },
];

fn entry_for(kind: MessageKind) -> &'static RouteEntry {
    ROUTING_TABLE
        .iter()
        .find(|e| e.kind == kind)
        .expect("ROUTING_TABLE covers every MessageKind variant")
}

pub fn is_direct(kind: MessageKind) -> bool {
    entry_for(kind).channel == Channel::Direct
}

pub fn is_broadcast(kind: MessageKind) -> bool {
    entry_for(kind).channel == Channel::Broadcast
}

pub fn authority_of(kind: MessageKind) -> Authority {
    entry_for(kind).authority
}

pub fn delivery_of(kind: MessageKind) -> Delivery {
    entry_for(kind).delivery
}

/// Confirms an inbound message arrived on the channel its kind mandates.
/// The engine calls this before acting on any dispatched message.
pub fn check_channel(kind: MessageKind, observed: Channel) -> Result<(), RouterError> {
    let expected = entry_for(kind).channel;
    if expected != observed {
        return Err(RouterError::ChannelMismatch(kind));
    }
    Ok(())
}

/// Confirms the sender's role is one the message kind's authority class
/// permits. `Authority::Any` always passes; `Coordinator`/`Participant`
/// require the observed role to match exactly (a coordinator is also a
/// participant in its own session, so callers pass `Participant` for a
/// plain participant and `Coordinator` only when the sender is this
/// session's elected coordinator).
pub fn check_authority(kind: MessageKind, sender: Authority) -> Result<(), RouterError> {
    let required = entry_for(kind).authority;
    let ok = match required {
        Authority::Any => true,
        Authority::Coordinator => matches!(sender, Authority::Coordinator),
        Authority::Participant => {
            matches!(sender, Authority::Participant | Authority::Coordinator)
        }
    };
    if !ok {
        return Err(RouterError::AuthorityViolation {
            kind,
            required,
            actual: sender,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_exactly_one_route_entry() {
        let kinds = [
            MessageKind::SignerAdvertisement,
            MessageKind::SignerUnavailable,
            MessageKind::SigningRequest,
            MessageKind::ParticipantJoined,
            MessageKind::SessionJoin,
            MessageKind::SessionReady,
            MessageKind::NonceCommit,
            MessageKind::NonceShare,
            MessageKind::NonceAck,
            MessageKind::NoncesComplete,
            MessageKind::PartialSigShare,
            MessageKind::PartialSigAck,
            MessageKind::PartialSigsComplete,
            MessageKind::SignatureFinalized,
            MessageKind::SessionAbort,
            MessageKind::ValidationError,
        ];
        for k in kinds {
            assert_eq!(ROUTING_TABLE.iter().filter(|e| e.kind == k).count(), 1);
        }
    }

    #[test]
    fn discovery_messages_are_broadcast_any() {
        assert!(is_broadcast(MessageKind::SigningRequest));
        assert_eq!(authority_of(MessageKind::SigningRequest), Authority::Any);
    }

    #[test]
    fn coordinator_only_messages_reject_plain_participant() {
        let err = check_authority(MessageKind::SessionReady, Authority::Participant);
        assert!(matches!(err, Err(RouterError::AuthorityViolation { .. })));
        assert!(check_authority(MessageKind::SessionReady, Authority::Coordinator).is_ok());
    }

    #[test]
    fn channel_mismatch_is_detected() {
        let err = check_channel(MessageKind::NonceShare, Channel::Broadcast);
        assert!(matches!(err, Err(RouterError::ChannelMismatch(_))));
    }
}
