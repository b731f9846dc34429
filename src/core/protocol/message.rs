// src/core/protocol/message.rs

//! The CitrineDB message catalog and the binary encoding of each payload.
//!
//! Every message maps to a one-byte command discriminant on the wire; the
//! payload layout is message-specific. Strings are encoded as a `u16`
//! little-endian length followed by UTF-8 bytes, blobs as a `u32` length
//! followed by raw bytes, and optional values as a presence byte.

use crate::core::errors::CitrineError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

// Protocol-level limit to prevent pathological allocations from a malformed
// event-count prefix.
const MAX_EVENTS_PER_MESSAGE: usize = 4_096;

/// Wire command discriminants.
pub mod command {
    pub const HEARTBEAT_REQUEST: u8 = 0x01;
    pub const HEARTBEAT_RESPONSE: u8 = 0x02;
    pub const PING: u8 = 0x03;
    pub const PONG: u8 = 0x04;

    pub const AUTHENTICATE: u8 = 0x10;
    pub const AUTHENTICATED: u8 = 0x11;
    pub const NOT_AUTHENTICATED: u8 = 0x12;

    pub const WRITE_EVENTS: u8 = 0x20;
    pub const WRITE_EVENTS_COMPLETED: u8 = 0x21;
    pub const TRANSACTION_START: u8 = 0x22;
    pub const TRANSACTION_START_COMPLETED: u8 = 0x23;
    pub const TRANSACTION_WRITE: u8 = 0x24;
    pub const TRANSACTION_WRITE_COMPLETED: u8 = 0x25;
    pub const TRANSACTION_COMMIT: u8 = 0x26;
    pub const TRANSACTION_COMMIT_COMPLETED: u8 = 0x27;

    pub const READ_EVENT: u8 = 0x30;
    pub const READ_EVENT_COMPLETED: u8 = 0x31;

    pub const SUBSCRIBE_TO_STREAM: u8 = 0x40;
    pub const SUBSCRIBE_COMPLETED: u8 = 0x41;
    pub const UNSUBSCRIBE: u8 = 0x42;
    pub const UNSUBSCRIBE_COMPLETED: u8 = 0x43;
    pub const STREAM_EVENT_APPEARED: u8 = 0x44;
    pub const SUBSCRIPTION_DROPPED: u8 = 0x45;

    pub const CONNECT_TO_PERSISTENT_SUBSCRIPTION: u8 = 0x50;
    pub const PERSISTENT_SUBSCRIPTION_CONFIRMATION: u8 = 0x51;
    pub const PERSISTENT_SUBSCRIPTION_EVENT_APPEARED: u8 = 0x52;
    pub const PERSISTENT_SUBSCRIPTION_ACK: u8 = 0x53;
    pub const PERSISTENT_SUBSCRIPTION_NAK: u8 = 0x54;

    pub const BAD_REQUEST: u8 = 0xF0;
    pub const NOT_HANDLED: u8 = 0xF1;
}

/// An event as submitted by a writer, before the server has assigned it a
/// position in a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Bytes,
    pub metadata: Bytes,
}

/// An event as recorded by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub stream: String,
    pub event_number: u64,
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Bytes,
    pub metadata: Bytes,
}

/// Outcome of a write-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Success,
    PrepareTimeout,
    CommitTimeout,
    WrongExpectedVersion,
    StreamDeleted,
    InvalidTransaction,
    AccessDenied,
}

impl OperationResult {
    pub fn as_u8(self) -> u8 {
        match self {
            OperationResult::Success => 0,
            OperationResult::PrepareTimeout => 1,
            OperationResult::CommitTimeout => 2,
            OperationResult::WrongExpectedVersion => 3,
            OperationResult::StreamDeleted => 4,
            OperationResult::InvalidTransaction => 5,
            OperationResult::AccessDenied => 6,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, CitrineError> {
        match value {
            0 => Ok(OperationResult::Success),
            1 => Ok(OperationResult::PrepareTimeout),
            2 => Ok(OperationResult::CommitTimeout),
            3 => Ok(OperationResult::WrongExpectedVersion),
            4 => Ok(OperationResult::StreamDeleted),
            5 => Ok(OperationResult::InvalidTransaction),
            6 => Ok(OperationResult::AccessDenied),
            other => Err(CitrineError::Decode(format!(
                "unknown operation result {other}"
            ))),
        }
    }
}

/// Outcome of a single-event read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEventResult {
    Success,
    NotFound,
    NoStream,
    StreamDeleted,
    Error,
    AccessDenied,
}

impl ReadEventResult {
    pub fn as_u8(self) -> u8 {
        match self {
            ReadEventResult::Success => 0,
            ReadEventResult::NotFound => 1,
            ReadEventResult::NoStream => 2,
            ReadEventResult::StreamDeleted => 3,
            ReadEventResult::Error => 4,
            ReadEventResult::AccessDenied => 5,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, CitrineError> {
        match value {
            0 => Ok(ReadEventResult::Success),
            1 => Ok(ReadEventResult::NotFound),
            2 => Ok(ReadEventResult::NoStream),
            3 => Ok(ReadEventResult::StreamDeleted),
            4 => Ok(ReadEventResult::Error),
            5 => Ok(ReadEventResult::AccessDenied),
            other => Err(CitrineError::Decode(format!(
                "unknown read event result {other}"
            ))),
        }
    }
}

/// Why the server dropped a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionDropReason {
    Unsubscribed,
    AccessDenied,
    NotFound,
}

impl SubscriptionDropReason {
    pub fn as_u8(self) -> u8 {
        match self {
            SubscriptionDropReason::Unsubscribed => 0,
            SubscriptionDropReason::AccessDenied => 1,
            SubscriptionDropReason::NotFound => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, CitrineError> {
        match value {
            0 => Ok(SubscriptionDropReason::Unsubscribed),
            1 => Ok(SubscriptionDropReason::AccessDenied),
            2 => Ok(SubscriptionDropReason::NotFound),
            other => Err(CitrineError::Decode(format!(
                "unknown subscription drop reason {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SubscriptionDropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionDropReason::Unsubscribed => "unsubscribed",
            SubscriptionDropReason::AccessDenied => "access denied",
            SubscriptionDropReason::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// What the server should do with negatively acknowledged events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakAction {
    Unknown,
    Park,
    Retry,
    Skip,
    Stop,
}

impl NakAction {
    pub fn as_u8(self) -> u8 {
        match self {
            NakAction::Unknown => 0,
            NakAction::Park => 1,
            NakAction::Retry => 2,
            NakAction::Skip => 3,
            NakAction::Stop => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, CitrineError> {
        match value {
            0 => Ok(NakAction::Unknown),
            1 => Ok(NakAction::Park),
            2 => Ok(NakAction::Retry),
            3 => Ok(NakAction::Skip),
            4 => Ok(NakAction::Stop),
            other => Err(CitrineError::Decode(format!("unknown nak action {other}"))),
        }
    }
}

/// Why the server declined to handle a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotHandledReason {
    NotReady,
    TooBusy,
    NotLeader,
}

impl NotHandledReason {
    pub fn as_u8(self) -> u8 {
        match self {
            NotHandledReason::NotReady => 0,
            NotHandledReason::TooBusy => 1,
            NotHandledReason::NotLeader => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, CitrineError> {
        match value {
            0 => Ok(NotHandledReason::NotReady),
            1 => Ok(NotHandledReason::TooBusy),
            2 => Ok(NotHandledReason::NotLeader),
            other => Err(CitrineError::Decode(format!(
                "unknown not-handled reason {other}"
            ))),
        }
    }
}

impl std::fmt::Display for NotHandledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotHandledReason::NotReady => "not ready",
            NotHandledReason::TooBusy => "too busy",
            NotHandledReason::NotLeader => "not leader",
        };
        f.write_str(s)
    }
}

/// A single protocol message, decoded from or destined for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HeartbeatRequest,
    HeartbeatResponse,
    Ping {
        payload: Bytes,
    },
    Pong {
        payload: Bytes,
    },
    Authenticate,
    Authenticated,
    NotAuthenticated {
        reason: String,
    },
    WriteEvents {
        stream: String,
        expected_version: i64,
        events: Vec<NewEvent>,
    },
    WriteEventsCompleted {
        result: OperationResult,
        first_event_number: u64,
        last_event_number: u64,
    },
    TransactionStart {
        stream: String,
        expected_version: i64,
    },
    TransactionStartCompleted {
        transaction_id: u64,
        result: OperationResult,
    },
    TransactionWrite {
        transaction_id: u64,
        events: Vec<NewEvent>,
    },
    TransactionWriteCompleted {
        transaction_id: u64,
        result: OperationResult,
    },
    TransactionCommit {
        transaction_id: u64,
    },
    TransactionCommitCompleted {
        transaction_id: u64,
        result: OperationResult,
        first_event_number: u64,
        last_event_number: u64,
    },
    ReadEvent {
        stream: String,
        event_number: i64,
        resolve_links: bool,
    },
    ReadEventCompleted {
        result: ReadEventResult,
        event: Option<RecordedEvent>,
    },
    SubscribeToStream {
        stream: String,
        resolve_links: bool,
    },
    SubscribeCompleted {
        last_commit_position: i64,
        last_event_number: Option<u64>,
    },
    Unsubscribe,
    UnsubscribeCompleted,
    StreamEventAppeared {
        event: RecordedEvent,
    },
    SubscriptionDropped {
        reason: SubscriptionDropReason,
    },
    ConnectToPersistentSubscription {
        group: String,
        stream: String,
        allowed_in_flight: u16,
    },
    PersistentSubscriptionConfirmation {
        subscription_id: String,
        last_commit_position: i64,
        last_event_number: Option<u64>,
    },
    PersistentSubscriptionEventAppeared {
        event: RecordedEvent,
    },
    PersistentSubscriptionAck {
        subscription_id: String,
        event_ids: Vec<Uuid>,
    },
    PersistentSubscriptionNak {
        subscription_id: String,
        event_ids: Vec<Uuid>,
        action: NakAction,
        message: String,
    },
    BadRequest {
        reason: String,
    },
    NotHandled {
        reason: NotHandledReason,
    },
}

impl Message {
    /// The wire discriminant for this message.
    pub fn command(&self) -> u8 {
        match self {
            Message::HeartbeatRequest => command::HEARTBEAT_REQUEST,
            Message::HeartbeatResponse => command::HEARTBEAT_RESPONSE,
            Message::Ping { .. } => command::PING,
            Message::Pong { .. } => command::PONG,
            Message::Authenticate => command::AUTHENTICATE,
            Message::Authenticated => command::AUTHENTICATED,
            Message::NotAuthenticated { .. } => command::NOT_AUTHENTICATED,
            Message::WriteEvents { .. } => command::WRITE_EVENTS,
            Message::WriteEventsCompleted { .. } => command::WRITE_EVENTS_COMPLETED,
            Message::TransactionStart { .. } => command::TRANSACTION_START,
            Message::TransactionStartCompleted { .. } => command::TRANSACTION_START_COMPLETED,
            Message::TransactionWrite { .. } => command::TRANSACTION_WRITE,
            Message::TransactionWriteCompleted { .. } => command::TRANSACTION_WRITE_COMPLETED,
            Message::TransactionCommit { .. } => command::TRANSACTION_COMMIT,
            Message::TransactionCommitCompleted { .. } => command::TRANSACTION_COMMIT_COMPLETED,
            Message::ReadEvent { .. } => command::READ_EVENT,
            Message::ReadEventCompleted { .. } => command::READ_EVENT_COMPLETED,
            Message::SubscribeToStream { .. } => command::SUBSCRIBE_TO_STREAM,
            Message::SubscribeCompleted { .. } => command::SUBSCRIBE_COMPLETED,
            Message::Unsubscribe => command::UNSUBSCRIBE,
            Message::UnsubscribeCompleted => command::UNSUBSCRIBE_COMPLETED,
            Message::StreamEventAppeared { .. } => command::STREAM_EVENT_APPEARED,
            Message::SubscriptionDropped { .. } => command::SUBSCRIPTION_DROPPED,
            Message::ConnectToPersistentSubscription { .. } => {
                command::CONNECT_TO_PERSISTENT_SUBSCRIPTION
            }
            Message::PersistentSubscriptionConfirmation { .. } => {
                command::PERSISTENT_SUBSCRIPTION_CONFIRMATION
            }
            Message::PersistentSubscriptionEventAppeared { .. } => {
                command::PERSISTENT_SUBSCRIPTION_EVENT_APPEARED
            }
            Message::PersistentSubscriptionAck { .. } => command::PERSISTENT_SUBSCRIPTION_ACK,
            Message::PersistentSubscriptionNak { .. } => command::PERSISTENT_SUBSCRIPTION_NAK,
            Message::BadRequest { .. } => command::BAD_REQUEST,
            Message::NotHandled { .. } => command::NOT_HANDLED,
        }
    }

    /// A stable human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::HeartbeatRequest => "HeartbeatRequest",
            Message::HeartbeatResponse => "HeartbeatResponse",
            Message::Ping { .. } => "Ping",
            Message::Pong { .. } => "Pong",
            Message::Authenticate => "Authenticate",
            Message::Authenticated => "Authenticated",
            Message::NotAuthenticated { .. } => "NotAuthenticated",
            Message::WriteEvents { .. } => "WriteEvents",
            Message::WriteEventsCompleted { .. } => "WriteEventsCompleted",
            Message::TransactionStart { .. } => "TransactionStart",
            Message::TransactionStartCompleted { .. } => "TransactionStartCompleted",
            Message::TransactionWrite { .. } => "TransactionWrite",
            Message::TransactionWriteCompleted { .. } => "TransactionWriteCompleted",
            Message::TransactionCommit { .. } => "TransactionCommit",
            Message::TransactionCommitCompleted { .. } => "TransactionCommitCompleted",
            Message::ReadEvent { .. } => "ReadEvent",
            Message::ReadEventCompleted { .. } => "ReadEventCompleted",
            Message::SubscribeToStream { .. } => "SubscribeToStream",
            Message::SubscribeCompleted { .. } => "SubscribeCompleted",
            Message::Unsubscribe => "Unsubscribe",
            Message::UnsubscribeCompleted => "UnsubscribeCompleted",
            Message::StreamEventAppeared { .. } => "StreamEventAppeared",
            Message::SubscriptionDropped { .. } => "SubscriptionDropped",
            Message::ConnectToPersistentSubscription { .. } => "ConnectToPersistentSubscription",
            Message::PersistentSubscriptionConfirmation { .. } => {
                "PersistentSubscriptionConfirmation"
            }
            Message::PersistentSubscriptionEventAppeared { .. } => {
                "PersistentSubscriptionEventAppeared"
            }
            Message::PersistentSubscriptionAck { .. } => "PersistentSubscriptionAck",
            Message::PersistentSubscriptionNak { .. } => "PersistentSubscriptionNak",
            Message::BadRequest { .. } => "BadRequest",
            Message::NotHandled { .. } => "NotHandled",
        }
    }

    /// Encodes the payload (everything after the frame header) into `dst`.
    pub fn encode_payload(&self, dst: &mut BytesMut) -> Result<(), CitrineError> {
        match self {
            Message::HeartbeatRequest
            | Message::HeartbeatResponse
            | Message::Authenticate
            | Message::Authenticated
            | Message::Unsubscribe
            | Message::UnsubscribeCompleted => {}
            Message::Ping { payload } | Message::Pong { payload } => {
                dst.extend_from_slice(payload);
            }
            Message::NotAuthenticated { reason } => put_string(dst, reason)?,
            Message::WriteEvents {
                stream,
                expected_version,
                events,
            } => {
                put_string(dst, stream)?;
                dst.put_i64_le(*expected_version);
                put_new_events(dst, events)?;
            }
            Message::WriteEventsCompleted {
                result,
                first_event_number,
                last_event_number,
            } => {
                dst.put_u8(result.as_u8());
                dst.put_u64_le(*first_event_number);
                dst.put_u64_le(*last_event_number);
            }
            Message::TransactionStart {
                stream,
                expected_version,
            } => {
                put_string(dst, stream)?;
                dst.put_i64_le(*expected_version);
            }
            Message::TransactionStartCompleted {
                transaction_id,
                result,
            } => {
                dst.put_u64_le(*transaction_id);
                dst.put_u8(result.as_u8());
            }
            Message::TransactionWrite {
                transaction_id,
                events,
            } => {
                dst.put_u64_le(*transaction_id);
                put_new_events(dst, events)?;
            }
            Message::TransactionWriteCompleted {
                transaction_id,
                result,
            } => {
                dst.put_u64_le(*transaction_id);
                dst.put_u8(result.as_u8());
            }
            Message::TransactionCommit { transaction_id } => {
                dst.put_u64_le(*transaction_id);
            }
            Message::TransactionCommitCompleted {
                transaction_id,
                result,
                first_event_number,
                last_event_number,
            } => {
                dst.put_u64_le(*transaction_id);
                dst.put_u8(result.as_u8());
                dst.put_u64_le(*first_event_number);
                dst.put_u64_le(*last_event_number);
            }
            Message::ReadEvent {
                stream,
                event_number,
                resolve_links,
            } => {
                put_string(dst, stream)?;
                dst.put_i64_le(*event_number);
                dst.put_u8(u8::from(*resolve_links));
            }
            Message::ReadEventCompleted { result, event } => {
                dst.put_u8(result.as_u8());
                match event {
                    Some(event) => {
                        dst.put_u8(1);
                        put_recorded_event(dst, event)?;
                    }
                    None => dst.put_u8(0),
                }
            }
            Message::SubscribeToStream {
                stream,
                resolve_links,
            } => {
                put_string(dst, stream)?;
                dst.put_u8(u8::from(*resolve_links));
            }
            Message::SubscribeCompleted {
                last_commit_position,
                last_event_number,
            } => {
                dst.put_i64_le(*last_commit_position);
                put_opt_u64(dst, *last_event_number);
            }
            Message::StreamEventAppeared { event } => put_recorded_event(dst, event)?,
            Message::SubscriptionDropped { reason } => dst.put_u8(reason.as_u8()),
            Message::ConnectToPersistentSubscription {
                group,
                stream,
                allowed_in_flight,
            } => {
                put_string(dst, group)?;
                put_string(dst, stream)?;
                dst.put_u16_le(*allowed_in_flight);
            }
            Message::PersistentSubscriptionConfirmation {
                subscription_id,
                last_commit_position,
                last_event_number,
            } => {
                put_string(dst, subscription_id)?;
                dst.put_i64_le(*last_commit_position);
                put_opt_u64(dst, *last_event_number);
            }
            Message::PersistentSubscriptionEventAppeared { event } => {
                put_recorded_event(dst, event)?;
            }
            Message::PersistentSubscriptionAck {
                subscription_id,
                event_ids,
            } => {
                put_string(dst, subscription_id)?;
                put_event_ids(dst, event_ids)?;
            }
            Message::PersistentSubscriptionNak {
                subscription_id,
                event_ids,
                action,
                message,
            } => {
                put_string(dst, subscription_id)?;
                put_event_ids(dst, event_ids)?;
                dst.put_u8(action.as_u8());
                put_string(dst, message)?;
            }
            Message::BadRequest { reason } => put_string(dst, reason)?,
            Message::NotHandled { reason } => dst.put_u8(reason.as_u8()),
        }
        Ok(())
    }

    /// Decodes a payload for the given command discriminant.
    pub fn decode(cmd: u8, mut payload: Bytes) -> Result<Message, CitrineError> {
        let message = match cmd {
            command::HEARTBEAT_REQUEST => Message::HeartbeatRequest,
            command::HEARTBEAT_RESPONSE => Message::HeartbeatResponse,
            command::PING => Message::Ping {
                payload: payload.copy_to_bytes(payload.remaining()),
            },
            command::PONG => Message::Pong {
                payload: payload.copy_to_bytes(payload.remaining()),
            },
            command::AUTHENTICATE => Message::Authenticate,
            command::AUTHENTICATED => Message::Authenticated,
            command::NOT_AUTHENTICATED => Message::NotAuthenticated {
                reason: get_string(&mut payload)?,
            },
            command::WRITE_EVENTS => Message::WriteEvents {
                stream: get_string(&mut payload)?,
                expected_version: get_i64(&mut payload)?,
                events: get_new_events(&mut payload)?,
            },
            command::WRITE_EVENTS_COMPLETED => Message::WriteEventsCompleted {
                result: OperationResult::from_u8(get_u8(&mut payload)?)?,
                first_event_number: get_u64(&mut payload)?,
                last_event_number: get_u64(&mut payload)?,
            },
            command::TRANSACTION_START => Message::TransactionStart {
                stream: get_string(&mut payload)?,
                expected_version: get_i64(&mut payload)?,
            },
            command::TRANSACTION_START_COMPLETED => Message::TransactionStartCompleted {
                transaction_id: get_u64(&mut payload)?,
                result: OperationResult::from_u8(get_u8(&mut payload)?)?,
            },
            command::TRANSACTION_WRITE => Message::TransactionWrite {
                transaction_id: get_u64(&mut payload)?,
                events: get_new_events(&mut payload)?,
            },
            command::TRANSACTION_WRITE_COMPLETED => Message::TransactionWriteCompleted {
                transaction_id: get_u64(&mut payload)?,
                result: OperationResult::from_u8(get_u8(&mut payload)?)?,
            },
            command::TRANSACTION_COMMIT => Message::TransactionCommit {
                transaction_id: get_u64(&mut payload)?,
            },
            command::TRANSACTION_COMMIT_COMPLETED => Message::TransactionCommitCompleted {
                transaction_id: get_u64(&mut payload)?,
                result: OperationResult::from_u8(get_u8(&mut payload)?)?,
                first_event_number: get_u64(&mut payload)?,
                last_event_number: get_u64(&mut payload)?,
            },
            command::READ_EVENT => Message::ReadEvent {
                stream: get_string(&mut payload)?,
                event_number: get_i64(&mut payload)?,
                resolve_links: get_u8(&mut payload)? != 0,
            },
            command::READ_EVENT_COMPLETED => {
                let result = ReadEventResult::from_u8(get_u8(&mut payload)?)?;
                let event = match get_u8(&mut payload)? {
                    0 => None,
                    _ => Some(get_recorded_event(&mut payload)?),
                };
                Message::ReadEventCompleted { result, event }
            }
            command::SUBSCRIBE_TO_STREAM => Message::SubscribeToStream {
                stream: get_string(&mut payload)?,
                resolve_links: get_u8(&mut payload)? != 0,
            },
            command::SUBSCRIBE_COMPLETED => Message::SubscribeCompleted {
                last_commit_position: get_i64(&mut payload)?,
                last_event_number: get_opt_u64(&mut payload)?,
            },
            command::UNSUBSCRIBE => Message::Unsubscribe,
            command::UNSUBSCRIBE_COMPLETED => Message::UnsubscribeCompleted,
            command::STREAM_EVENT_APPEARED => Message::StreamEventAppeared {
                event: get_recorded_event(&mut payload)?,
            },
            command::SUBSCRIPTION_DROPPED => Message::SubscriptionDropped {
                reason: SubscriptionDropReason::from_u8(get_u8(&mut payload)?)?,
            },
            command::CONNECT_TO_PERSISTENT_SUBSCRIPTION => {
                Message::ConnectToPersistentSubscription {
                    group: get_string(&mut payload)?,
                    stream: get_string(&mut payload)?,
                    allowed_in_flight: get_u16(&mut payload)?,
                }
            }
            command::PERSISTENT_SUBSCRIPTION_CONFIRMATION => {
                Message::PersistentSubscriptionConfirmation {
                    subscription_id: get_string(&mut payload)?,
                    last_commit_position: get_i64(&mut payload)?,
                    last_event_number: get_opt_u64(&mut payload)?,
                }
            }
            command::PERSISTENT_SUBSCRIPTION_EVENT_APPEARED => {
                Message::PersistentSubscriptionEventAppeared {
                    event: get_recorded_event(&mut payload)?,
                }
            }
            command::PERSISTENT_SUBSCRIPTION_ACK => Message::PersistentSubscriptionAck {
                subscription_id: get_string(&mut payload)?,
                event_ids: get_event_ids(&mut payload)?,
            },
            command::PERSISTENT_SUBSCRIPTION_NAK => Message::PersistentSubscriptionNak {
                subscription_id: get_string(&mut payload)?,
                event_ids: get_event_ids(&mut payload)?,
                action: NakAction::from_u8(get_u8(&mut payload)?)?,
                message: get_string(&mut payload)?,
            },
            command::BAD_REQUEST => Message::BadRequest {
                reason: get_string(&mut payload)?,
            },
            command::NOT_HANDLED => Message::NotHandled {
                reason: NotHandledReason::from_u8(get_u8(&mut payload)?)?,
            },
            other => {
                return Err(CitrineError::Decode(format!(
                    "unknown command discriminant 0x{other:02x}"
                )));
            }
        };
        Ok(message)
    }
}

// --- Payload encoding helpers ---

fn put_string(dst: &mut BytesMut, s: &str) -> Result<(), CitrineError> {
    let len = u16::try_from(s.len())
        .map_err(|_| CitrineError::Protocol(format!("string of {} bytes is too long", s.len())))?;
    dst.put_u16_le(len);
    dst.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_blob(dst: &mut BytesMut, blob: &Bytes) -> Result<(), CitrineError> {
    let len = u32::try_from(blob.len())
        .map_err(|_| CitrineError::Protocol(format!("blob of {} bytes is too long", blob.len())))?;
    dst.put_u32_le(len);
    dst.extend_from_slice(blob);
    Ok(())
}

fn put_opt_u64(dst: &mut BytesMut, value: Option<u64>) {
    match value {
        Some(value) => {
            dst.put_u8(1);
            dst.put_u64_le(value);
        }
        None => dst.put_u8(0),
    }
}

fn put_new_events(dst: &mut BytesMut, events: &[NewEvent]) -> Result<(), CitrineError> {
    let count = u32::try_from(events.len())
        .map_err(|_| CitrineError::Protocol("too many events in one message".into()))?;
    dst.put_u32_le(count);
    for event in events {
        dst.extend_from_slice(event.event_id.as_bytes());
        put_string(dst, &event.event_type)?;
        put_blob(dst, &event.data)?;
        put_blob(dst, &event.metadata)?;
    }
    Ok(())
}

fn put_recorded_event(dst: &mut BytesMut, event: &RecordedEvent) -> Result<(), CitrineError> {
    put_string(dst, &event.stream)?;
    dst.put_u64_le(event.event_number);
    dst.extend_from_slice(event.event_id.as_bytes());
    put_string(dst, &event.event_type)?;
    put_blob(dst, &event.data)?;
    put_blob(dst, &event.metadata)?;
    Ok(())
}

fn put_event_ids(dst: &mut BytesMut, ids: &[Uuid]) -> Result<(), CitrineError> {
    let count = u32::try_from(ids.len())
        .map_err(|_| CitrineError::Protocol("too many event ids in one message".into()))?;
    dst.put_u32_le(count);
    for id in ids {
        dst.extend_from_slice(id.as_bytes());
    }
    Ok(())
}

// --- Payload decoding helpers ---

fn need(src: &Bytes, n: usize, what: &str) -> Result<(), CitrineError> {
    if src.remaining() < n {
        return Err(CitrineError::Decode(format!("truncated {what}")));
    }
    Ok(())
}

fn get_u8(src: &mut Bytes) -> Result<u8, CitrineError> {
    need(src, 1, "u8")?;
    Ok(src.get_u8())
}

fn get_u16(src: &mut Bytes) -> Result<u16, CitrineError> {
    need(src, 2, "u16")?;
    Ok(src.get_u16_le())
}

fn get_u32(src: &mut Bytes) -> Result<u32, CitrineError> {
    need(src, 4, "u32")?;
    Ok(src.get_u32_le())
}

fn get_u64(src: &mut Bytes) -> Result<u64, CitrineError> {
    need(src, 8, "u64")?;
    Ok(src.get_u64_le())
}

fn get_i64(src: &mut Bytes) -> Result<i64, CitrineError> {
    need(src, 8, "i64")?;
    Ok(src.get_i64_le())
}

fn get_opt_u64(src: &mut Bytes) -> Result<Option<u64>, CitrineError> {
    match get_u8(src)? {
        0 => Ok(None),
        _ => Ok(Some(get_u64(src)?)),
    }
}

fn get_string(src: &mut Bytes) -> Result<String, CitrineError> {
    let len = get_u16(src)? as usize;
    need(src, len, "string body")?;
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| CitrineError::Decode("invalid UTF-8 in string".into()))
}

fn get_blob(src: &mut Bytes) -> Result<Bytes, CitrineError> {
    let len = get_u32(src)? as usize;
    need(src, len, "blob body")?;
    Ok(src.split_to(len))
}

fn get_uuid(src: &mut Bytes) -> Result<Uuid, CitrineError> {
    need(src, 16, "uuid")?;
    let raw = src.split_to(16);
    Uuid::from_slice(&raw).map_err(|e| CitrineError::Decode(format!("invalid uuid: {e}")))
}

fn get_new_events(src: &mut Bytes) -> Result<Vec<NewEvent>, CitrineError> {
    let count = get_u32(src)? as usize;
    if count > MAX_EVENTS_PER_MESSAGE {
        return Err(CitrineError::Decode(format!(
            "event count {count} exceeds limit"
        )));
    }
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        events.push(NewEvent {
            event_id: get_uuid(src)?,
            event_type: get_string(src)?,
            data: get_blob(src)?,
            metadata: get_blob(src)?,
        });
    }
    Ok(events)
}

fn get_recorded_event(src: &mut Bytes) -> Result<RecordedEvent, CitrineError> {
    Ok(RecordedEvent {
        stream: get_string(src)?,
        event_number: get_u64(src)?,
        event_id: get_uuid(src)?,
        event_type: get_string(src)?,
        data: get_blob(src)?,
        metadata: get_blob(src)?,
    })
}

fn get_event_ids(src: &mut Bytes) -> Result<Vec<Uuid>, CitrineError> {
    let count = get_u32(src)? as usize;
    if count > MAX_EVENTS_PER_MESSAGE {
        return Err(CitrineError::Decode(format!(
            "event id count {count} exceeds limit"
        )));
    }
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(get_uuid(src)?);
    }
    Ok(ids)
}
