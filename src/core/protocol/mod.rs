// src/core/protocol/mod.rs

pub mod message;
pub mod package;

pub use message::{
    Message, NakAction, NewEvent, NotHandledReason, OperationResult, ReadEventResult,
    RecordedEvent, SubscriptionDropReason,
};
pub use package::{Credentials, PackageCodec, PackageIn, PackageOut};
