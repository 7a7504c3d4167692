// Wire messages: framing, the two encoding variants, and response parsing

mod parser;
mod types;
mod writer;

pub use parser::{
    parse_message, parse_response, CallbackResult, DaemonResponse, ParsedMessage, ProtocolError,
    ResponseKind,
};
pub use types::{headers, BinarySection, GntpMessage, Header, MessageType};
pub use writer::{CodecError, WireMode};
