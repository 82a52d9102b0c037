//! Server-sent events: encoding for responses, decoding for upstream streams.

pub mod decode;
pub mod event;

pub use decode::{data_lines, is_done_marker, parse_sse_line};
pub use event::{
    DEFAULT_SEPARATOR, ERROR_EVENT, ErrorPayload, INTERNAL_SERVER_ERROR_CODE,
    INTERNAL_SERVER_ERROR_DETAIL, ServerSentEvent, SseItem,
};
