//! Protocol module: field paths, the streaming field extractor and the
//! outbound message builder.

pub mod extractor;
pub mod messages;
pub mod path;

pub use extractor::{FieldExtractor, FieldMatch, FieldValue, ParseError, ParseErrorKind, Progress};
pub use messages::{BuildError, MessageBuilder, OutboundMessage, RenderedMessage};
pub use path::{FieldPath, PathError, Segment};
