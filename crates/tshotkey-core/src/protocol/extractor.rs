//! Streaming JSON field extractor.
//!
//! [`FieldExtractor`] walks a JSON document one byte at a time, across as many
//! chunks as the transport delivers, and reports the value sitting at any of a
//! fixed set of [`FieldPath`]s the moment that value is complete.
//!
//! # Why stream instead of `serde_json::from_slice`?
//!
//! The control application pushes arbitrary messages at us; we only care about
//! one field.  Parsing the whole document into a `serde_json::Value` would mean
//! buffering every message in full and allocating every field in it.  The
//! extractor instead keeps:
//!
//! - a small container stack (one entry per open `{` / `[`),
//! - the bytes of the object key being read, but only while that key could
//!   still match a watched path at this depth,
//! - the bytes of a value, but only when the value sits exactly at a watched
//!   path.
//!
//! Everything else is validated and dropped as it streams past.
//!
//! # Lifecycle
//!
//! ```text
//! FieldExtractor::new(paths)
//!   feed(chunk) ... feed(chunk)   ← decode context created on the first chunk
//!   finish()                      ← message boundary: must be a complete value
//!   feed(chunk) ...               ← next message starts from a clean context
//! ```
//!
//! A [`ParseError`] is fatal for the current message: every further `feed`
//! returns [`ParseErrorKind::Poisoned`] until [`FieldExtractor::reset`] or
//! [`FieldExtractor::finish`] discards the context.

use thiserror::Error;

use crate::protocol::path::{FieldPath, PathError, Segment};

/// Maximum container nesting accepted inside one message.
pub const MAX_DEPTH: usize = 64;

/// Maximum length in bytes of a captured value.
pub const MAX_VALUE_LEN: usize = 4096;

/// Maximum number of watched paths (one bit each in the match masks).
pub const MAX_TARGETS: usize = 32;

// ── Public types ──────────────────────────────────────────────────────────────

/// A decoded scalar found at a watched path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A JSON string, with escapes resolved.
    String(String),
    /// A JSON number in its original textual form.
    Number(String),
    /// `true` or `false`.
    Bool(bool),
    /// `null`.
    Null,
}

impl FieldValue {
    /// Returns the string content for [`FieldValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Notification delivered from inside [`FieldExtractor::feed`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch<'a> {
    /// Position of the matched path in the extractor's target list.
    pub index: usize,
    /// The matched path.
    pub path: &'a FieldPath,
    /// The complete value.
    pub value: FieldValue,
}

/// How far through the current message the extractor has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The top-level value is still open.
    NeedMore,
    /// The top-level value has been closed; only whitespace may follow.
    Complete,
}

/// What went wrong while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A byte that is not valid at this point in the grammar.
    UnexpectedByte(u8),
    /// The message ended before the top-level value was closed.
    UnexpectedEnd,
    /// A backslash escape other than `\" \\ \/ \b \f \n \r \t \uXXXX`.
    InvalidEscape(u8),
    /// A `\u` escape with bad hex digits or an unpaired surrogate.
    InvalidUnicodeEscape,
    /// An unescaped control character inside a string.
    ControlCharacter(u8),
    /// A captured string value is not valid UTF-8.
    InvalidUtf8,
    /// More than [`MAX_DEPTH`] nested containers.
    NestingTooDeep,
    /// A captured value longer than [`MAX_VALUE_LEN`] bytes.
    ValueTooLong,
    /// Non-whitespace after the top-level value.
    TrailingData(u8),
    /// The decode context already failed and must be reset.
    Poisoned,
}

/// A fatal decoding error, with the byte offset into the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed JSON at byte {offset}: {kind:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

// ── Extractor ─────────────────────────────────────────────────────────────────

/// Incremental decoder that reports values at watched field paths.
///
/// # Example
///
/// ```rust
/// use tshotkey_core::protocol::extractor::{FieldExtractor, FieldValue};
/// use tshotkey_core::protocol::path::FieldPath;
///
/// let mut extractor =
///     FieldExtractor::new([FieldPath::parse("payload.apiKey").unwrap()]).unwrap();
///
/// let mut seen = Vec::new();
/// extractor.feed(br#"{"type":"auth","payload":{"api"#, |m| seen.push(m.value)).unwrap();
/// extractor.feed(br#"Key":"k-123"}}"#, |m| seen.push(m.value)).unwrap();
/// extractor.finish().unwrap();
///
/// assert_eq!(seen, vec![FieldValue::String("k-123".to_string())]);
/// ```
#[derive(Debug)]
pub struct FieldExtractor {
    targets: Vec<FieldPath>,
    context: Option<DecoderContext>,
}

impl FieldExtractor {
    /// Builds an extractor watching `targets`.
    ///
    /// Duplicate paths are collapsed; the first occurrence keeps its index.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::TooManyPaths`] if more than [`MAX_TARGETS`]
    /// distinct paths are given.
    pub fn new(targets: impl IntoIterator<Item = FieldPath>) -> Result<Self, PathError> {
        let mut unique: Vec<FieldPath> = Vec::new();
        for path in targets {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        if unique.len() > MAX_TARGETS {
            return Err(PathError::TooManyPaths {
                count: unique.len(),
                max: MAX_TARGETS,
            });
        }
        Ok(Self {
            targets: unique,
            context: None,
        })
    }

    /// The watched paths, in index order.
    pub fn targets(&self) -> &[FieldPath] {
        &self.targets
    }

    /// Whether a message is currently being decoded.
    pub fn in_progress(&self) -> bool {
        self.context.is_some()
    }

    /// The watched path whose value is currently being accumulated, if any.
    pub fn matched_path(&self) -> Option<&FieldPath> {
        self.context
            .as_ref()
            .and_then(|ctx| ctx.capture.as_ref())
            .map(|cap| &self.targets[cap.target])
    }

    /// Decodes the next chunk of the current message.
    ///
    /// `on_value` is called synchronously for every watched value completed
    /// inside this chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] on malformed input.  The context is then
    /// unusable until [`reset`](Self::reset) or [`finish`](Self::finish).
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_value: F) -> Result<Progress, ParseError>
    where
        F: FnMut(FieldMatch<'_>),
    {
        let targets = &self.targets;
        let ctx = self
            .context
            .get_or_insert_with(|| DecoderContext::new(targets.len()));

        for &byte in chunk {
            if let Err(kind) = ctx.feed_byte(byte, targets, &mut on_value) {
                let offset = ctx.offset;
                ctx.fail();
                return Err(ParseError { kind, offset });
            }
            ctx.offset += 1;
        }

        Ok(if ctx.lex == Lex::Done {
            Progress::Complete
        } else {
            Progress::NeedMore
        })
    }

    /// Marks the end of the current message and discards the decode context.
    ///
    /// Succeeds when no message was started or the top-level value was closed.
    ///
    /// # Errors
    ///
    /// Returns [`ParseErrorKind::UnexpectedEnd`] for a truncated message and
    /// [`ParseErrorKind::Poisoned`] if the message already failed.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        let Some(ctx) = self.context.take() else {
            return Ok(());
        };
        match ctx.lex {
            Lex::Done => Ok(()),
            Lex::Failed => Err(ParseError {
                kind: ParseErrorKind::Poisoned,
                offset: ctx.offset,
            }),
            // A top-level number has no closing delimiter of its own.
            Lex::Number(num) if ctx.stack.is_empty() && num.is_terminal() => Ok(()),
            _ => Err(ParseError {
                kind: ParseErrorKind::UnexpectedEnd,
                offset: ctx.offset,
            }),
        }
    }

    /// Discards any partial decode state without validating it.
    pub fn reset(&mut self) {
        self.context = None;
    }
}

// ── Decode context ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    /// Expecting any value.
    Value,
    /// Just after `[`: a value or `]`.
    ValueOrEnd,
    /// Just after `{`: a key or `}`.
    KeyOrEnd,
    /// After `,` inside an object: a key.
    Key,
    /// After a key: `:`.
    Colon,
    /// After a member value: `,` or the closing bracket.
    AfterValue,
    Str(StrRole),
    Literal { word: Word, pos: u8 },
    Number(Num),
    /// Top-level value closed.
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrRole {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Word {
    True,
    False,
    Null,
}

impl Word {
    fn bytes(self) -> &'static [u8] {
        match self {
            Word::True => b"true",
            Word::False => b"false",
            Word::Null => b"null",
        }
    }

    fn value(self) -> FieldValue {
        match self {
            Word::True => FieldValue::Bool(true),
            Word::False => FieldValue::Bool(false),
            Word::Null => FieldValue::Null,
        }
    }
}

/// Number grammar positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Num {
    Minus,
    Zero,
    Int,
    FracStart,
    Frac,
    ExpStart,
    ExpSign,
    Exp,
}

impl Num {
    fn is_terminal(self) -> bool {
        matches!(self, Num::Zero | Num::Int | Num::Frac | Num::Exp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Backslash,
    Unicode { digits: u8, code: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    /// Targets whose prefix matches the path to this container.
    self_mask: u32,
    /// Targets whose prefix matches the path to the current member.
    member_mask: u32,
}

#[derive(Debug)]
struct Capture {
    target: usize,
    buf: Vec<u8>,
}

#[derive(Debug)]
struct KeyScan {
    /// Targets whose key at this depth still starts with `buf`.
    candidates: u32,
    buf: Vec<u8>,
}

enum Step {
    Consumed,
    Reprocess,
}

#[derive(Debug)]
struct DecoderContext {
    lex: Lex,
    stack: Vec<Frame>,
    root_mask: u32,
    offset: usize,
    escape: Escape,
    high_surrogate: Option<u32>,
    key: KeyScan,
    capture: Option<Capture>,
}

type OnValue<'f> = dyn FnMut(FieldMatch<'_>) + 'f;

impl DecoderContext {
    fn new(target_count: usize) -> Self {
        let root_mask = if target_count >= 32 {
            u32::MAX
        } else {
            (1u32 << target_count) - 1
        };
        Self {
            lex: Lex::Value,
            stack: Vec::new(),
            root_mask,
            offset: 0,
            escape: Escape::None,
            high_surrogate: None,
            key: KeyScan {
                candidates: 0,
                buf: Vec::new(),
            },
            capture: None,
        }
    }

    fn fail(&mut self) {
        self.lex = Lex::Failed;
        self.capture = None;
        self.key.buf.clear();
    }

    fn feed_byte(
        &mut self,
        byte: u8,
        targets: &[FieldPath],
        on_value: &mut OnValue<'_>,
    ) -> Result<(), ParseErrorKind> {
        loop {
            match self.step(byte, targets, on_value)? {
                Step::Consumed => return Ok(()),
                Step::Reprocess => continue,
            }
        }
    }

    fn step(
        &mut self,
        b: u8,
        targets: &[FieldPath],
        on_value: &mut OnValue<'_>,
    ) -> Result<Step, ParseErrorKind> {
        match self.lex {
            Lex::Failed => Err(ParseErrorKind::Poisoned),

            Lex::Done => {
                if is_ws(b) {
                    Ok(Step::Consumed)
                } else {
                    Err(ParseErrorKind::TrailingData(b))
                }
            }

            Lex::Value => {
                if is_ws(b) {
                    return Ok(Step::Consumed);
                }
                self.begin_value(b, targets)?;
                Ok(Step::Consumed)
            }

            Lex::ValueOrEnd => match b {
                _ if is_ws(b) => Ok(Step::Consumed),
                b']' => {
                    self.close(Container::Array, b)?;
                    Ok(Step::Consumed)
                }
                _ => {
                    self.lex = Lex::Value;
                    Ok(Step::Reprocess)
                }
            },

            Lex::KeyOrEnd => match b {
                _ if is_ws(b) => Ok(Step::Consumed),
                b'}' => {
                    self.close(Container::Object, b)?;
                    Ok(Step::Consumed)
                }
                b'"' => {
                    self.begin_key(targets);
                    Ok(Step::Consumed)
                }
                _ => Err(ParseErrorKind::UnexpectedByte(b)),
            },

            Lex::Key => match b {
                _ if is_ws(b) => Ok(Step::Consumed),
                b'"' => {
                    self.begin_key(targets);
                    Ok(Step::Consumed)
                }
                _ => Err(ParseErrorKind::UnexpectedByte(b)),
            },

            Lex::Colon => match b {
                _ if is_ws(b) => Ok(Step::Consumed),
                b':' => {
                    self.lex = Lex::Value;
                    Ok(Step::Consumed)
                }
                _ => Err(ParseErrorKind::UnexpectedByte(b)),
            },

            Lex::AfterValue => match b {
                _ if is_ws(b) => Ok(Step::Consumed),
                b',' => {
                    match self.stack.last_mut() {
                        Some(frame) if frame.container == Container::Object => {
                            frame.member_mask = 0;
                            self.lex = Lex::Key;
                        }
                        Some(_) => self.lex = Lex::Value,
                        None => return Err(ParseErrorKind::UnexpectedByte(b)),
                    }
                    Ok(Step::Consumed)
                }
                b'}' => {
                    self.close(Container::Object, b)?;
                    Ok(Step::Consumed)
                }
                b']' => {
                    self.close(Container::Array, b)?;
                    Ok(Step::Consumed)
                }
                _ => Err(ParseErrorKind::UnexpectedByte(b)),
            },

            Lex::Str(role) => {
                self.string_byte(b, role, targets, on_value)?;
                Ok(Step::Consumed)
            }

            Lex::Literal { word, pos } => {
                let expected = word.bytes();
                if b != expected[pos as usize] {
                    return Err(ParseErrorKind::UnexpectedByte(b));
                }
                let next = pos + 1;
                if next as usize == expected.len() {
                    self.complete_scalar(targets, on_value, |_| Ok(word.value()))?;
                } else {
                    self.lex = Lex::Literal { word, pos: next };
                }
                Ok(Step::Consumed)
            }

            Lex::Number(num) => self.number_byte(b, num, targets, on_value),
        }
    }

    // ── Values ────────────────────────────────────────────────────────────────

    /// Targets whose prefix matches the path to the value about to start.
    fn value_mask(&self) -> u32 {
        self.stack
            .last()
            .map_or(self.root_mask, |frame| frame.member_mask)
    }

    /// First target in `mask` that ends exactly at the current value.
    fn exact_target(&self, mask: u32, targets: &[FieldPath]) -> Option<usize> {
        let depth = self.stack.len();
        bits(mask).find(|&i| targets[i].depth() == depth)
    }

    fn begin_value(&mut self, b: u8, targets: &[FieldPath]) -> Result<(), ParseErrorKind> {
        let mask = self.value_mask();
        match b {
            b'{' => self.open(Container::Object, mask, targets),
            b'[' => self.open(Container::Array, mask, targets),
            b'"' => {
                self.start_capture(mask, targets);
                self.escape = Escape::None;
                self.high_surrogate = None;
                self.lex = Lex::Str(StrRole::Value);
                Ok(())
            }
            b't' | b'f' | b'n' => {
                self.start_capture(mask, targets);
                let word = match b {
                    b't' => Word::True,
                    b'f' => Word::False,
                    _ => Word::Null,
                };
                self.lex = Lex::Literal { word, pos: 1 };
                Ok(())
            }
            b'-' | b'0'..=b'9' => {
                self.start_capture(mask, targets);
                self.push_value_byte(b)?;
                self.lex = Lex::Number(match b {
                    b'-' => Num::Minus,
                    b'0' => Num::Zero,
                    _ => Num::Int,
                });
                Ok(())
            }
            _ => Err(ParseErrorKind::UnexpectedByte(b)),
        }
    }

    fn start_capture(&mut self, mask: u32, targets: &[FieldPath]) {
        self.capture = self
            .exact_target(mask, targets)
            .map(|target| Capture {
                target,
                buf: Vec::new(),
            });
    }

    fn push_value_byte(&mut self, b: u8) -> Result<(), ParseErrorKind> {
        if let Some(cap) = self.capture.as_mut() {
            if cap.buf.len() >= MAX_VALUE_LEN {
                return Err(ParseErrorKind::ValueTooLong);
            }
            cap.buf.push(b);
        }
        Ok(())
    }

    fn complete_scalar(
        &mut self,
        targets: &[FieldPath],
        on_value: &mut OnValue<'_>,
        decode: impl FnOnce(Vec<u8>) -> Result<FieldValue, ParseErrorKind>,
    ) -> Result<(), ParseErrorKind> {
        if let Some(cap) = self.capture.take() {
            let value = decode(cap.buf)?;
            on_value(FieldMatch {
                index: cap.target,
                path: &targets[cap.target],
                value,
            });
        }
        self.after_value();
        Ok(())
    }

    fn after_value(&mut self) {
        self.lex = if self.stack.is_empty() {
            Lex::Done
        } else {
            Lex::AfterValue
        };
    }

    // ── Containers ────────────────────────────────────────────────────────────

    fn open(
        &mut self,
        container: Container,
        mask: u32,
        targets: &[FieldPath],
    ) -> Result<(), ParseErrorKind> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(ParseErrorKind::NestingTooDeep);
        }
        // Members of this container sit at segment index `seg`.
        let seg = self.stack.len();
        let member_mask = match container {
            Container::Array => bits(mask)
                .filter(|&i| targets[i].segments().get(seg) == Some(&Segment::AnyIndex))
                .fold(0, |acc, i| acc | (1 << i)),
            Container::Object => 0,
        };
        self.capture = None;
        self.stack.push(Frame {
            container,
            self_mask: mask,
            member_mask,
        });
        self.lex = match container {
            Container::Object => Lex::KeyOrEnd,
            Container::Array => Lex::ValueOrEnd,
        };
        Ok(())
    }

    fn close(&mut self, container: Container, b: u8) -> Result<(), ParseErrorKind> {
        match self.stack.last() {
            Some(frame) if frame.container == container => {
                self.stack.pop();
                self.after_value();
                Ok(())
            }
            _ => Err(ParseErrorKind::UnexpectedByte(b)),
        }
    }

    // ── Keys ──────────────────────────────────────────────────────────────────

    fn begin_key(&mut self, targets: &[FieldPath]) {
        let seg = self.stack.len() - 1;
        let self_mask = self.stack.last().map_or(0, |frame| frame.self_mask);
        self.key.candidates = bits(self_mask)
            .filter(|&i| {
                targets[i]
                    .segments()
                    .get(seg)
                    .and_then(Segment::as_key)
                    .is_some()
            })
            .fold(0, |acc, i| acc | (1 << i));
        self.key.buf.clear();
        self.escape = Escape::None;
        self.high_surrogate = None;
        self.lex = Lex::Str(StrRole::Key);
    }

    fn push_key_byte(&mut self, b: u8, targets: &[FieldPath]) {
        if self.key.candidates == 0 {
            return;
        }
        self.key.buf.push(b);
        let seg = self.stack.len() - 1;
        let buf = &self.key.buf;
        self.key.candidates = bits(self.key.candidates)
            .filter(|&i| key_at(targets, i, seg).is_some_and(|k| k.as_bytes().starts_with(buf)))
            .fold(0, |acc, i| acc | (1 << i));
        if self.key.candidates == 0 {
            self.key.buf.clear();
        }
    }

    fn finish_key(&mut self, targets: &[FieldPath]) {
        let seg = self.stack.len() - 1;
        let buf = &self.key.buf;
        let matched = bits(self.key.candidates)
            .filter(|&i| key_at(targets, i, seg).is_some_and(|k| k.as_bytes() == buf.as_slice()))
            .fold(0, |acc, i| acc | (1 << i));
        if let Some(frame) = self.stack.last_mut() {
            frame.member_mask = matched;
        }
        self.key.buf.clear();
        self.key.candidates = 0;
        self.lex = Lex::Colon;
    }

    // ── Strings ───────────────────────────────────────────────────────────────

    fn string_byte(
        &mut self,
        b: u8,
        role: StrRole,
        targets: &[FieldPath],
        on_value: &mut OnValue<'_>,
    ) -> Result<(), ParseErrorKind> {
        match self.escape {
            Escape::None => {
                if self.high_surrogate.is_some() && b != b'\\' {
                    return Err(ParseErrorKind::InvalidUnicodeEscape);
                }
                match b {
                    b'"' => match role {
                        StrRole::Key => {
                            self.finish_key(targets);
                            Ok(())
                        }
                        StrRole::Value => self.complete_scalar(targets, on_value, |buf| {
                            String::from_utf8(buf)
                                .map(FieldValue::String)
                                .map_err(|_| ParseErrorKind::InvalidUtf8)
                        }),
                    },
                    b'\\' => {
                        self.escape = Escape::Backslash;
                        Ok(())
                    }
                    0x00..=0x1F => Err(ParseErrorKind::ControlCharacter(b)),
                    _ => self.push_str_byte(b, role, targets),
                }
            }

            Escape::Backslash => {
                if self.high_surrogate.is_some() && b != b'u' {
                    return Err(ParseErrorKind::InvalidUnicodeEscape);
                }
                let decoded = match b {
                    b'"' => b'"',
                    b'\\' => b'\\',
                    b'/' => b'/',
                    b'b' => 0x08,
                    b'f' => 0x0C,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'u' => {
                        self.escape = Escape::Unicode { digits: 0, code: 0 };
                        return Ok(());
                    }
                    _ => return Err(ParseErrorKind::InvalidEscape(b)),
                };
                self.escape = Escape::None;
                self.push_str_byte(decoded, role, targets)
            }

            Escape::Unicode { digits, code } => {
                let nibble = (b as char)
                    .to_digit(16)
                    .ok_or(ParseErrorKind::InvalidUnicodeEscape)?;
                let code = (code << 4) | nibble;
                if digits < 3 {
                    self.escape = Escape::Unicode {
                        digits: digits + 1,
                        code,
                    };
                    return Ok(());
                }
                self.escape = Escape::None;
                self.unicode_escape(code, role, targets)
            }
        }
    }

    fn unicode_escape(
        &mut self,
        code: u32,
        role: StrRole,
        targets: &[FieldPath],
    ) -> Result<(), ParseErrorKind> {
        let scalar = match (self.high_surrogate.take(), code) {
            (Some(high), 0xDC00..=0xDFFF) => 0x10000 + ((high - 0xD800) << 10) + (code - 0xDC00),
            (Some(_), _) => return Err(ParseErrorKind::InvalidUnicodeEscape),
            (None, 0xD800..=0xDBFF) => {
                self.high_surrogate = Some(code);
                return Ok(());
            }
            (None, 0xDC00..=0xDFFF) => return Err(ParseErrorKind::InvalidUnicodeEscape),
            (None, code) => code,
        };
        let ch = char::from_u32(scalar).ok_or(ParseErrorKind::InvalidUnicodeEscape)?;
        let mut utf8 = [0u8; 4];
        for &byte in ch.encode_utf8(&mut utf8).as_bytes() {
            self.push_str_byte(byte, role, targets)?;
        }
        Ok(())
    }

    fn push_str_byte(
        &mut self,
        b: u8,
        role: StrRole,
        targets: &[FieldPath],
    ) -> Result<(), ParseErrorKind> {
        match role {
            StrRole::Key => {
                self.push_key_byte(b, targets);
                Ok(())
            }
            StrRole::Value => self.push_value_byte(b),
        }
    }

    // ── Numbers ───────────────────────────────────────────────────────────────

    fn number_byte(
        &mut self,
        b: u8,
        num: Num,
        targets: &[FieldPath],
        on_value: &mut OnValue<'_>,
    ) -> Result<Step, ParseErrorKind> {
        let next = match (num, b) {
            (Num::Minus, b'0') => Num::Zero,
            (Num::Minus, b'1'..=b'9') => Num::Int,
            (Num::Int, b'0'..=b'9') => Num::Int,
            (Num::Zero | Num::Int, b'.') => Num::FracStart,
            (Num::FracStart | Num::Frac, b'0'..=b'9') => Num::Frac,
            (Num::Zero | Num::Int | Num::Frac, b'e' | b'E') => Num::ExpStart,
            (Num::ExpStart, b'+' | b'-') => Num::ExpSign,
            (Num::ExpStart | Num::ExpSign | Num::Exp, b'0'..=b'9') => Num::Exp,
            (num, _) if num.is_terminal() => {
                // The delimiter belongs to whatever follows the number.
                self.complete_scalar(targets, on_value, |buf| {
                    String::from_utf8(buf)
                        .map(FieldValue::Number)
                        .map_err(|_| ParseErrorKind::InvalidUtf8)
                })?;
                return Ok(Step::Reprocess);
            }
            _ => return Err(ParseErrorKind::UnexpectedByte(b)),
        };
        self.push_value_byte(b)?;
        self.lex = Lex::Number(next);
        Ok(Step::Consumed)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Iterates the set bit positions of `mask`, lowest first.
fn bits(mask: u32) -> impl Iterator<Item = usize> {
    (0..32usize).filter(move |i| mask & (1 << i) != 0)
}

fn key_at(targets: &[FieldPath], target: usize, seg: usize) -> Option<&str> {
    targets[target].segments().get(seg).and_then(Segment::as_key)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(paths: &[&str]) -> FieldExtractor {
        FieldExtractor::new(paths.iter().map(|p| FieldPath::parse(p).unwrap())).unwrap()
    }

    /// Feeds `doc` in one chunk and returns every reported (path, value) pair.
    fn extract_all(paths: &[&str], doc: &str) -> Result<Vec<(String, FieldValue)>, ParseError> {
        let mut ex = extractor(paths);
        let mut seen = Vec::new();
        ex.feed(doc.as_bytes(), |m| {
            seen.push((m.path.to_string(), m.value));
        })?;
        ex.finish()?;
        Ok(seen)
    }

    fn api_key(doc: &str) -> Result<Vec<(String, FieldValue)>, ParseError> {
        extract_all(&["payload.apiKey"], doc)
    }

    fn s(v: &str) -> FieldValue {
        FieldValue::String(v.to_string())
    }

    // ── Matching ──────────────────────────────────────────────────────────────

    #[test]
    fn test_extracts_nested_string_value() {
        let seen = api_key(r#"{"type":"auth","payload":{"apiKey":"abc123"}}"#).unwrap();
        assert_eq!(seen, vec![("payload.apiKey".to_string(), s("abc123"))]);
    }

    #[test]
    fn test_missing_path_reports_nothing_and_is_not_an_error() {
        let seen = api_key(r#"{"type":"notify","payload":{"other":"x"}}"#).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_same_key_at_wrong_depth_is_ignored() {
        let seen = api_key(r#"{"apiKey":"top","payload":{"inner":{"apiKey":"deep"}}}"#).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_key_prefix_does_not_match() {
        let seen = api_key(r#"{"payload":{"apiKeyOld":"x","api":"y"}}"#).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_payload_as_array_does_not_match_object_path() {
        let seen = api_key(r#"{"payload":[{"apiKey":"x"}]}"#).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_array_marker_matches_every_element() {
        let seen = extract_all(&["items[].id"], r#"{"items":[{"id":1},{"id":2},{"x":3}]}"#)
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("items[].id".to_string(), FieldValue::Number("1".to_string())),
                ("items[].id".to_string(), FieldValue::Number("2".to_string())),
            ]
        );
    }

    #[test]
    fn test_scalar_kinds_are_reported() {
        let seen = extract_all(
            &["a.t", "a.f", "a.n", "a.num"],
            r#"{"a":{"t":true,"f":false,"n":null,"num":-12.5e3}}"#,
        )
        .unwrap();
        assert_eq!(
            seen.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
            vec![
                FieldValue::Bool(true),
                FieldValue::Bool(false),
                FieldValue::Null,
                FieldValue::Number("-12.5e3".to_string()),
            ]
        );
    }

    #[test]
    fn test_object_at_target_path_reports_nothing() {
        let seen = api_key(r#"{"payload":{"apiKey":{"nested":"x"}}}"#).unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_multiple_targets_report_with_their_index() {
        let mut ex = extractor(&["type", "payload.apiKey"]);
        let mut seen = Vec::new();
        ex.feed(br#"{"type":"auth","payload":{"apiKey":"k"}}"#, |m| {
            seen.push((m.index, m.value))
        })
        .unwrap();
        assert_eq!(seen, vec![(0, s("auth")), (1, s("k"))]);
    }

    #[test]
    fn test_duplicate_targets_are_collapsed() {
        let ex = extractor(&["payload.apiKey", "payload.apiKey"]);
        assert_eq!(ex.targets().len(), 1);
    }

    #[test]
    fn test_too_many_targets_is_rejected() {
        let paths = (0..=MAX_TARGETS).map(|i| FieldPath::parse(&format!("k{i}")).unwrap());
        assert!(matches!(
            FieldExtractor::new(paths),
            Err(PathError::TooManyPaths { .. })
        ));
    }

    // ── Escapes ───────────────────────────────────────────────────────────────

    #[test]
    fn test_escapes_in_value_are_decoded() {
        let seen = api_key(r#"{"payload":{"apiKey":"a\"b\\c\/d\n\u0041\u00e9"}}"#).unwrap();
        assert_eq!(seen[0].1, s("a\"b\\c/d\nAé"));
    }

    #[test]
    fn test_surrogate_pair_is_combined() {
        let seen = api_key(r#"{"payload":{"apiKey":"\ud83d\ude00"}}"#).unwrap();
        assert_eq!(seen[0].1, s("😀"));
    }

    #[test]
    fn test_escaped_key_still_matches() {
        let seen = api_key(r#"{"payload":{"api\u004bey":"k"}}"#).unwrap();
        assert_eq!(seen[0].1, s("k"));
    }

    #[test]
    fn test_lone_low_surrogate_is_rejected() {
        let err = api_key(r#"{"payload":{"apiKey":"\udc00"}}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidUnicodeEscape);
    }

    #[test]
    fn test_unpaired_high_surrogate_is_rejected() {
        let err = api_key(r#"{"payload":{"apiKey":"\ud83dx"}}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidUnicodeEscape);
    }

    #[test]
    fn test_unknown_escape_is_rejected() {
        let err = api_key(r#"{"a":"\q"}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidEscape(b'q'));
    }

    #[test]
    fn test_raw_control_character_is_rejected() {
        let err = api_key("{\"a\":\"x\ny\"}").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ControlCharacter(b'\n'));
    }

    // ── Malformed structure ───────────────────────────────────────────────────

    #[test]
    fn test_missing_colon_is_rejected_with_offset() {
        let err = api_key(r#"{"payload" {}}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedByte(b'{'));
        assert_eq!(err.offset, 11);
    }

    #[test]
    fn test_mismatched_bracket_is_rejected() {
        let err = api_key(r#"{"a":[1,2}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedByte(b'}'));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let err = api_key(r#"{"a":1} x"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TrailingData(b'x'));
    }

    #[test]
    fn test_truncated_message_fails_on_finish() {
        let err = api_key(r#"{"payload":{"apiKey":"abc"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedEnd);
    }

    #[test]
    fn test_malformed_value_reports_no_partial_value() {
        let result = api_key(r#"{"payload":{"apiKey":"abc\x"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_leading_zero_number_is_rejected() {
        let err = api_key(r#"{"a":01}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedByte(b'1'));
    }

    #[test]
    fn test_bad_literal_is_rejected() {
        let err = api_key(r#"{"a":tru}"#).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedByte(b'}'));
    }

    #[test]
    fn test_nesting_limit_is_enforced() {
        let doc = "[".repeat(MAX_DEPTH + 1);
        let err = api_key(&doc).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_oversized_captured_value_is_rejected() {
        let doc = format!(
            r#"{{"payload":{{"apiKey":"{}"}}}}"#,
            "k".repeat(MAX_VALUE_LEN + 1)
        );
        let err = api_key(&doc).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ValueTooLong);
    }

    #[test]
    fn test_oversized_uncaptured_value_is_accepted() {
        let doc = format!(r#"{{"blob":"{}"}}"#, "k".repeat(MAX_VALUE_LEN * 4));
        assert!(api_key(&doc).unwrap().is_empty());
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[test]
    fn test_feed_after_error_is_poisoned_until_reset() {
        let mut ex = extractor(&["payload.apiKey"]);
        assert!(ex.feed(b"{]", |_| {}).is_err());

        let err = ex.feed(b"{}", |_| {}).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Poisoned);

        ex.reset();
        assert_eq!(ex.feed(b"{}", |_| {}).unwrap(), Progress::Complete);
    }

    #[test]
    fn test_progress_reports_completion() {
        let mut ex = extractor(&["payload.apiKey"]);
        assert_eq!(ex.feed(b"{\"a\":", |_| {}).unwrap(), Progress::NeedMore);
        assert_eq!(ex.feed(b"1}", |_| {}).unwrap(), Progress::Complete);
        assert_eq!(ex.feed(b"  \n", |_| {}).unwrap(), Progress::Complete);
    }

    #[test]
    fn test_finish_discards_context_for_next_message() {
        let mut ex = extractor(&["payload.apiKey"]);
        ex.feed(br#"{"payload":{"apiKey":"one"}}"#, |_| {}).unwrap();
        ex.finish().unwrap();
        assert!(!ex.in_progress());

        let mut seen = Vec::new();
        ex.feed(br#"{"payload":{"apiKey":"two"}}"#, |m| seen.push(m.value))
            .unwrap();
        assert_eq!(seen, vec![s("two")]);
    }

    #[test]
    fn test_finish_without_message_is_ok() {
        let mut ex = extractor(&["payload.apiKey"]);
        assert!(ex.finish().is_ok());
    }

    #[test]
    fn test_top_level_number_completes_on_finish() {
        let mut ex = extractor(&["payload.apiKey"]);
        ex.feed(b"42", |_| {}).unwrap();
        assert!(ex.finish().is_ok());
    }

    #[test]
    fn test_matched_path_is_visible_mid_value() {
        let mut ex = extractor(&["payload.apiKey"]);
        ex.feed(br#"{"payload":{"apiKey":"ab"#, |_| {}).unwrap();
        assert_eq!(ex.matched_path().map(FieldPath::as_str), Some("payload.apiKey"));

        ex.feed(br#"c"}}"#, |_| {}).unwrap();
        assert_eq!(ex.matched_path(), None);
    }
}
