//! Incremental record decoder
//!
//! [`RecordDecoder`] turns a byte stream into the sequence of values selected
//! by a [`PathSelector`], one value per pull. The full document is never held
//! in memory: the decoder keeps a fixed-size read window, a scratch buffer for
//! the token being lexed, a parser stack with one frame per open container,
//! and the partially built record (if the cursor is inside one). Everything
//! else is discarded as soon as it has been parsed.
//!
//! The decoder is single-pass and forward-only. A second pass needs a fresh
//! reader positioned at offset 0.

use jsl_format::constants::READ_CHUNK_BYTES;
use jsl_format::{
    is_json_whitespace, DecodeReason, DecodedValue, JslError, Limits, PathSelector, Result,
    Segment,
};
use serde_json::{Map, Number, Value};
use smallvec::SmallVec;
use std::io::{ErrorKind, Read};
use std::iter::FusedIterator;
use std::mem;

/// Counters describing one decoding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderMetrics {
    /// Bytes pulled from the source so far
    pub bytes_consumed: u64,
    /// Records yielded so far
    pub records_emitted: u64,
    /// Deepest structural nesting seen
    pub peak_depth: usize,
    /// Largest serialized span of a single record
    pub peak_record_bytes: u64,
    /// Largest scratch allocation used for one string or number token
    pub peak_scratch_bytes: usize,
    /// Size of the fixed read window
    pub window_bytes: usize,
}

impl DecoderMetrics {
    /// Upper bound on bytes held by the decoder at any point of the pass.
    ///
    /// Independent of document length: it depends only on the window size,
    /// the largest record, the longest token and the deepest nesting.
    pub fn peak_buffer_bytes(&self) -> u64 {
        self.window_bytes as u64
            + self.peak_record_bytes
            + self.peak_scratch_bytes as u64
            + (self.peak_depth * mem::size_of::<Frame>()) as u64
    }
}

/// Fixed-size sliding window over the source
struct ByteWindow<R> {
    reader: R,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    /// Absolute offset of `buf[0]`
    base: u64,
    eof: bool,
}

impl<R: Read> ByteWindow<R> {
    fn new(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            len: 0,
            base: 0,
            eof: false,
        }
    }

    fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        self.base += self.len as u64;
        self.pos = 0;
        self.len = 0;
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.len = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.pos == self.len && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.pos]))
    }

    /// Advance past a byte previously returned by `peek`.
    fn bump(&mut self) {
        self.pos += 1;
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            match self.peek()? {
                Some(byte) if is_json_whitespace(byte) => self.pos += 1,
                other => return Ok(other),
            }
        }
    }
}

/// What the innermost open container accepts next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    KeyOrEnd,
    Key,
    Colon,
    Value,
    ValueOrEnd,
    CommaOrEnd,
}

/// One open container on the parser stack
#[derive(Debug)]
struct Frame {
    is_array: bool,
    expect: Expect,
    /// Most recent member key (objects only); drives selector matching.
    key: Option<String>,
}

/// A container of the record being materialized
enum Partial {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl Partial {
    fn into_value(self) -> Value {
        match self {
            Partial::Object(map) => Value::Object(map),
            Partial::Array(items) => Value::Array(items),
        }
    }
}

/// The record currently being materialized
struct Capture {
    start: u64,
    partials: Vec<Partial>,
}

/// Lazy, single-pass iterator over the records of a JSON byte stream
///
/// Yields `Ok(value)` for each selected value in source order. On malformed
/// input it yields one `Err` carrying the byte offset and then ends; records
/// yielded before the error remain valid.
pub struct RecordDecoder<R> {
    input: ByteWindow<R>,
    selector: PathSelector,
    limits: Limits,
    frames: SmallVec<[Frame; 16]>,
    capture: Option<Capture>,
    scratch: Vec<u8>,
    root_seen: bool,
    finished: bool,
    metrics: DecoderMetrics,
}

impl<R: Read> RecordDecoder<R> {
    /// Create a decoder with default limits
    pub fn new(reader: R, selector: PathSelector) -> Self {
        Self::build(reader, selector, Limits::default(), READ_CHUNK_BYTES)
    }

    /// Create a decoder with explicit limits
    pub fn with_limits(reader: R, selector: PathSelector, limits: Limits) -> Result<Self> {
        limits.validate()?;
        Ok(Self::build(reader, selector, limits, READ_CHUNK_BYTES))
    }

    /// Create a decoder with an explicit read window size (mainly for tests)
    pub fn with_window(
        reader: R,
        selector: PathSelector,
        limits: Limits,
        window_bytes: usize,
    ) -> Result<Self> {
        limits.validate()?;
        Ok(Self::build(reader, selector, limits, window_bytes))
    }

    fn build(reader: R, selector: PathSelector, limits: Limits, window_bytes: usize) -> Self {
        let input = ByteWindow::new(reader, window_bytes);
        let metrics = DecoderMetrics {
            window_bytes: input.buf.len(),
            ..DecoderMetrics::default()
        };
        Self {
            input,
            selector,
            limits,
            frames: SmallVec::new(),
            capture: None,
            scratch: Vec::new(),
            root_seen: false,
            finished: false,
            metrics,
        }
    }

    /// Selector this decoder was built with
    pub fn selector(&self) -> &PathSelector {
        &self.selector
    }

    /// Absolute offset of the next unread byte
    pub fn offset(&self) -> u64 {
        self.input.offset()
    }

    /// Snapshot of the pass counters
    pub fn metrics(&self) -> DecoderMetrics {
        DecoderMetrics {
            bytes_consumed: self.input.base + self.input.len as u64,
            ..self.metrics.clone()
        }
    }

    /// Consume the decoder and return the underlying reader
    pub fn into_inner(self) -> R {
        self.input.reader
    }

    fn advance(&mut self) -> Result<Option<DecodedValue>> {
        loop {
            let byte = self.input.skip_whitespace()?;

            if let Some(capture) = &self.capture {
                let span = self.input.offset().saturating_sub(capture.start);
                if span > self.limits.max_record_bytes {
                    return Err(self.limit(format!(
                        "record exceeds max_record_bytes {}",
                        self.limits.max_record_bytes
                    )));
                }
            }

            let Some(expect) = self.frames.last().map(|frame| frame.expect) else {
                match (self.root_seen, byte) {
                    (false, None) => return Err(self.error(DecodeReason::UnexpectedEof)),
                    (false, Some(b)) => {
                        self.root_seen = true;
                        if let Some(value) = self.begin_value(b)? {
                            return Ok(Some(value));
                        }
                        continue;
                    }
                    (true, None) => return Ok(None),
                    (true, Some(_)) => return Err(self.error(DecodeReason::TrailingCharacters)),
                }
            };

            let Some(b) = byte else {
                return Err(self.error(DecodeReason::UnexpectedEof));
            };

            let emitted = match (expect, b) {
                (Expect::KeyOrEnd | Expect::Key, b'"') => {
                    self.input.bump();
                    let key = self.read_string()?;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.key = Some(key);
                        frame.expect = Expect::Colon;
                    }
                    None
                }
                (Expect::KeyOrEnd, b'}') => self.end_container()?,
                (Expect::Colon, b':') => {
                    self.input.bump();
                    self.set_expect(Expect::Value);
                    None
                }
                (Expect::ValueOrEnd, b']') => self.end_container()?,
                (Expect::Value | Expect::ValueOrEnd, _) => self.begin_value(b)?,
                (Expect::CommaOrEnd, b',') => {
                    self.input.bump();
                    let in_array = self.frames.last().map_or(false, |frame| frame.is_array);
                    self.set_expect(if in_array { Expect::Value } else { Expect::Key });
                    None
                }
                (Expect::CommaOrEnd, b']') if self.in_array() => self.end_container()?,
                (Expect::CommaOrEnd, b'}') if !self.in_array() => self.end_container()?,
                _ => return Err(self.error(DecodeReason::UnexpectedByte(b))),
            };

            if let Some(value) = emitted {
                return Ok(Some(value));
            }
        }
    }

    fn in_array(&self) -> bool {
        self.frames.last().map_or(false, |frame| frame.is_array)
    }

    fn set_expect(&mut self, expect: Expect) {
        if let Some(frame) = self.frames.last_mut() {
            frame.expect = expect;
        }
    }

    /// Whether a value starting at the current position is a record.
    fn selected(&self) -> bool {
        let segments = self.selector.segments();
        segments.len() == self.frames.len()
            && self
                .frames
                .iter()
                .zip(segments)
                .all(|(frame, segment)| match segment {
                    Segment::Item => frame.is_array,
                    Segment::Key(key) => {
                        !frame.is_array && frame.key.as_deref() == Some(key.as_str())
                    }
                })
    }

    fn begin_value(&mut self, byte: u8) -> Result<Option<DecodedValue>> {
        if self.capture.is_none() && self.selected() {
            self.capture = Some(Capture {
                start: self.input.offset(),
                partials: Vec::new(),
            });
        }

        match byte {
            b'{' | b'[' => {
                if self.frames.len() >= self.limits.max_depth {
                    return Err(self.limit(format!(
                        "nesting exceeds max_depth {}",
                        self.limits.max_depth
                    )));
                }
                self.input.bump();
                let is_array = byte == b'[';
                self.frames.push(Frame {
                    is_array,
                    expect: if is_array {
                        Expect::ValueOrEnd
                    } else {
                        Expect::KeyOrEnd
                    },
                    key: None,
                });
                self.metrics.peak_depth = self.metrics.peak_depth.max(self.frames.len());
                if let Some(capture) = self.capture.as_mut() {
                    capture.partials.push(if is_array {
                        Partial::Array(Vec::new())
                    } else {
                        Partial::Object(Map::new())
                    });
                }
                Ok(None)
            }
            b'"' => {
                self.input.bump();
                let text = self.read_string()?;
                self.complete_scalar(Value::String(text))
            }
            b'-' | b'0'..=b'9' => {
                let number = self.read_number()?;
                self.complete_scalar(Value::Number(number))
            }
            b't' => {
                self.expect_literal(b"true")?;
                self.complete_scalar(Value::Bool(true))
            }
            b'f' => {
                self.expect_literal(b"false")?;
                self.complete_scalar(Value::Bool(false))
            }
            b'n' => {
                self.expect_literal(b"null")?;
                self.complete_scalar(Value::Null)
            }
            other => Err(self.error(DecodeReason::UnexpectedByte(other))),
        }
    }

    fn complete_scalar(&mut self, value: Value) -> Result<Option<DecodedValue>> {
        let value = self.capture.is_some().then_some(value);
        self.complete_value(value)
    }

    fn end_container(&mut self) -> Result<Option<DecodedValue>> {
        self.input.bump();
        self.frames.pop();
        let value = self
            .capture
            .as_mut()
            .and_then(|capture| capture.partials.pop())
            .map(Partial::into_value);
        self.complete_value(value)
    }

    /// Attach a finished value to its parent, or emit it if it is a record.
    fn complete_value(&mut self, value: Option<Value>) -> Result<Option<DecodedValue>> {
        self.set_expect(Expect::CommaOrEnd);

        let (Some(value), Some(capture)) = (value, self.capture.as_mut()) else {
            return Ok(None);
        };

        if capture.partials.is_empty() {
            let span = self.input.offset().saturating_sub(capture.start);
            self.capture = None;
            self.metrics.records_emitted += 1;
            self.metrics.peak_record_bytes = self.metrics.peak_record_bytes.max(span);
            return Ok(Some(value));
        }

        match capture.partials.last_mut() {
            Some(Partial::Array(items)) => items.push(value),
            Some(Partial::Object(map)) => {
                let key = self
                    .frames
                    .last_mut()
                    .and_then(|frame| frame.key.take())
                    .ok_or_else(|| JslError::Internal("object member without key".into()))?;
                // Duplicate keys: last write wins, first position kept.
                map.insert(key, value);
            }
            None => {}
        }
        Ok(None)
    }

    fn expect_literal(&mut self, literal: &'static [u8]) -> Result<()> {
        for &expected in literal {
            match self.input.peek()? {
                Some(b) if b == expected => self.input.bump(),
                Some(b) => return Err(self.error(DecodeReason::UnexpectedByte(b))),
                None => return Err(self.error(DecodeReason::UnexpectedEof)),
            }
        }
        Ok(())
    }

    /// Lex a string body; the opening quote has been consumed.
    fn read_string(&mut self) -> Result<String> {
        let start = self.input.offset().saturating_sub(1);
        self.scratch.clear();

        loop {
            if self.input.pos == self.input.len && !self.input.fill()? {
                return Err(self.error(DecodeReason::UnexpectedEof));
            }

            let window = &self.input.buf[self.input.pos..self.input.len];
            let run = window
                .iter()
                .position(|&b| b == b'"' || b == b'\\' || b < 0x20)
                .unwrap_or(window.len());
            self.scratch.extend_from_slice(&window[..run]);
            self.input.pos += run;
            self.check_string_len()?;

            if self.input.pos == self.input.len {
                continue;
            }
            match self.input.buf[self.input.pos] {
                b'"' => {
                    self.input.bump();
                    break;
                }
                b'\\' => {
                    self.input.bump();
                    self.read_escape()?;
                    self.check_string_len()?;
                }
                _ => return Err(self.error(DecodeReason::ControlCharacter)),
            }
        }

        self.metrics.peak_scratch_bytes =
            self.metrics.peak_scratch_bytes.max(self.scratch.capacity());

        match std::str::from_utf8(&self.scratch) {
            Ok(text) => Ok(text.to_owned()),
            Err(_) => Err(JslError::decode(start, DecodeReason::InvalidUtf8)),
        }
    }

    fn check_string_len(&self) -> Result<()> {
        if self.scratch.len() > self.limits.max_string_bytes {
            return Err(self.limit(format!(
                "string exceeds max_string_bytes {}",
                self.limits.max_string_bytes
            )));
        }
        Ok(())
    }

    /// Decode one escape; the backslash has been consumed.
    fn read_escape(&mut self) -> Result<()> {
        let Some(byte) = self.input.next_byte()? else {
            return Err(self.error(DecodeReason::UnexpectedEof));
        };
        let decoded = match byte {
            b'"' => b'"',
            b'\\' => b'\\',
            b'/' => b'/',
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'u' => {
                let ch = self.read_unicode_escape()?;
                let mut utf8 = [0u8; 4];
                self.scratch
                    .extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
                return Ok(());
            }
            _ => return Err(self.error(DecodeReason::InvalidEscape)),
        };
        self.scratch.push(decoded);
        Ok(())
    }

    /// Decode the payload of `\uXXXX`, pairing surrogates.
    fn read_unicode_escape(&mut self) -> Result<char> {
        let escape_start = self.input.offset().saturating_sub(2);
        let high = self.read_hex4()?;

        let code = match high {
            0xD800..=0xDBFF => {
                for expected in [b'\\', b'u'] {
                    match self.input.next_byte()? {
                        Some(b) if b == expected => {}
                        Some(_) => {
                            return Err(JslError::decode(
                                escape_start,
                                DecodeReason::LoneSurrogate,
                            ))
                        }
                        None => return Err(self.error(DecodeReason::UnexpectedEof)),
                    }
                }
                let low = self.read_hex4()?;
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(JslError::decode(escape_start, DecodeReason::LoneSurrogate));
                }
                0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(JslError::decode(escape_start, DecodeReason::LoneSurrogate))
            }
            other => u32::from(other),
        };

        char::from_u32(code)
            .ok_or_else(|| JslError::decode(escape_start, DecodeReason::InvalidEscape))
    }

    fn read_hex4(&mut self) -> Result<u16> {
        let mut value: u16 = 0;
        for _ in 0..4 {
            let Some(byte) = self.input.peek()? else {
                return Err(self.error(DecodeReason::UnexpectedEof));
            };
            let digit = match byte {
                b'0'..=b'9' => byte - b'0',
                b'a'..=b'f' => byte - b'a' + 10,
                b'A'..=b'F' => byte - b'A' + 10,
                _ => return Err(self.error(DecodeReason::InvalidEscape)),
            };
            self.input.bump();
            value = (value << 4) | u16::from(digit);
        }
        Ok(value)
    }

    /// Lex a number following the RFC 8259 grammar.
    fn read_number(&mut self) -> Result<Number> {
        let start = self.input.offset();
        self.scratch.clear();

        let negative = self.input.peek()? == Some(b'-');
        if negative {
            self.scratch.push(b'-');
            self.input.bump();
        }

        match self.input.peek()? {
            Some(b'0') => {
                self.scratch.push(b'0');
                self.input.bump();
            }
            Some(b'1'..=b'9') => {
                self.take_digits()?;
            }
            Some(_) => return Err(self.error(DecodeReason::InvalidNumber)),
            None => return Err(self.error(DecodeReason::UnexpectedEof)),
        }

        let mut integral = true;
        if self.input.peek()? == Some(b'.') {
            integral = false;
            self.scratch.push(b'.');
            self.input.bump();
            if self.take_digits()? == 0 {
                return Err(self.error(DecodeReason::InvalidNumber));
            }
        }

        if let Some(marker @ (b'e' | b'E')) = self.input.peek()? {
            integral = false;
            self.scratch.push(marker);
            self.input.bump();
            if let Some(sign @ (b'+' | b'-')) = self.input.peek()? {
                self.scratch.push(sign);
                self.input.bump();
            }
            if self.take_digits()? == 0 {
                return Err(self.error(DecodeReason::InvalidNumber));
            }
        }

        self.metrics.peak_scratch_bytes =
            self.metrics.peak_scratch_bytes.max(self.scratch.capacity());

        // The grammar above only admits ASCII.
        let text = std::str::from_utf8(&self.scratch)
            .map_err(|_| JslError::decode(start, DecodeReason::InvalidNumber))?;
        parse_number(text, negative, integral)
            .ok_or_else(|| JslError::decode(start, DecodeReason::InvalidNumber))
    }

    fn take_digits(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(byte @ b'0'..=b'9') = self.input.peek()? {
            self.scratch.push(byte);
            self.input.bump();
            count += 1;
        }
        Ok(count)
    }

    fn error(&self, reason: DecodeReason) -> JslError {
        JslError::decode(self.input.offset(), reason)
    }

    fn limit(&self, what: String) -> JslError {
        JslError::LimitExceeded {
            offset: self.input.offset(),
            what,
        }
    }
}

/// Convert validated number text the way `serde_json` does: integers that fit
/// become `u64`/`i64`, everything else a correctly rounded `f64`.
fn parse_number(text: &str, negative: bool, integral: bool) -> Option<Number> {
    if integral {
        if negative {
            if let Ok(magnitude) = text[1..].parse::<u64>() {
                if magnitude == 0 {
                    return Number::from_f64(-0.0);
                }
                if magnitude <= i64::MAX as u64 + 1 {
                    return Some(Number::from((magnitude as i128).wrapping_neg() as i64));
                }
            }
        } else if let Ok(value) = text.parse::<u64>() {
            return Some(Number::from(value));
        }
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = Result<DecodedValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                self.capture = None;
                self.frames.clear();
                Some(Err(err))
            }
        }
    }
}

impl<R: Read> FusedIterator for RecordDecoder<R> {}
