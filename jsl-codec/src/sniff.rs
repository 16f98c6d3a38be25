//! Top-level structure detection
//!
//! Sniffing reads forward only as far as the first non-whitespace byte and
//! never fails: empty input and read errors both classify as
//! [`Structure::Unknown`].

use jsl_format::{is_json_whitespace, Structure};
use std::io::{ErrorKind, Read};

/// Classify the stream by its first non-whitespace byte.
///
/// Consumes the leading whitespace and the classifying byte from `reader`;
/// callers needing offset 0 again reopen or replay the source.
pub fn sniff<R: Read>(reader: &mut R) -> Structure {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Structure::Unknown,
            Ok(_) if is_json_whitespace(byte[0]) => continue,
            Ok(_) => return Structure::from_first_byte(byte[0]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(error = %err, "structure detection failed");
                return Structure::Unknown;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn classifies_first_significant_byte() {
        assert_eq!(sniff(&mut Cursor::new(b"[1,2]".to_vec())), Structure::Array);
        assert_eq!(sniff(&mut Cursor::new(b" \n\t{}".to_vec())), Structure::Object);
        assert_eq!(sniff(&mut Cursor::new(b"\"text\"".to_vec())), Structure::Unknown);
        assert_eq!(sniff(&mut Cursor::new(b"42".to_vec())), Structure::Unknown);
    }

    #[test]
    fn empty_and_blank_input_are_unknown() {
        assert_eq!(sniff(&mut Cursor::new(Vec::new())), Structure::Unknown);
        assert_eq!(sniff(&mut Cursor::new(b"   \r\n".to_vec())), Structure::Unknown);
    }

    #[test]
    fn reads_only_up_to_first_significant_byte() {
        let mut cursor = Cursor::new(b"  [1]".to_vec());
        assert_eq!(sniff(&mut cursor), Structure::Array);
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn read_errors_degrade_to_unknown() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::PermissionDenied, "denied"))
            }
        }
        assert_eq!(sniff(&mut Broken), Structure::Unknown);
    }
}
