/// Incremental UTF-8 decoder for streamed response bodies.
///
/// Network chunks may end inside a multi-byte sequence; the incomplete tail is
/// held back until the next chunk completes it. Invalid sequences decode to
/// U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Feed raw bytes and return every character that is now complete.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());

                    match error.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush any held-back bytes at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Utf8Decoder;

    #[test]
    fn split_multibyte_character_is_held_until_complete() {
        let bytes = "é".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..]), "é");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn finish_flushes_truncated_tail_lossily() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&"中".as_bytes()[..2]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
        assert!(!decoder.has_pending());
    }
}
