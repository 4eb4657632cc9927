//! Message decoding.

use glam::DVec3;

use crate::error::MessageError;

/// Cursor over an encoded handshake message.
#[derive(Clone, Debug)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    /// Read from `data`, starting at the beginning.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail if anything is left unread.
    pub fn finish(&self) -> Result<(), MessageError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(MessageError::TrailingBytes { count }),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MessageError> {
        if self.remaining() < n {
            return Err(MessageError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    // ── Primitives ──────────────────────────────────────────────

    /// Read a big-endian uint.
    pub fn read_uint(&mut self) -> Result<u32, MessageError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a signed int.
    pub fn read_int(&mut self) -> Result<i32, MessageError> {
        let raw = self.read_uint()?;
        let magnitude = (raw & 0x7fff_ffff) as i32;
        Ok(if raw & (1 << 31) != 0 {
            magnitude
        } else {
            -magnitude
        })
    }

    /// Read a length-prefixed byte array.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], MessageError> {
        let len = self.read_uint()? as usize;
        self.take(len)
    }

    /// Read a char array as text.
    pub fn read_str(&mut self) -> Result<&'a str, MessageError> {
        let b = self.read_bytes()?;
        std::str::from_utf8(b).map_err(|_| MessageError::InvalidText)
    }

    /// Read a double.
    pub fn read_double(&mut self) -> Result<f64, MessageError> {
        let text = self.read_str()?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| MessageError::InvalidDouble { text: text.into() })
    }

    /// Read a vector.
    pub fn read_vec(&mut self) -> Result<DVec3, MessageError> {
        Ok(DVec3::new(
            self.read_double()?,
            self.read_double()?,
            self.read_double()?,
        ))
    }

    /// Read a count followed by that many elements.
    pub fn read_array<T, E, F>(&mut self, mut each: F) -> Result<Vec<T>, E>
    where
        E: From<MessageError>,
        F: FnMut(&mut Self) -> Result<T, E>,
    {
        let n = self.read_uint()? as usize;
        // Every element takes at least one byte, so a count larger than the
        // rest of the message is certainly truncated.
        if n > self.remaining() {
            return Err(MessageError::Truncated {
                needed: n,
                remaining: self.remaining(),
            }
            .into());
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(each(self)?);
        }
        Ok(out)
    }

    /// Read a sub-message.
    pub fn read_submsg(&mut self) -> Result<MessageReader<'a>, MessageError> {
        Ok(MessageReader::new(self.read_bytes()?))
    }

    // ── Named fields ────────────────────────────────────────────

    /// Consume a field name, checking it is `name`.
    pub fn expect_name(&mut self, name: &str) -> Result<(), MessageError> {
        let found = self.read_str()?;
        if found != name {
            return Err(MessageError::NameMismatch {
                expected: name.into(),
                found: found.into(),
            });
        }
        Ok(())
    }

    /// Named uint.
    pub fn field_uint(&mut self, name: &str) -> Result<u32, MessageError> {
        self.expect_name(name)?;
        self.read_uint()
    }

    /// Named int.
    pub fn field_int(&mut self, name: &str) -> Result<i32, MessageError> {
        self.expect_name(name)?;
        self.read_int()
    }

    /// Named double.
    pub fn field_double(&mut self, name: &str) -> Result<f64, MessageError> {
        self.expect_name(name)?;
        self.read_double()
    }

    /// Named vector.
    pub fn field_vec(&mut self, name: &str) -> Result<DVec3, MessageError> {
        self.expect_name(name)?;
        self.read_vec()
    }

    /// Named array of uints.
    pub fn field_uints(&mut self, name: &str) -> Result<Vec<u32>, MessageError> {
        self.expect_name(name)?;
        self.read_array(|r| r.read_uint())
    }

    /// Named array of ints.
    pub fn field_ints(&mut self, name: &str) -> Result<Vec<i32>, MessageError> {
        self.expect_name(name)?;
        self.read_array(|r| r.read_int())
    }

    /// Named array of doubles.
    pub fn field_doubles(&mut self, name: &str) -> Result<Vec<f64>, MessageError> {
        self.expect_name(name)?;
        self.read_array(|r| r.read_double())
    }

    /// Named array of vectors.
    pub fn field_vecs(&mut self, name: &str) -> Result<Vec<DVec3>, MessageError> {
        self.expect_name(name)?;
        self.read_array(|r| r.read_vec())
    }

    /// Named array of records.
    pub fn field_records<T, E, F>(&mut self, name: &str, each: F) -> Result<Vec<T>, E>
    where
        E: From<MessageError>,
        F: FnMut(&mut Self) -> Result<T, E>,
    {
        self.expect_name(name)?;
        self.read_array(each)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MessageWriter;
    use proptest::prelude::*;

    #[test]
    fn reads_named_fields_in_order() {
        let mut w = MessageWriter::command("initialize_random").unwrap();
        w.field_uint("seed", 0xdead_beef).unwrap();
        w.field_vec("box_size", DVec3::new(1e-6, 2e-6, 3e-6)).unwrap();
        let bytes = w.into_bytes();

        let mut r = MessageReader::new(&bytes);
        assert_eq!(r.read_str().unwrap(), "initialize_random");
        assert_eq!(r.field_uint("seed").unwrap(), 0xdead_beef);
        let v = r.field_vec("box_size").unwrap();
        assert!((v.y - 2e-6).abs() < 1e-16);
        r.finish().unwrap();
    }

    #[test]
    fn misaligned_name_is_reported() {
        let mut w = MessageWriter::new();
        w.field_double("dt", 1e-9).unwrap();
        let bytes = w.into_bytes();
        let err = MessageReader::new(&bytes).field_double("T").unwrap_err();
        assert_eq!(
            err,
            MessageError::NameMismatch {
                expected: "T".into(),
                found: "dt".into()
            }
        );
    }

    #[test]
    fn truncated_message() {
        let mut r = MessageReader::new(&[0, 0, 0, 9, b'a']);
        assert!(matches!(r.read_str(), Err(MessageError::Truncated { .. })));
    }

    #[test]
    fn absurd_array_count_is_rejected_early() {
        let mut r = MessageReader::new(&[0xff, 0xff, 0xff, 0xff]);
        let res: Result<Vec<u32>, MessageError> = r.read_array(|r| r.read_uint());
        assert!(res.is_err());
    }

    #[test]
    fn records_nest() {
        let rules = [(1, 0, 7), (2, 1, 8)];
        let mut w = MessageWriter::new();
        w.field_records("comm_rules", &rules, |w, &(inst, ch, tag)| {
            w.field_int("inst", inst)?;
            w.field_int("comm_index", ch)?;
            w.field_int("tag", tag)
        })
        .unwrap();
        let bytes = w.into_bytes();
        let mut r = MessageReader::new(&bytes);
        let back: Vec<(i32, i32, i32)> = r
            .field_records("comm_rules", |r| {
                Ok::<_, MessageError>((
                    r.field_int("inst")?,
                    r.field_int("comm_index")?,
                    r.field_int("tag")?,
                ))
            })
            .unwrap();
        assert_eq!(back, rules.to_vec());
    }

    #[test]
    fn submessage_is_isolated() {
        let mut inner = MessageWriter::new();
        inner.write_uint(3).unwrap();
        let mut outer = MessageWriter::new();
        outer.write_submsg(&inner).unwrap();
        outer.write_uint(4).unwrap();
        let bytes = outer.into_bytes();
        let mut r = MessageReader::new(&bytes);
        let mut sub = r.read_submsg().unwrap();
        assert_eq!(sub.read_uint().unwrap(), 3);
        sub.finish().unwrap();
        assert_eq!(r.read_uint().unwrap(), 4);
    }

    proptest! {
        #[test]
        fn ints_survive_the_sign_flag(v in -0x7fff_ffffi32..=0x7fff_ffff) {
            let mut w = MessageWriter::new();
            w.write_int(v).unwrap();
            let bytes = w.into_bytes();
            prop_assert_eq!(MessageReader::new(&bytes).read_int().unwrap(), v);
        }

        #[test]
        fn doubles_keep_eleven_significant_digits(v in -1e12f64..1e12) {
            let mut w = MessageWriter::new();
            w.write_double(v).unwrap();
            let bytes = w.into_bytes();
            let back = MessageReader::new(&bytes).read_double().unwrap();
            prop_assert!((back - v).abs() <= v.abs() * 1e-10 + f64::MIN_POSITIVE);
        }
    }
}
