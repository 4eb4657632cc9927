//! Message encoding.

use glam::DVec3;

use crate::error::MessageError;

/// Format a double the way the controller protocol expects: ten digits
/// after the point and a signed, at least two digit exponent.
pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let s = format!("{v:.10e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

/// Builds a handshake message in memory.
#[derive(Clone, Debug, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    /// An empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// A message starting with a command name.
    pub fn command(name: &str) -> Result<Self, MessageError> {
        let mut w = Self::new();
        w.write_str(name)?;
        Ok(w)
    }

    /// Encoded bytes so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // ── Primitives ──────────────────────────────────────────────

    /// Write a big-endian uint.
    pub fn write_uint(&mut self, v: u32) -> Result<(), MessageError> {
        self.buf.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Write a signed int as magnitude plus non-negative flag.
    pub fn write_int(&mut self, v: i32) -> Result<(), MessageError> {
        let magnitude = v.unsigned_abs();
        if magnitude > 0x7fff_ffff {
            return Err(MessageError::IntOutOfRange { value: v.into() });
        }
        let flag = if v >= 0 { 1u32 << 31 } else { 0 };
        self.write_uint(magnitude | flag)
    }

    fn write_len(&mut self, len: usize) -> Result<(), MessageError> {
        let n = u32::try_from(len).map_err(|_| MessageError::LengthOverflow { len })?;
        self.write_uint(n)
    }

    /// Write a length-prefixed byte array.
    pub fn write_bytes(&mut self, b: &[u8]) -> Result<(), MessageError> {
        self.write_len(b.len())?;
        self.buf.extend_from_slice(b);
        Ok(())
    }

    /// Write a string as a char array.
    pub fn write_str(&mut self, s: &str) -> Result<(), MessageError> {
        self.write_bytes(s.as_bytes())
    }

    /// Write a double as text.
    pub fn write_double(&mut self, v: f64) -> Result<(), MessageError> {
        self.write_str(&format_double(v))
    }

    /// Write a vector as three doubles.
    pub fn write_vec(&mut self, v: DVec3) -> Result<(), MessageError> {
        self.write_double(v.x)?;
        self.write_double(v.y)?;
        self.write_double(v.z)
    }

    /// Write a count followed by each element.
    pub fn write_array<T, F>(&mut self, items: &[T], mut each: F) -> Result<(), MessageError>
    where
        F: FnMut(&mut Self, &T) -> Result<(), MessageError>,
    {
        self.write_len(items.len())?;
        for item in items {
            each(self, item)?;
        }
        Ok(())
    }

    /// Write another message as a sub-message.
    pub fn write_submsg(&mut self, inner: &MessageWriter) -> Result<(), MessageError> {
        self.write_bytes(&inner.buf)
    }

    // ── Named fields ────────────────────────────────────────────

    /// Named uint.
    pub fn field_uint(&mut self, name: &str, v: u32) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_uint(v)
    }

    /// Named int.
    pub fn field_int(&mut self, name: &str, v: i32) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_int(v)
    }

    /// Named double.
    pub fn field_double(&mut self, name: &str, v: f64) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_double(v)
    }

    /// Named vector.
    pub fn field_vec(&mut self, name: &str, v: DVec3) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_vec(v)
    }

    /// Named array of uints.
    pub fn field_uints(&mut self, name: &str, v: &[u32]) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_array(v, |w, &x| w.write_uint(x))
    }

    /// Named array of ints.
    pub fn field_ints(&mut self, name: &str, v: &[i32]) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_array(v, |w, &x| w.write_int(x))
    }

    /// Named array of doubles.
    pub fn field_doubles(&mut self, name: &str, v: &[f64]) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_array(v, |w, &x| w.write_double(x))
    }

    /// Named array of vectors.
    pub fn field_vecs(&mut self, name: &str, v: &[DVec3]) -> Result<(), MessageError> {
        self.write_str(name)?;
        self.write_array(v, |w, &x| w.write_vec(x))
    }

    /// Named array of records, each written by `each` as a run of named
    /// fields.
    pub fn field_records<T, F>(&mut self, name: &str, items: &[T], each: F) -> Result<(), MessageError>
    where
        F: FnMut(&mut Self, &T) -> Result<(), MessageError>,
    {
        self.write_str(name)?;
        self.write_array(items, each)
    }
}
