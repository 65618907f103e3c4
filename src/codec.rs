//! Item (de)serialization seam.
//!
//! The spool never interprets item bytes itself: callers supply a
//! [`DataCodec`] pair and the queue stores exactly what `encode` produced.
//! Payload sizes may vary from frame to frame.

/// Error type codecs report; wrapped into a queue error at the call site.
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Encodes items to bytes on the producer side and decodes them back on the
/// consumer side.
///
/// Implementations must be total over the item domain: every item the stream
/// can carry must encode, and every payload produced by `encode` must decode
/// to an equal item.
pub trait DataCodec<T>: Send + Sync + 'static {
    /// Appends the encoded form of `item` to `out`.
    ///
    /// `out` arrives with the frame prefix already reserved; implementations
    /// must only append.
    ///
    /// # Errors
    ///
    /// Encode failures are fatal to the stream and surface downstream.
    fn encode(&self, item: &T, out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decodes one item from the exact payload bytes `encode` produced.
    ///
    /// # Errors
    ///
    /// Decode failures are fatal to the stream and surface downstream.
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Adapts a pair of closures into a [`DataCodec`].
pub struct FnCodec<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnCodec<E, D> {
    /// Creates a codec from an encode and a decode closure.
    pub const fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<T, E, D> DataCodec<T> for FnCodec<E, D>
where
    E: Fn(&T, &mut Vec<u8>) -> Result<(), CodecError> + Send + Sync + 'static,
    D: Fn(&[u8]) -> Result<T, CodecError> + Send + Sync + 'static,
{
    fn encode(&self, item: &T, out: &mut Vec<u8>) -> Result<(), CodecError> {
        (self.encode)(item, out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        (self.decode)(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_codec() -> impl DataCodec<u32> {
        FnCodec::new(
            |item: &u32, out: &mut Vec<u8>| -> Result<(), CodecError> {
                out.extend_from_slice(&item.to_le_bytes());
                Ok(())
            },
            |bytes: &[u8]| -> Result<u32, CodecError> {
                let arr: [u8; 4] = bytes.try_into().map_err(|_| "bad length")?;
                Ok(u32::from_le_bytes(arr))
            },
        )
    }

    #[test]
    fn test_fn_codec_roundtrip() {
        let codec = u32_codec();
        let mut buf = Vec::new();
        codec.encode(&0xDEAD_BEEF, &mut buf).unwrap();
        assert_eq!(codec.decode(&buf).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_fn_codec_decode_error() {
        let codec = u32_codec();
        assert!(codec.decode(&[1, 2]).is_err());
    }
}
