#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    InvalidKey,
    InvalidCiphertext,
    InvalidPadding,
    InvalidSignature,
    IdMismatch,
    SerializationFailed,
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
