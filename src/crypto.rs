use secrecy::{ExposeSecret, Secret};

/// Compare a caller-supplied secret with the configured one in constant time
pub fn secrets_match(provided: &str, expected: &Secret<String>) -> bool {
    constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes())
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}
