use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

/// 256 bits of entropy; refresh tokens carry no structure of their own.
const REFRESH_TOKEN_BYTES: usize = 32;
const CLIENT_SECRET_BYTES: usize = 32;

pub fn generate_refresh_token() -> String {
    generate_random_encoded_bytes(REFRESH_TOKEN_BYTES)
}

pub fn generate_client_secret() -> String {
    generate_random_encoded_bytes(CLIENT_SECRET_BYTES)
}

fn generate_random_encoded_bytes(size: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = vec![0u8; size];
    rng.fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_refresh_tokens_are_url_safe_and_unique() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_refresh_token()).collect();
        assert_eq!(tokens.len(), 64);
        for token in &tokens {
            // 32 bytes -> 43 base64 characters without padding
            assert_eq!(token.len(), 43);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }
}
