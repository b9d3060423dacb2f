use rand::Rng;

/// Hex digits in a correlation token.
pub const TOKEN_LEN: usize = 12;

/// Draw a token: [`TOKEN_LEN`] lowercase hex digits.
///
/// Only needs to be unlikely to collide with the calls pending at the same
/// time; callers regenerate on collision.
pub fn generate() -> String {
    let bits: u64 = rand::thread_rng().gen::<u64>() >> (64 - TOKEN_LEN * 4);
    format!("{bits:0width$x}", width = TOKEN_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_fixed_width_hex() {
        for _ in 0..256 {
            let token = generate();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn tokens_vary() {
        let tokens: std::collections::HashSet<String> = (0..64).map(|_| generate()).collect();
        assert!(tokens.len() > 60);
    }
}
