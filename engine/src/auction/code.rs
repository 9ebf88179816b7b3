//! Auction code generation: a two-letter prefix from the card name plus
//! four random digits, e.g. "ST4821" for "Stage Light".

use rand::Rng;

/// First two alphabetic characters of the card name, uppercased. Names
/// with fewer than two letters pad with 'X'.
pub fn prefix_for(card_name: &str) -> String {
    let mut prefix: String = card_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect::<String>()
        .to_ascii_uppercase();
    while prefix.len() < 2 {
        prefix.push('X');
    }
    prefix
}

pub fn random_code<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    format!("{prefix}{:04}", rng.gen_range(0..10_000))
}

/// Attempts allowed before code generation gives up on collisions.
pub const MAX_CODE_ATTEMPTS: u32 = 10;

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn prefix_takes_first_two_letters() {
        assert_eq!(prefix_for("Stage Light"), "ST");
        assert_eq!(prefix_for("neon sign"), "NE");
    }

    #[test]
    fn prefix_skips_non_letters() {
        assert_eq!(prefix_for("7th Avenue"), "TH");
        assert_eq!(prefix_for("  ~vinyl~"), "VI");
    }

    #[test]
    fn short_names_pad_with_x() {
        assert_eq!(prefix_for("q"), "QX");
        assert_eq!(prefix_for("#1"), "XX");
    }

    #[test]
    fn code_is_prefix_plus_four_digits() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..100 {
            let code = random_code(&mut rng, "AB");
            assert_eq!(code.len(), 6);
            assert!(code.starts_with("AB"));
            assert!(code[2..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
