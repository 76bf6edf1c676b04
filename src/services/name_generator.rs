use rand::{rngs::OsRng, Rng, RngCore};

/// Characters a share name is drawn from
pub const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Default share name length
pub const DEFAULT_NAME_LENGTH: usize = 8;

/// Longest name the store will look up
pub const MAX_NAME_LENGTH: usize = 64;

/// Produces candidate share names. Uniqueness is the store's concern.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Draws names uniformly from [`NAME_CHARSET`] using the operating system RNG
#[derive(Debug, Clone)]
pub struct RandomNameGenerator {
    length: usize,
}

impl RandomNameGenerator {
    /// `length` is clamped to `1..=MAX_NAME_LENGTH` so every generated name
    /// passes [`is_valid_name`].
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(1, MAX_NAME_LENGTH),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomNameGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_LENGTH)
    }
}

impl NameGenerator for RandomNameGenerator {
    fn generate(&self) -> String {
        generate_name(self.length)
    }
}

/// Generates a random name of exactly `length` characters from [`NAME_CHARSET`]
pub fn generate_name(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())] as char)
        .collect()
}

/// Generates a lowercase hex trace token from `bytes` random bytes
pub fn generate_ray_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// True if `name` could have been produced by a generator over [`NAME_CHARSET`]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name.bytes().all(|b| NAME_CHARSET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_names_have_exact_length_and_charset() {
        for length in [1, 4, 8, 16, 32] {
            for _ in 0..50 {
                let name = generate_name(length);
                assert_eq!(name.len(), length);
                assert!(name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn test_zero_length_is_empty() {
        assert_eq!(generate_name(0), "");
    }

    #[test]
    fn test_default_generator_uses_eight_characters() {
        let generator = RandomNameGenerator::default();
        assert_eq!(generator.length(), 8);
        assert_eq!(generator.generate().len(), 8);
    }

    #[test]
    fn test_generator_length_stays_within_valid_names() {
        assert_eq!(RandomNameGenerator::new(0).length(), 1);
        assert_eq!(RandomNameGenerator::new(65).length(), MAX_NAME_LENGTH);

        for length in [0, 1, 64, 65, 1000] {
            assert!(is_valid_name(&RandomNameGenerator::new(length).generate()));
        }
    }

    #[test]
    fn test_names_are_not_repeated() {
        let names: HashSet<String> = (0..1000).map(|_| generate_name(8)).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn test_ray_id_is_lowercase_hex() {
        let ray_id = generate_ray_id(8);
        assert_eq!(ray_id.len(), 16);
        assert!(ray_id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(generate_ray_id(8), generate_ray_id(8));
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("abc123xy"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("ABC"));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name(&"a".repeat(65)));
    }
}
