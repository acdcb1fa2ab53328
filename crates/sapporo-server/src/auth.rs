//! Password hashing and password rules
//!
//! Hashes use the `pbkdf2_sha256$<iterations>$<salt>$<base64>` layout. The
//! iteration count is read back from each hash, so older hashes keep working.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use sapporo_core::User;

pub const ALGORITHM: &str = "pbkdf2_sha256";
pub const ITERATIONS: u32 = 260_000;
const SALT_LENGTH: usize = 22;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Above this similarity ratio a password counts as derived from the username
const MAX_SIMILARITY: f64 = 0.7;

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect();
    hash_with(password, &salt, ITERATIONS)
}

fn hash_with(password: &str, salt: &str, iterations: u32) -> String {
    let mut derived = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut derived);
    format!("{}${}${}${}", ALGORITHM, iterations, salt, STANDARD.encode(derived))
}

/// Check `password` against an encoded hash in constant time
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(_)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if algorithm != ALGORITHM {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let candidate = hash_with(password, salt, iterations);
    candidate.as_bytes().ct_eq(encoded.as_bytes()).into()
}

/// Whether `user` may sign in with `password`
pub fn authenticate(user: &User, password: &str) -> bool {
    user.is_active && verify_password(password, &user.password_hash)
}

/// Run every password rule, returning the messages of the failed ones
pub fn validate_password(password: &str, username: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if is_too_similar(password, username) {
        errors.push("The password is too similar to the username.".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if COMMON_PASSWORDS.contains(&password.trim().to_lowercase().as_str()) {
        errors.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".to_string());
    }

    errors
}

fn is_too_similar(password: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    let password: Vec<char> = password.to_lowercase().chars().collect();
    username
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .chain(std::iter::once(username))
        .filter(|part| !part.is_empty())
        .any(|part| {
            let part: Vec<char> = part.to_lowercase().chars().collect();
            similarity(&password, &part) >= MAX_SIMILARITY
        })
}

/// Ratcliff/Obershelp similarity in `[0, 1]`
fn similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(a, b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (mut best_i, mut best_j, mut best_len) = (0, 0, 0);
    for i in 0..a.len() {
        for j in 0..b.len() {
            let mut len = 0;
            while i + len < a.len() && j + len < b.len() && a[i + len] == b[j + len] {
                len += 1;
            }
            if len > best_len {
                (best_i, best_j, best_len) = (i, j, len);
            }
        }
    }
    if best_len == 0 {
        return 0;
    }
    best_len
        + matching_chars(&a[..best_i], &b[..best_j])
        + matching_chars(&a[best_i + best_len..], &b[best_j + best_len..])
}

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "mobilemail", "mom",
    "monitor", "monitoring", "montana", "moon", "moscow", "password1", "password123",
    "welcome", "admin", "administrator", "passw0rd", "changeme", "secret", "letmein1",
    "qwerty123", "1q2w3e4r", "1q2w3e", "default", "guest", "root", "test", "testtest",
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(password_hash: String, is_active: bool) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            password_hash,
            is_active,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn hashes_verify_and_reject() {
        let encoded = hash_password("correct horse battery");
        assert!(encoded.starts_with("pbkdf2_sha256$260000$"));
        assert!(verify_password("correct horse battery", &encoded));
        assert!(!verify_password("wrong", &encoded));
        assert!(!verify_password("correct horse battery", "md5$1$salt$x"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn iteration_count_is_read_from_the_hash() {
        let encoded = hash_with("sapporo", "seasalt", 1000);
        assert!(encoded.starts_with("pbkdf2_sha256$1000$seasalt$"));
        assert!(verify_password("sapporo", &encoded));
        assert!(!verify_password("sapporo", &encoded.replace("$1000$", "$1001$")));
        assert!(!verify_password("sapporo", &encoded.replace("$1000$", "$0$")));
    }

    #[test]
    fn inactive_users_cannot_authenticate() {
        let encoded = hash_password("s3cure-pass");
        assert!(authenticate(&user(encoded.clone(), true), "s3cure-pass"));
        assert!(!authenticate(&user(encoded, false), "s3cure-pass"));
    }

    #[test]
    fn validators_reject_weak_passwords() {
        assert!(validate_password("Tr1cky-Lantern", "alice").is_empty());

        let short = validate_password("a1b2", "alice");
        assert!(short.iter().any(|e| e.contains("too short")));

        let numeric = validate_password("8675309123", "alice");
        assert!(numeric.iter().any(|e| e.contains("entirely numeric")));

        let common = validate_password("Password123", "alice");
        assert!(common.iter().any(|e| e.contains("too common")));

        let similar = validate_password("alice2024", "alice");
        assert!(similar.iter().any(|e| e.contains("similar to the username")));
    }

    #[test]
    fn similarity_ratio() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(similarity(&chars("abcd"), &chars("abcd")), 1.0);
        assert_eq!(similarity(&chars("abcd"), &chars("wxyz")), 0.0);
        assert!((similarity(&chars("alice2024"), &chars("alice")) - 10.0 / 14.0).abs() < 1e-9);
    }
}
