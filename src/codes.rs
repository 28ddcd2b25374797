//! Login-code shape handling. A code is exactly two ASCII letters followed
//! by two digits (e.g. AD01). Input is normalized to uppercase before any
//! lookup or storage; the shape check runs before any database access.

pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn is_valid(code: &str) -> bool {
    let b = code.as_bytes();
    b.len() == 4
        && b[0].is_ascii_uppercase()
        && b[1].is_ascii_uppercase()
        && b[2].is_ascii_digit()
        && b[3].is_ascii_digit()
}
