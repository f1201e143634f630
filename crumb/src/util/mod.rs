pub mod errors;

/// Lowercases a hostname and strips a trailing root dot,
/// hostnames from the browser are otherwise taken as is.
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim_end_matches('.').to_ascii_lowercase()
}
