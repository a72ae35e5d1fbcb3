//! Decoy-path detection.
//!
//! The honeypot paths have no legitimate traffic; a request to any of them
//! implies automated probing and earns an immediate hard ban, far longer than
//! the graduated scheme hands out. Matching is exact on the lowercased path.

/// Paths that only scanners ask for.
pub const DECOY_PATHS: &[&str] = &[
    "/admin-panel",
    "/wp-login.php",
    "/api/hidden-login",
    "/private-api",
    "/cpanel",
];

/// Location marker written into the synthetic log entry for a trapped request.
pub const HONEYPOT_LOCATION: &str = "Honeypot";

/// ISP marker for the synthetic log entry.
pub const HONEYPOT_ISP: &str = "Suspicious";

/// Whether the request path hits a decoy. Callers pass the raw request path;
/// comparison is case-insensitive.
pub fn is_decoy_path(path: &str) -> bool {
    let normalized = path.to_ascii_lowercase();
    DECOY_PATHS.contains(&normalized.as_str())
}
