//! Backend paths and storage key names
//!
//! Paths are relative to the configured API base URL. Storage keys are the
//! fixed names under which a session is persisted; all of them are removed
//! together on sign-out.

pub const SIGN_IN_PATH: &str = "/auth/login/";
pub const SIGN_UP_PATH: &str = "/auth/register/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh/";
pub const PASSWORD_RESET_PATH: &str = "/auth/password-reset/";
pub const PASSWORD_RESET_CONFIRM_PATH: &str = "/auth/password-reset/confirm/";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email/";

pub const PROFILE_PATH: &str = "/users/profile/";
pub const RESUMES_PATH: &str = "/resumes/";
pub const JOBS_PATH: &str = "/jobs/";
pub const JOB_SEARCH_PATH: &str = "/jobs/search/";
pub const WISHLIST_PATH: &str = "/wishlist/";

/// Endpoints that never carry a bearer token and never trigger a refresh.
pub const PUBLIC_PATHS: &[&str] = &[
    SIGN_IN_PATH,
    SIGN_UP_PATH,
    TOKEN_REFRESH_PATH,
    PASSWORD_RESET_PATH,
    PASSWORD_RESET_CONFIRM_PATH,
    VERIFY_EMAIL_PATH,
];

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";
pub const USER_KEY: &str = "user";
pub const IS_AUTHENTICATED_KEY: &str = "is_authenticated";

pub const SESSION_KEYS: &[&str] = &[
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    TOKEN_EXPIRY_KEY,
    USER_KEY,
    IS_AUTHENTICATED_KEY,
];

/// Whether `path` is on the public allow-list.
///
/// Query strings and trailing slashes are ignored. Sub-paths of a public
/// entry match too, so `/auth/verify-email/<token>/` is public.
pub fn is_public_path(path: &str) -> bool {
    let path = normalize(path);
    PUBLIC_PATHS.iter().any(|public| {
        let public = normalize(public);
        path == public
            || path
                .strip_prefix(public)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_auth_entry_point_is_public() {
        for path in PUBLIC_PATHS {
            assert!(is_public_path(path), "{path} should be public");
        }
    }

    #[test]
    fn public_match_ignores_query_and_trailing_slash() {
        assert!(is_public_path("/auth/login"));
        assert!(is_public_path("/auth/login/?next=/jobs/"));
        assert!(is_public_path("/auth/token/refresh"));
    }

    #[test]
    fn public_match_covers_token_sub_paths() {
        assert!(is_public_path("/auth/verify-email/abc123/"));
        assert!(is_public_path("/auth/password-reset/confirm/uid/token/"));
    }

    #[test]
    fn logout_and_data_endpoints_require_auth() {
        assert!(!is_public_path(LOGOUT_PATH));
        assert!(!is_public_path(PROFILE_PATH));
        assert!(!is_public_path("/resumes/4/"));
        assert!(!is_public_path("/jobs/search/?q=rust"));
        assert!(!is_public_path("/"));
    }

    #[test]
    fn prefix_without_separator_is_not_public() {
        // "/auth/login-history" shares a prefix with "/auth/login" but is a
        // different resource.
        assert!(!is_public_path("/auth/login-history/"));
        assert!(!is_public_path("/auth/registered-devices/"));
    }

    #[test]
    fn session_keys_cover_every_stored_value() {
        assert_eq!(SESSION_KEYS.len(), 5);
        assert!(SESSION_KEYS.contains(&USER_KEY));
        assert!(SESSION_KEYS.contains(&IS_AUTHENTICATED_KEY));
    }
}
