//! URL helpers shared by both HTTP adapters.

/// Strip trailing slashes so endpoint paths can be appended safely.
///
/// # Examples
///
/// ```
/// use chatfront::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:8080/"), "http://localhost:8080");
/// assert_eq!(normalize_base_url("http://localhost:5173/oneapi//"), "http://localhost:5173/oneapi");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// A base URL may carry a path prefix (for example a reverse proxy mount
/// such as `/oneapi`); the prefix is kept and the endpoint lands under it.
///
/// # Examples
///
/// ```
/// use chatfront::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:3000", "/api/token/"),
///     "http://localhost:3000/api/token/"
/// );
/// assert_eq!(
///     construct_api_url("http://localhost:5173/oneapi/", "api/user/self"),
///     "http://localhost:5173/oneapi/api/user/self"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

/// True when `path` targets the primary backend's login endpoint.
///
/// A 401 from the login call means bad credentials, not an expired session,
/// so it must not trigger session teardown.
pub fn is_login_path(path: &str) -> bool {
    path.contains("/user/login")
}
