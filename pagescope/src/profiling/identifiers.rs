//! Script identifier canonicalisation.
//!
//! The profiler reports one identifier per script (usually its URL). Left
//! alone, the browser's own internal scripts and `javascript:` pseudo-URLs
//! would each get a timeline row and drown out the page's scripts, so they
//! collapse into two canonical identifiers.
//!
//! # Rules
//!
//! 1. **Browser internals** → [`BROWSER_JAVASCRIPT`]
//!    - `chrome:` URLs
//!    - `file:` URLs to `.jsm` modules under `/modules/`
//!    - `file:` URLs to `.js` components under `/components/`
//!    - native identifiers ending in `.cpp`
//!    - the `XStringBundle` pseudo-identifier
//! 2. **`javascript:` URLs** → [`JAVASCRIPT_URL`]
//!
//! Anything else is kept verbatim.

/// Canonical identifier for the browser's own script activity
pub const BROWSER_JAVASCRIPT: &str = "Browser JavaScript";

/// Canonical identifier for `javascript:` pseudo-URLs
pub const JAVASCRIPT_URL: &str = "javascript: URL";

/// Map a profiler identifier onto the identifier shown on the timeline
#[must_use]
pub fn canonical_identifier(identifier: &str) -> &str {
    if is_browser_script(identifier) {
        return BROWSER_JAVASCRIPT;
    }
    if identifier.starts_with("javascript:") {
        return JAVASCRIPT_URL;
    }
    identifier
}

/// Whether the identifier names a script that ships with the browser
#[must_use]
pub fn is_browser_script(identifier: &str) -> bool {
    if identifier.starts_with("chrome:") {
        return true;
    }

    if identifier.starts_with("file:") {
        if identifier.ends_with(".jsm") && identifier.contains("/modules/") {
            return true;
        }
        if identifier.ends_with(".js") && identifier.contains("/components/") {
            return true;
        }
    }

    // Native frames and the string bundle service show up as scripts too
    identifier.ends_with(".cpp") || identifier == "XStringBundle"
}
