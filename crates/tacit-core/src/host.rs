//! Host header parsing for tenant routing.

use uuid::Uuid;

use crate::defaults::RESERVED_SUBDOMAINS;

/// How a tenant should be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantLookup {
    Id(Uuid),
    Slug(String),
    Domain(String),
}

impl TenantLookup {
    /// Parse either an explicit tenant id or a host header.
    pub fn parse(host_or_id: &str, base_domain: &str) -> Option<Self> {
        match Uuid::parse_str(host_or_id.trim()) {
            Ok(id) => Some(Self::Id(id)),
            Err(_) => parse_host(host_or_id, base_domain),
        }
    }
}

impl std::fmt::Display for TenantLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{}", id),
            Self::Slug(s) => write!(f, "slug:{}", s),
            Self::Domain(d) => write!(f, "domain:{}", d),
        }
    }
}

/// Lowercase, strip the port and trailing dot.
fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim().to_lowercase();
    if host.starts_with('[') {
        // IPv6 literal, never a tenant
        return None;
    }
    let host = host.split(':').next().unwrap_or("");
    let host = host.trim_end_matches('.');
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Resolve a host header into a lookup.
///
/// Leading reserved labels (`www`, `app`, `api`, `admin`) are stripped. A host
/// under `base_domain` resolves by its leftmost remaining label; any other
/// host is a custom domain. The bare base domain names no tenant.
pub fn parse_host(host: &str, base_domain: &str) -> Option<TenantLookup> {
    let mut host = normalize_host(host)?;
    let base = base_domain.trim().trim_end_matches('.').to_lowercase();

    loop {
        match host.split_once('.') {
            Some((label, rest)) if RESERVED_SUBDOMAINS.contains(&label) && !rest.is_empty() => {
                host = rest.to_string();
            }
            _ => break,
        }
    }

    if host == base {
        return None;
    }

    if let Some(prefix) = host.strip_suffix(&format!(".{}", base)) {
        let slug = prefix.split('.').next().unwrap_or("");
        if slug.is_empty() || RESERVED_SUBDOMAINS.contains(&slug) {
            return None;
        }
        return Some(TenantLookup::Slug(slug.to_string()));
    }

    if !host.contains('.') {
        // Single-label hosts (e.g. "localhost") are never custom domains
        return None;
    }

    Some(TenantLookup::Domain(host))
}
