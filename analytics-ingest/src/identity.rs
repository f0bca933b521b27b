//! Tenant and stream identity rules.

use uuid::Uuid;

/// Tenant id older producers used when they had no tenant to attribute.
pub const LEGACY_PLACEHOLDER_TENANT: Uuid = Uuid::from_u128(1);

const INTERNAL_NAME_PREFIXES: [&str; 2] = ["live+", "vod+"];

/// Parses a tenant or stream id. Anything that is not a non-nil UUID is rejected.
pub fn parse_identity(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok().filter(|id| !id.is_nil())
}

pub fn is_valid_identity(raw: &str) -> bool {
    parse_identity(raw).is_some()
}

/// Parses an id for a column that always carries a value; bad input becomes nil.
pub fn uuid_or_nil(raw: &str) -> Uuid {
    Uuid::parse_str(raw.trim()).unwrap_or_default()
}

/// Strips the producer-side `live+` / `vod+` prefix from a stream name.
pub fn normalize_internal_name(name: &str) -> &str {
    INTERNAL_NAME_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/// Picks the tenant for a row. The envelope's tenant always wins; a tenant
/// embedded in the payload only counts when the envelope carried the legacy
/// placeholder.
pub fn resolve_tenant(envelope: Uuid, embedded: Option<&str>) -> Uuid {
    if envelope != LEGACY_PLACEHOLDER_TENANT {
        return envelope;
    }
    embedded.and_then(parse_identity).unwrap_or(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_prefixes() {
        assert_eq!(normalize_internal_name("live+demo"), "demo");
        assert_eq!(normalize_internal_name("vod+demo"), "demo");
        assert_eq!(normalize_internal_name("demo"), "demo");
        assert_eq!(normalize_internal_name("push+demo"), "push+demo");
        assert_eq!(normalize_internal_name(""), "");
    }

    #[test]
    fn rejects_nil_and_garbage() {
        assert!(!is_valid_identity(""));
        assert!(!is_valid_identity("not-a-uuid"));
        assert!(!is_valid_identity("00000000-0000-0000-0000-000000000000"));
        assert!(is_valid_identity("5a1d5c6e-4b8f-4a44-9a2d-1c1b0b7f8e11"));
    }

    #[test]
    fn nil_fallback_for_unparseable() {
        assert_eq!(uuid_or_nil("nope"), Uuid::nil());
    }

    #[test]
    fn envelope_tenant_wins() {
        let envelope = Uuid::new_v4();
        let embedded = Uuid::new_v4().to_string();
        assert_eq!(resolve_tenant(envelope, Some(&embedded)), envelope);
    }

    #[test]
    fn placeholder_defers_to_embedded_tenant() {
        let embedded = Uuid::new_v4();
        assert_eq!(
            resolve_tenant(LEGACY_PLACEHOLDER_TENANT, Some(&embedded.to_string())),
            embedded
        );
        assert_eq!(
            resolve_tenant(LEGACY_PLACEHOLDER_TENANT, Some("garbage")),
            LEGACY_PLACEHOLDER_TENANT
        );
    }
}
