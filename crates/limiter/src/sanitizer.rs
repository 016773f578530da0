use popguard_common::{EntityCategory, EntityDescriptor, Host};
use popguard_config::{ConfigSnapshot, PLACEHOLDER_NAME};

/// Why a name breaks policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Contains a codepoint above 127.
    NonAscii,
    /// Lowercased name fully matches the blacklist pattern with this source.
    Blacklisted { pattern: String },
}

/// What [`sanitize`] did to one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanitized {
    /// Not a nameable kind, or no custom name set.
    Skipped,
    /// Name complies.
    Untouched,
    /// Name replaced with the placeholder.
    Renamed(Violation),
    /// Entity disappeared before the rename landed.
    Vanished,
}

/// Check a name against policy. The non-ASCII rule wins over the blacklist;
/// patterns are tried in configured order and the first full match wins.
pub fn violation(name: &str, snapshot: &ConfigSnapshot) -> Option<Violation> {
    if !name.is_ascii() {
        return Some(Violation::NonAscii);
    }
    let lowered = name.to_lowercase();
    snapshot
        .blacklist
        .iter()
        .find(|pattern| pattern.full_match(&lowered))
        .map(|pattern| Violation::Blacklisted {
            pattern: pattern.source().to_string(),
        })
}

/// The name policy would leave in place of `name`.
pub fn sanitized_name<'a>(name: &'a str, snapshot: &ConfigSnapshot) -> &'a str {
    match violation(name, snapshot) {
        Some(_) => PLACEHOLDER_NAME,
        None => name,
    }
}

/// Rewrite an entity's custom name through the host if it breaks policy,
/// and make the placeholder visible.
pub fn sanitize<H: Host + ?Sized>(
    host: &mut H,
    entity: &EntityDescriptor,
    snapshot: &ConfigSnapshot,
) -> Sanitized {
    if entity.category() != EntityCategory::Creature {
        return Sanitized::Skipped;
    }
    let Some(name) = entity.custom_name.as_deref() else {
        return Sanitized::Skipped;
    };
    let Some(violation) = violation(name, snapshot) else {
        return Sanitized::Untouched;
    };
    if !host.set_custom_name(entity.id, PLACEHOLDER_NAME)
        || !host.set_custom_name_visible(entity.id, true)
    {
        tracing::debug!(id = %entity.id, "entity vanished before rename");
        return Sanitized::Vanished;
    }
    tracing::debug!(id = %entity.id, kind = %entity.kind, ?violation, "renamed entity");
    Sanitized::Renamed(violation)
}
