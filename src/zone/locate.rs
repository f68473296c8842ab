use super::Zone;
use crate::dns::name;

/// Map a query name to the location that answers it.
///
/// The exact relative name wins, then wildcards from the most specific
/// (`a.b.c` tries `*.b.c`, then `*.c`, then `*`). Only names present in
/// `zone` are ever returned.
pub fn resolve(query_name: &str, zone: &Zone) -> Option<String> {
    let relative = name::relative_to(&name::normalize(query_name), &zone.name)?;

    if zone.contains(&relative) {
        return Some(relative);
    }
    if relative.is_empty() {
        // Apex without an apex location; the zone data is inconsistent
        return None;
    }

    wildcard_candidates(&relative).find(|candidate| zone.contains(candidate))
}

fn wildcard_candidates(relative: &str) -> impl Iterator<Item = String> + '_ {
    let labels: Vec<&str> = relative.split('.').collect();
    (0..labels.len()).map(move |skip| {
        let rest = &labels[skip + 1..];
        if rest.is_empty() {
            "*".to_string()
        } else {
            format!("*.{}", rest.join("."))
        }
    })
}
