use crate::dns::name;

/// Longest known zone that `query_name` falls under, compared on label boundaries.
///
/// Returns `None` when no zone matches, meaning the query is not ours.
pub fn match_zone<'a, I>(query_name: &str, zones: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let query_name = name::normalize(query_name);

    zones
        .into_iter()
        .filter(|zone| name::is_subdomain(&query_name, zone))
        .max_by_key(|zone| name::label_count(zone))
        .map(String::as_str)
}
