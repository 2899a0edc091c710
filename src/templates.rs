const KEYWORD: &str = "keyword";
const LOCATION: &str = "location";
const BRAND: &str = "brand";

/// Substitutes `{keyword}`, `{location}` and `{brand}` (any case) in `template`.
///
/// The location is lower-cased. Unknown or unterminated placeholders are left
/// as literal text and substituted values are never rescanned.
pub fn expand(template: &str, keyword: &str, location: &str, brand: &str) -> String {
    let location = location.to_lowercase();
    let mut expanded = String::with_capacity(template.len() + keyword.len() + location.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            expanded.push_str(tail);
            return expanded;
        };

        let value = match tail[1..close].to_ascii_lowercase().as_str() {
            KEYWORD => Some(keyword),
            LOCATION => Some(location.as_str()),
            BRAND => Some(brand),
            _ => None,
        };
        match value {
            Some(value) => {
                expanded.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                expanded.push('{');
                rest = &tail[1..];
            }
        }
    }

    expanded.push_str(rest);
    expanded
}

/// Expands every keyword against every template, template-major.
pub fn expand_keywords(
    keywords: &[String],
    templates: &[String],
    location: &str,
    brand: &str,
) -> Vec<String> {
    templates
        .iter()
        .flat_map(|template| {
            keywords
                .iter()
                .map(move |keyword| expand(template, keyword, location, brand))
        })
        .collect()
}
