//! Naming conventions for derived identifiers

/// Last segment of a namespaced class name (`App\Article` or `app::Article`)
pub fn short_class_name(class: &str) -> &str {
    class
        .rsplit(['\\', ':', '.', '/'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(class)
}

/// Convert `CamelCase` to `snake_case`; acronyms stay together
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Default machine type of a class
pub fn machine_type_of(class: &str) -> String {
    snake_case(short_class_name(class))
}
