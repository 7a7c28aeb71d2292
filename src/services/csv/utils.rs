use std::collections::HashSet;

/// Makes a header usable as a unique key without rewriting readable names.
///
/// Blank headers become `column_{n}` (1-based) and repeats get a numeric
/// suffix.
pub fn clean_column_name(name: &str, position: usize, existing_names: &mut HashSet<String>) -> String {
    let trimmed = name.trim();
    let base_name = if trimmed.is_empty() {
        format!("column_{}", position + 1)
    } else {
        trimmed.to_string()
    };

    // If the name already exists, add a numeric suffix
    let mut cleaned = base_name.clone();
    let mut counter = 1;
    while !existing_names.insert(cleaned.clone()) {
        cleaned = format!("{}_{}", base_name, counter);
        counter += 1;
    }

    cleaned
}

/// True when the trimmed cell parses as a float once commas are removed.
pub fn is_numeric(value: &str) -> bool {
    let stripped: String = value.trim().chars().filter(|c| *c != ',').collect();
    !stripped.is_empty() && stripped.parse::<f64>().is_ok()
}

/// Coarse date check: any of `-`, `/`, `.` in the value.
///
/// Decimal numbers and hyphenated words also match. Callers only use this
/// after numeric detection has had its chance.
pub fn looks_like_date(value: &str) -> bool {
    value.contains(['-', '/', '.'])
}

/// Formats `value` with `,` between groups of three digits.
pub fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
