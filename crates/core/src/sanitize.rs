//! Text sanitization for wire descriptions.
//!
//! The remote platform chokes on accented characters in article
//! descriptions, so Latin diacritics are folded to their ASCII base before
//! send. Unknown non-ASCII characters are dropped.

/// Fold Latin diacritics to ASCII and drop anything else non-ASCII.
pub fn strip_diacritics(text: &str) -> String {
    text.chars().filter_map(fold_char).collect()
}

/// Sanitized description with the platform's placeholder for blank input.
pub fn description_or_placeholder(text: Option<&str>) -> String {
    match text.map(str::trim) {
        Some(value) if !value.is_empty() => strip_diacritics(value),
        _ => "Nao Informado".to_string(),
    }
}

fn fold_char(c: char) -> Option<char> {
    if c.is_ascii() {
        return Some(c);
    }
    let folded = match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        _ => return None,
    };
    Some(folded)
}
