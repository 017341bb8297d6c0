/// Case-folded, trimmed form used for every case-insensitive name comparison.
pub fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Account identifier form used for matching: whitespace removed, upper-cased.
pub fn normalize_account(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Masks an account identifier for logs: keeps the first and last four characters.
pub fn mask_account(s: &str) -> String {
    let raw = normalize_account(s);
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() < 8 {
        return raw;
    }
    let hidden = (chars.len() - 8).max(4);
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(hidden))
}

/// Masks an e-mail style identity for logs: `ja***@example.com`.
pub fn mask_identity(s: &str) -> String {
    let s = s.trim();
    match s.split_once('@') {
        Some((local, domain)) => {
            let head: String = local.chars().take(2).collect();
            format!("{head}***@{domain}")
        }
        None => {
            let head: String = s.chars().take(2).collect();
            format!("{head}***")
        }
    }
}
