//! Music Theory Helpers
//!
//! Key and meter normalisation plus circle-of-fifths neighbourhoods, used to
//! match bridge tracks to the songs they connect. Major keys are written with
//! an upper-case tonic ("C", "F#"), minor keys lower-case ("a", "f#").

/// Major keys clockwise around the circle of fifths
const CIRCLE_MAJOR: [&str; 12] = [
    "C", "G", "D", "A", "E", "B", "F#", "Db", "Ab", "Eb", "Bb", "F",
];

/// Relative minors, aligned with `CIRCLE_MAJOR`
const CIRCLE_MINOR: [&str; 12] = [
    "a", "e", "b", "f#", "c#", "g#", "d#", "bb", "f", "c", "g", "d",
];

/// Canonical key → accepted spellings
const KEY_ALIASES: &[(&str, &[&str])] = &[
    ("C", &["C", "C major"]),
    ("F", &["F", "F major"]),
    ("G", &["G", "G major"]),
    ("D", &["D", "D major"]),
    ("A", &["A", "A major"]),
    ("E", &["E", "E major"]),
    ("B", &["B", "B major"]),
    ("F#", &["F#", "F# major", "Gb", "Gb major"]),
    ("Db", &["Db", "Db major", "C#", "C# major"]),
    ("Ab", &["Ab", "Ab major", "G#", "G# major"]),
    ("Eb", &["Eb", "Eb major", "D#", "D# major"]),
    ("Bb", &["Bb", "Bb major", "A#", "A# major"]),
    ("a", &["a", "A minor"]),
    ("e", &["e", "E minor"]),
    ("b", &["b", "B minor"]),
    ("f#", &["f#", "F# minor", "gb", "Gb minor"]),
    ("c#", &["c#", "C# minor", "db", "Db minor"]),
    ("g#", &["g#", "G# minor", "ab", "Ab minor"]),
    ("d#", &["d#", "D# minor", "eb", "Eb minor"]),
    ("bb", &["bb", "Bb minor", "a#", "A# minor"]),
    ("f", &["f", "F minor", "e#", "E# minor"]),
    ("c", &["c", "C minor", "b#", "B# minor"]),
    ("g", &["g", "G minor"]),
    ("d", &["d", "D minor"]),
];

/// Canonical meter → accepted spellings
const METER_ALIASES: &[(&str, &[&str])] = &[
    ("4/4", &["4/4", "C", "Common"]),
    ("2/2", &["2/2", "Cut", "Cut Time"]),
];

/// Normalise a key to its canonical spelling.
///
/// Unknown spellings are returned trimmed but otherwise unchanged, so modal
/// keys such as "D Dorian" still compare by exact name.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    KEY_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&key))
        .map(|(canon, _)| canon.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Normalise a meter to its canonical spelling
pub fn normalize_meter(meter: &str) -> String {
    let meter = meter.trim();
    METER_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&meter))
        .map(|(canon, _)| canon.to_string())
        .unwrap_or_else(|| meter.to_string())
}

/// Whether two keys are the same after normalisation
pub fn same_key(a: &str, b: &str) -> bool {
    normalize_key(a) == normalize_key(b)
}

/// Keys one step away on the circle of fifths plus relative majors/minors.
///
/// The key itself is never included. Keys outside the major/minor circles
/// (modes, unknown spellings) have no neighbours.
pub fn closely_related_keys(key: &str) -> Vec<String> {
    let key = normalize_key(key);

    let (circle, is_major) = if let Some(i) = CIRCLE_MAJOR.iter().position(|k| *k == key) {
        (i, true)
    } else if let Some(i) = CIRCLE_MINOR.iter().position(|k| *k == key) {
        (i, false)
    } else {
        return Vec::new();
    };

    let right = (circle + 1) % 12;
    let left = (circle + 11) % 12;
    let (same, relative) = if is_major {
        (&CIRCLE_MAJOR, &CIRCLE_MINOR)
    } else {
        (&CIRCLE_MINOR, &CIRCLE_MAJOR)
    };

    let mut related: Vec<String> = Vec::with_capacity(5);
    for k in [
        same[right],
        same[left],
        relative[circle],
        relative[right],
        relative[left],
    ] {
        if k != key && !related.iter().any(|r| r == k) {
            related.push(k.to_string());
        }
    }
    related
}

/// Whether `b` is `a` or closely related to it
pub fn is_related_key(a: &str, b: &str) -> bool {
    same_key(a, b) || closely_related_keys(a).contains(&normalize_key(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("A minor"), "a");
        assert_eq!(normalize_key("C# major"), "Db");
        assert_eq!(normalize_key("Gb"), "F#");
        assert_eq!(normalize_key(" D "), "D");
        assert_eq!(normalize_key("D Dorian"), "D Dorian");
    }

    #[test]
    fn test_normalize_meter() {
        assert_eq!(normalize_meter("Common"), "4/4");
        assert_eq!(normalize_meter("C"), "4/4");
        assert_eq!(normalize_meter("Cut Time"), "2/2");
        assert_eq!(normalize_meter("6/8"), "6/8");
    }

    #[test]
    fn test_closely_related_major() {
        let related = closely_related_keys("C");
        for k in ["G", "F", "a", "e", "d"] {
            assert!(related.contains(&k.to_string()), "missing {}", k);
        }
        assert!(!related.contains(&"C".to_string()));
        assert_eq!(related.len(), 5);
    }

    #[test]
    fn test_closely_related_minor() {
        let related = closely_related_keys("A minor");
        for k in ["C", "G", "F", "e", "d"] {
            assert!(related.contains(&k.to_string()), "missing {}", k);
        }
    }

    #[test]
    fn test_modes_have_no_neighbours() {
        assert!(closely_related_keys("D Dorian").is_empty());
        assert!(is_related_key("D Dorian", "D Dorian"));
        assert!(!is_related_key("D Dorian", "D"));
    }
}
