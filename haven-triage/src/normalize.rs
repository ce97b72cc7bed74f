//! Text normalization for screening
//!
//! **[SCD-NORM-010]** Deterministic folding applied before any matching:
//! lowercase, invisible-character stripping, confusable and leet-substitution
//! mapping, spaced-letter collapse, whitespace collapse. Normalization only
//! merges variants toward their canonical spelling; it never removes words,
//! so no risk signal is lost before scanning.
//!
//! Folding is deliberately greedy: a digit folded inside an ordinary word
//! ("score50") costs nothing because normalized text is matched, never
//! displayed, while a digit left unfolded inside "k1ll" would cost a missed
//! crisis term.

/// Normalized view of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Folded text: lowercase, confusables mapped, spaced letters collapsed,
    /// whitespace collapsed
    pub text: String,
    /// `text` with everything except alphanumerics removed, for
    /// obfuscation-resistant phrase matching
    pub squeezed: String,
}

/// **[SCD-NORM-020]** Normalize raw message text
///
/// Pure and total: any input produces a normalized view, and equal inputs
/// always produce equal outputs.
pub fn normalize(raw: &str) -> Normalized {
    let lowered = raw.to_lowercase();

    // Strip invisible characters and apostrophes ("can't" folds to "cant",
    // matching the canonical forms used in term tables)
    let visible: String = lowered
        .chars()
        .filter(|c| !is_invisible(*c) && !is_apostrophe(*c))
        .collect();

    let folded: Vec<char> = visible.chars().map(fold_confusable).collect();
    let folded = fold_leet_in_word_context(&folded);
    let collapsed = collapse_spaced_letters(&folded);

    let text = collapsed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let squeezed = text.chars().filter(|c| c.is_alphanumeric()).collect();

    Normalized { text, squeezed }
}

/// Word-boundary check over normalized text
///
/// A match counts only when not embedded in a longer alphanumeric run
/// ("skill" must not match the term "kill").
pub(crate) fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let after_ok = text[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    before_ok && after_ok
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

fn is_apostrophe(c: char) -> bool {
    matches!(c, '\'' | '\u{2019}' | '\u{2018}')
}

/// Map common Cyrillic and Greek confusables to their Latin look-alikes
fn fold_confusable(c: char) -> char {
    match c {
        // Cyrillic
        'а' => 'a',
        'в' => 'b',
        'е' => 'e',
        'і' => 'i',
        'ј' => 'j',
        'к' => 'k',
        'м' => 'm',
        'н' => 'n',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'ѕ' => 's',
        'т' => 't',
        'у' => 'y',
        'х' => 'x',
        // Greek
        'α' => 'a',
        'ε' => 'e',
        'ι' => 'i',
        'κ' => 'k',
        'ν' => 'v',
        'ο' => 'o',
        'ρ' => 'p',
        'τ' => 't',
        'υ' => 'u',
        _ => c,
    }
}

/// Leet substitution value for a character, if any
fn leet_value(c: char) -> Option<char> {
    match c {
        '0' => Some('o'),
        '1' => Some('i'),
        '3' => Some('e'),
        '4' => Some('a'),
        '5' => Some('s'),
        '7' => Some('t'),
        '8' => Some('b'),
        '@' => Some('a'),
        '$' => Some('s'),
        '!' => Some('i'),
        '+' => Some('t'),
        _ => None,
    }
}

/// Fold leet substitutions only where an immediate neighbor is alphabetic
///
/// "k1ll" folds to "kill"; standalone numbers ("scored 50") stay intact.
fn fold_leet_in_word_context(chars: &[char]) -> Vec<char> {
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let Some(mapped) = leet_value(c) else {
                return c;
            };
            let prev_alpha = i > 0 && chars[i - 1].is_alphabetic();
            let next_alpha = i + 1 < chars.len() && chars[i + 1].is_alphabetic();
            if prev_alpha || next_alpha {
                mapped
            } else {
                c
            }
        })
        .collect()
}

fn is_letter_separator(c: char) -> bool {
    matches!(c, ' ' | '.' | '-' | '_' | '*' | '/')
}

/// True when the char at `k` is a single letter bounded by non-letters
fn is_isolated_letter(chars: &[char], k: usize) -> bool {
    chars[k].is_alphabetic()
        && (k == 0 || !chars[k - 1].is_alphabetic())
        && (k + 1 >= chars.len() || !chars[k + 1].is_alphabetic())
}

/// **[SCD-NORM-030]** Collapse spaced-out letters back into words
///
/// Runs of three or more single letters separated by one separator each
/// ("k.i.l.l", "k i l l") merge into one word. Shorter runs stay as typed.
fn collapse_spaced_letters(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        if is_isolated_letter(chars, i) {
            let mut letters = vec![chars[i]];
            let mut j = i;
            while j + 2 < chars.len()
                && is_letter_separator(chars[j + 1])
                && is_isolated_letter(chars, j + 2)
            {
                letters.push(chars[j + 2]);
                j += 2;
            }
            if letters.len() >= 3 {
                out.extend(letters);
                i = j + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}
