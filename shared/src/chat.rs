//! Splitting chat text into message packets.

use crate::packets::ServerPacket;

/// Usable bytes of one message fragment; the 64th byte is left for the
/// separator between fragments.
pub const FRAGMENT_BUDGET: usize = 63;

/// Breaks `text` into fragments of at most [`FRAGMENT_BUDGET`] bytes.
///
/// Words are kept whole where possible and joined by single spaces. A word
/// longer than the budget is cut at character boundaries, so concatenating its
/// pieces gives the word back.
pub fn split_message(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() <= FRAGMENT_BUDGET {
            current.push(' ');
            current.push_str(word);
            continue;
        }
        if !current.is_empty() {
            fragments.push(std::mem::take(&mut current));
        }

        let mut rest = word;
        while rest.len() > FRAGMENT_BUDGET {
            let cut = boundary_at_most(rest, FRAGMENT_BUDGET);
            fragments.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
    }

    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

/// Message packets carrying `text`, one per fragment.
pub fn message_packets(text: &str) -> Vec<ServerPacket> {
    split_message(text)
        .into_iter()
        .map(|text| ServerPacket::Message { text })
        .collect()
}

// Largest char boundary not after `limit`; never zero for a non-empty string.
fn boundary_at_most(s: &str, limit: usize) -> usize {
    let cut = (1..=limit).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
    if cut == 0 {
        s.chars().next().map(char::len_utf8).unwrap_or(s.len())
    } else {
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_single_fragment() {
        assert_eq!(split_message("hello world"), vec!["hello world"]);
    }

    #[test]
    fn test_empty_message() {
        assert!(split_message("").is_empty());
        assert!(split_message("   ").is_empty());
    }

    #[test]
    fn test_long_word_split_without_loss() {
        let text: String = (0..130).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let fragments = split_message(&text);

        assert_eq!(fragments.len(), 3);
        assert!(fragments.iter().all(|f| f.len() <= FRAGMENT_BUDGET));
        assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn test_breaks_on_whitespace_first() {
        let words: Vec<String> = (0..20).map(|i| format!("word{:02}", i)).collect();
        let text = words.join(" ");
        let fragments = split_message(&text);

        assert!(fragments.len() > 1);
        for fragment in &fragments {
            assert!(fragment.len() <= FRAGMENT_BUDGET);
            assert!(!fragment.starts_with(' ') && !fragment.ends_with(' '));
            for word in fragment.split(' ') {
                assert!(words.contains(&word.to_string()), "split inside {}", word);
            }
        }
        assert_eq!(fragments.join(" "), text);
    }

    #[test]
    fn test_long_word_between_short_words() {
        let long = "x".repeat(70);
        let text = format!("start {} end", long);
        let fragments = split_message(&text);

        assert_eq!(fragments[0], "start");
        assert_eq!(fragments[1].len(), FRAGMENT_BUDGET);
        assert_eq!(fragments[2], "xxxxxxx end");
    }

    #[test]
    fn test_multibyte_characters_are_not_cut() {
        let text = "é".repeat(40);
        let fragments = split_message(&text);
        assert!(fragments.iter().all(|f| f.len() <= FRAGMENT_BUDGET));
        assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn test_message_packets() {
        let packets = message_packets(&"z".repeat(100));
        assert_eq!(packets.len(), 2);
        assert!(packets
            .iter()
            .all(|p| matches!(p, ServerPacket::Message { .. })));
    }
}
