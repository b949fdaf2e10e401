//! Break-point search for chunk windows.
//!
//! Four-tier preference, each searched from the hard cut backwards:
//! 1. Paragraph break (blank line)
//! 2. Line break
//! 3. Sentence end (`.`, `!` or `?` followed by whitespace)
//! 4. Word break (any whitespace)

/// Cap on how far before the hard cut a boundary may be taken.
pub const MAX_TOLERANCE: usize = 200;

/// Find the best cut position in `lower..=upper`. A cut at `p` means the
/// chunk ends just before `chars[p]`.
pub fn find_break(chars: &[char], lower: usize, upper: usize) -> Option<usize> {
    if lower >= upper {
        return None;
    }

    let tiers: [fn(&[char], usize) -> bool; 4] =
        [is_paragraph_break, is_line_break, is_sentence_end, is_word_break];

    tiers
        .iter()
        .find_map(|tier| (lower..=upper).rev().find(|&p| tier(chars, p)))
}

fn is_paragraph_break(chars: &[char], p: usize) -> bool {
    p >= 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n'
}

fn is_line_break(chars: &[char], p: usize) -> bool {
    p >= 1 && chars[p - 1] == '\n'
}

fn is_sentence_end(chars: &[char], p: usize) -> bool {
    p >= 2 && chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '!' | '?')
}

fn is_word_break(chars: &[char], p: usize) -> bool {
    p >= 1 && chars[p - 1].is_whitespace()
}
