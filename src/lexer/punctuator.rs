//! Punctuator spellings and the trie used for maximal-munch matching.

use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punctuator {
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Dot,
    Arrow,
    Increment,
    Decrement,
    Ampersand,
    Star,
    Plus,
    Minus,
    Tilde,
    Exclaim,
    Slash,
    Percent,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    Caret,
    Pipe,
    LogicAnd,
    LogicOr,
    Question,
    Colon,
    Semicolon,
    Ellipsis,
    Assign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PlusAssign,
    MinusAssign,
    LeftShiftAssign,
    RightShiftAssign,
    AmpersandAssign,
    CaretAssign,
    PipeAssign,
    Comma,
    Hash,
    HashHash,
}

/// Canonical spellings. Digraphs follow and map onto the same punctuators.
const SPELLINGS: &[(&str, Punctuator)] = &[
    ("[", Punctuator::LeftBracket),
    ("]", Punctuator::RightBracket),
    ("(", Punctuator::LeftParen),
    (")", Punctuator::RightParen),
    ("{", Punctuator::LeftBrace),
    ("}", Punctuator::RightBrace),
    (".", Punctuator::Dot),
    ("->", Punctuator::Arrow),
    ("++", Punctuator::Increment),
    ("--", Punctuator::Decrement),
    ("&", Punctuator::Ampersand),
    ("*", Punctuator::Star),
    ("+", Punctuator::Plus),
    ("-", Punctuator::Minus),
    ("~", Punctuator::Tilde),
    ("!", Punctuator::Exclaim),
    ("/", Punctuator::Slash),
    ("%", Punctuator::Percent),
    ("<<", Punctuator::LeftShift),
    (">>", Punctuator::RightShift),
    ("<", Punctuator::Less),
    (">", Punctuator::Greater),
    ("<=", Punctuator::LessEqual),
    (">=", Punctuator::GreaterEqual),
    ("==", Punctuator::Equal),
    ("!=", Punctuator::NotEqual),
    ("^", Punctuator::Caret),
    ("|", Punctuator::Pipe),
    ("&&", Punctuator::LogicAnd),
    ("||", Punctuator::LogicOr),
    ("?", Punctuator::Question),
    (":", Punctuator::Colon),
    (";", Punctuator::Semicolon),
    ("...", Punctuator::Ellipsis),
    ("=", Punctuator::Assign),
    ("*=", Punctuator::StarAssign),
    ("/=", Punctuator::SlashAssign),
    ("%=", Punctuator::PercentAssign),
    ("+=", Punctuator::PlusAssign),
    ("-=", Punctuator::MinusAssign),
    ("<<=", Punctuator::LeftShiftAssign),
    (">>=", Punctuator::RightShiftAssign),
    ("&=", Punctuator::AmpersandAssign),
    ("^=", Punctuator::CaretAssign),
    ("|=", Punctuator::PipeAssign),
    (",", Punctuator::Comma),
    ("#", Punctuator::Hash),
    ("##", Punctuator::HashHash),
];

const DIGRAPHS: &[(&str, Punctuator)] = &[
    ("<:", Punctuator::LeftBracket),
    (":>", Punctuator::RightBracket),
    ("<%", Punctuator::LeftBrace),
    ("%>", Punctuator::RightBrace),
    ("%:", Punctuator::Hash),
    ("%:%:", Punctuator::HashHash),
];

impl Punctuator {
    pub fn as_str(self) -> &'static str {
        SPELLINGS
            .iter()
            .find(|(_, p)| *p == self)
            .map(|(s, _)| *s)
            .unwrap_or("")
    }

    /// Alternative spelling, when the punctuator has one.
    pub fn digraph(self) -> Option<&'static str> {
        DIGRAPHS.iter().find(|(_, p)| *p == self).map(|(s, _)| *s)
    }

    pub fn all() -> impl Iterator<Item = (&'static str, Punctuator, bool)> {
        SPELLINGS
            .iter()
            .map(|(s, p)| (*s, *p, false))
            .chain(DIGRAPHS.iter().map(|(s, p)| (*s, *p, true)))
    }
}

impl fmt::Display for Punctuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a trie lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunctuatorMatch {
    pub punctuator: Punctuator,
    pub length: usize,
    pub digraph: bool,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: Vec<(char, usize)>,
    value: Option<(Punctuator, bool)>,
}

/// Trie keyed by code point, built once from the spelling tables.
#[derive(Debug)]
pub struct PunctuatorTrie {
    nodes: Vec<TrieNode>,
}

impl PunctuatorTrie {
    fn build() -> Self {
        let mut trie = PunctuatorTrie {
            nodes: vec![TrieNode::default()],
        };
        for (spelling, punctuator, digraph) in Punctuator::all() {
            let mut node = 0;
            for ch in spelling.chars() {
                node = match trie.child(node, ch) {
                    Some(next) => next,
                    None => {
                        trie.nodes.push(TrieNode::default());
                        let next = trie.nodes.len() - 1;
                        trie.nodes[node].children.push((ch, next));
                        next
                    }
                };
            }
            trie.nodes[node].value = Some((punctuator, digraph));
        }
        trie
    }

    pub fn get() -> &'static PunctuatorTrie {
        static TRIE: OnceLock<PunctuatorTrie> = OnceLock::new();
        TRIE.get_or_init(PunctuatorTrie::build)
    }

    fn child(&self, node: usize, ch: char) -> Option<usize> {
        self.nodes[node].children.iter().find(|(c, _)| *c == ch).map(|(_, n)| *n)
    }

    /// Longest punctuator at the start of the input produced by `peek`.
    pub fn longest_match(&self, peek: impl Fn(usize) -> Option<char>) -> Option<PunctuatorMatch> {
        let mut node = 0;
        let mut best = None;
        let mut offset = 0;
        loop {
            let Some(ch) = peek(offset) else { break };
            let Some(next) = self.child(node, ch) else { break };
            node = next;
            offset += 1;
            if let Some((punctuator, digraph)) = self.nodes[node].value {
                best = Some(PunctuatorMatch {
                    punctuator,
                    length: offset,
                    digraph,
                });
            }
        }
        best
    }

    /// Matches only when `text` is exactly one punctuator.
    pub fn whole_match(&self, text: &str) -> Option<PunctuatorMatch> {
        let chars: Vec<char> = text.chars().collect();
        self.longest_match(|i| chars.get(i).copied())
            .filter(|m| m.length == chars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximal_munch() {
        let trie = PunctuatorTrie::get();
        let input: Vec<char> = "<<=x".chars().collect();
        let m = trie.longest_match(|i| input.get(i).copied()).unwrap();
        assert_eq!(m.punctuator, Punctuator::LeftShiftAssign);
        assert_eq!(m.length, 3);

        let input: Vec<char> = "..x".chars().collect();
        let m = trie.longest_match(|i| input.get(i).copied()).unwrap();
        assert_eq!(m.punctuator, Punctuator::Dot);
        assert_eq!(m.length, 1);
    }

    #[test]
    fn test_digraphs() {
        let trie = PunctuatorTrie::get();
        let m = trie.whole_match("%:%:").unwrap();
        assert_eq!(m.punctuator, Punctuator::HashHash);
        assert!(m.digraph);
        assert_eq!(Punctuator::LeftBrace.digraph(), Some("<%"));
    }

    #[test]
    fn test_whole_match_rejects_partial_combinations() {
        let trie = PunctuatorTrie::get();
        assert_eq!(trie.whole_match("->").map(|m| m.punctuator), Some(Punctuator::Arrow));
        assert!(trie.whole_match("+-").is_none());
        assert!(trie.whole_match("..").is_none());
    }
}
