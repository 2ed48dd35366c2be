/// Parses a regex literal's pattern text into a small AST covering spec
/// §4.I's node list (`seq, |, *, +, ?, {n,m}, [], [^], (), (?:), (?=), (?!),
/// (?<=), (?<!), ., ^, $, \b, \d, \w, \s, \1..\9`). A hand-rolled
/// recursive-descent parser rather than a regex-crate dependency, since
/// producing this AST (and the bytecode `compile.rs` lowers it to) *is*
/// the component being built here.
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone)]
pub enum Node {
    Seq(Vec<Node>),
    Alt(Vec<Node>),
    Star(Box<Node>, bool),
    Plus(Box<Node>, bool),
    Opt(Box<Node>, bool),
    Repeat { node: Box<Node>, min: u32, max: Option<u32>, greedy: bool },
    Char(char),
    Any,
    Class { ranges: Vec<(char, char)>, negated: bool },
    Digit(bool),
    Word(bool),
    Space(bool),
    Start,
    End,
    WordBoundary(bool),
    Group(Box<Node>, Option<u32>),
    Lookahead(Box<Node>, bool),
    Lookbehind(Box<Node>, bool),
    Backref(u32),
}

pub fn parse(pattern: &str) -> Result<Node, String> {
    let mut p = Parser { chars: pattern.chars().peekable(), next_group: 1 };
    let node = p.parse_alt()?;
    if p.chars.peek().is_some() {
        return Err(format!("unexpected character '{}' in pattern", p.chars.next().unwrap()));
    }
    Ok(node)
}

/// Greatest explicit capture-group index appearing anywhere in `node`
/// (0 if the pattern has no capturing groups); `compile.rs` uses this to
/// size the capture buffer.
pub fn max_group_index(node: &Node) -> u32 {
    match node {
        Node::Seq(items) | Node::Alt(items) => items.iter().map(max_group_index).max().unwrap_or(0),
        Node::Star(n, _) | Node::Plus(n, _) | Node::Opt(n, _) => max_group_index(n),
        Node::Repeat { node, .. } => max_group_index(node),
        Node::Group(inner, idx) => max_group_index(inner).max(idx.unwrap_or(0)),
        Node::Lookahead(inner, _) | Node::Lookbehind(inner, _) => max_group_index(inner),
        _ => 0,
    }
}

/// The width (in code units) `node` always consumes, or `None` if it can
/// consume a different number of units depending on input — lookbehind
/// bodies must resolve to `Some` (spec §4.I only commits to lookbehind
/// emission, not to the variable-width case every engine historically
/// struggled with; fixed-width is the documented restriction, see
/// `DESIGN.md`).
pub fn fixed_width(node: &Node) -> Option<u32> {
    match node {
        Node::Seq(items) => items.iter().try_fold(0u32, |acc, n| fixed_width(n).map(|w| acc + w)),
        Node::Alt(branches) => {
            let mut widths = branches.iter().map(fixed_width);
            let first = widths.next()??;
            if widths.all(|w| w == Some(first)) {
                Some(first)
            } else {
                None
            }
        }
        Node::Star(_, _) | Node::Plus(_, _) => None,
        Node::Opt(_, _) => None,
        Node::Repeat { node, min, max, .. } => match max {
            Some(max) if *max == *min => fixed_width(node).map(|w| w * min),
            _ => None,
        },
        Node::Char(_) | Node::Any | Node::Class { .. } | Node::Digit(_) | Node::Word(_) | Node::Space(_) => Some(1),
        Node::Start | Node::End | Node::WordBoundary(_) | Node::Lookahead(_, _) | Node::Lookbehind(_, _) => Some(0),
        Node::Group(inner, _) => fixed_width(inner),
        Node::Backref(_) => None,
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    next_group: u32,
}

impl<'a> Parser<'a> {
    fn parse_alt(&mut self) -> Result<Node, String> {
        let mut branches = vec![self.parse_seq()?];
        while self.peek_is('|') {
            self.chars.next();
            branches.push(self.parse_seq()?);
        }
        Ok(if branches.len() == 1 { branches.pop().unwrap() } else { Node::Alt(branches) })
    }

    fn parse_seq(&mut self) -> Result<Node, String> {
        let mut items = Vec::new();
        while let Some(&c) = self.chars.peek() {
            if c == '|' || c == ')' {
                break;
            }
            items.push(self.parse_quantified()?);
        }
        Ok(Node::Seq(items))
    }

    fn parse_quantified(&mut self) -> Result<Node, String> {
        let atom = self.parse_atom()?;
        match self.chars.peek().copied() {
            Some('*') => {
                self.chars.next();
                let greedy = self.consume_lazy();
                Ok(Node::Star(Box::new(atom), greedy))
            }
            Some('+') => {
                self.chars.next();
                let greedy = self.consume_lazy();
                Ok(Node::Plus(Box::new(atom), greedy))
            }
            Some('?') => {
                self.chars.next();
                let greedy = self.consume_lazy();
                Ok(Node::Opt(Box::new(atom), greedy))
            }
            Some('{') => match self.try_parse_bounded() {
                Some((min, max)) => {
                    let greedy = self.consume_lazy();
                    Ok(Node::Repeat { node: Box::new(atom), min, max, greedy })
                }
                None => Ok(atom),
            },
            _ => Ok(atom),
        }
    }

    fn consume_lazy(&mut self) -> bool {
        if self.peek_is('?') {
            self.chars.next();
            false
        } else {
            true
        }
    }

    /// Looks ahead for a `{min[,max]}` bound without consuming input on a
    /// mismatch — `{` with no valid bound is a literal brace (common regex
    /// convention this parser also follows).
    fn try_parse_bounded(&mut self) -> Option<(u32, Option<u32>)> {
        let mut probe = self.chars.clone();
        if probe.next() != Some('{') {
            return None;
        }
        let mut min_s = String::new();
        while let Some(&c) = probe.peek() {
            if c.is_ascii_digit() {
                min_s.push(c);
                probe.next();
            } else {
                break;
            }
        }
        if min_s.is_empty() {
            return None;
        }
        let mut max_s: Option<String> = None;
        if probe.peek() == Some(&',') {
            probe.next();
            let mut s = String::new();
            while let Some(&c) = probe.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    probe.next();
                } else {
                    break;
                }
            }
            max_s = Some(s);
        }
        if probe.next() != Some('}') {
            return None;
        }
        self.chars = probe;
        let min: u32 = min_s.parse().ok()?;
        let max = match max_s {
            None => Some(min),
            Some(s) if s.is_empty() => None,
            Some(s) => s.parse().ok(),
        };
        Some((min, max))
    }

    fn peek_is(&mut self, c: char) -> bool {
        self.chars.peek() == Some(&c)
    }

    fn parse_atom(&mut self) -> Result<Node, String> {
        let c = self.chars.next().ok_or_else(|| "unexpected end of pattern".to_string())?;
        match c {
            '.' => Ok(Node::Any),
            '^' => Ok(Node::Start),
            '$' => Ok(Node::End),
            '(' => self.parse_group(),
            '[' => self.parse_class(),
            '\\' => self.parse_escape(),
            other => Ok(Node::Char(other)),
        }
    }

    fn parse_group(&mut self) -> Result<Node, String> {
        if self.peek_is('?') {
            self.chars.next();
            match self.chars.next() {
                Some(':') => {
                    let inner = self.parse_alt()?;
                    self.expect(')')?;
                    Ok(Node::Group(Box::new(inner), None))
                }
                Some('=') => {
                    let inner = self.parse_alt()?;
                    self.expect(')')?;
                    Ok(Node::Lookahead(Box::new(inner), false))
                }
                Some('!') => {
                    let inner = self.parse_alt()?;
                    self.expect(')')?;
                    Ok(Node::Lookahead(Box::new(inner), true))
                }
                Some('<') => match self.chars.next() {
                    Some('=') => {
                        let inner = self.parse_alt()?;
                        self.expect(')')?;
                        Ok(Node::Lookbehind(Box::new(inner), false))
                    }
                    Some('!') => {
                        let inner = self.parse_alt()?;
                        self.expect(')')?;
                        Ok(Node::Lookbehind(Box::new(inner), true))
                    }
                    _ => Err("unsupported group syntax after '(?<'".to_string()),
                },
                _ => Err("unsupported group syntax after '(?'".to_string()),
            }
        } else {
            let idx = self.next_group;
            self.next_group += 1;
            let inner = self.parse_alt()?;
            self.expect(')')?;
            Ok(Node::Group(Box::new(inner), Some(idx)))
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.chars.next() == Some(c) {
            Ok(())
        } else {
            Err(format!("expected '{c}' in pattern"))
        }
    }

    fn parse_class(&mut self) -> Result<Node, String> {
        let negated = self.peek_is('^');
        if negated {
            self.chars.next();
        }
        let mut ranges = Vec::new();
        let mut first = true;
        loop {
            match self.chars.next() {
                None => return Err("unterminated character class".to_string()),
                Some(']') if !first => break,
                Some(c) => {
                    first = false;
                    let lo = if c == '\\' { self.escape_char_in_class()? } else { c };
                    if self.peek_is('-') {
                        let mut probe = self.chars.clone();
                        probe.next();
                        if let Some(&next) = probe.peek() {
                            if next != ']' {
                                self.chars.next();
                                let hc = self.chars.next().unwrap();
                                let hi = if hc == '\\' { self.escape_char_in_class()? } else { hc };
                                ranges.push((lo, hi));
                                continue;
                            }
                        }
                    }
                    ranges.push((lo, lo));
                }
            }
        }
        Ok(Node::Class { ranges, negated })
    }

    fn escape_char_in_class(&mut self) -> Result<char, String> {
        match self.chars.next() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some(c) => Ok(c),
            None => Err("dangling escape in character class".to_string()),
        }
    }

    fn parse_escape(&mut self) -> Result<Node, String> {
        match self.chars.next() {
            Some('d') => Ok(Node::Digit(false)),
            Some('D') => Ok(Node::Digit(true)),
            Some('w') => Ok(Node::Word(false)),
            Some('W') => Ok(Node::Word(true)),
            Some('s') => Ok(Node::Space(false)),
            Some('S') => Ok(Node::Space(true)),
            Some('b') => Ok(Node::WordBoundary(false)),
            Some('B') => Ok(Node::WordBoundary(true)),
            Some('n') => Ok(Node::Char('\n')),
            Some('t') => Ok(Node::Char('\t')),
            Some('r') => Ok(Node::Char('\r')),
            Some(c) if c.is_ascii_digit() && c != '0' => Ok(Node::Backref(c.to_digit(10).unwrap())),
            Some(c) => Ok(Node::Char(c)),
            None => Err("dangling escape at end of pattern".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_alternation_into_two_branches() {
        let node = parse("ab|cd").unwrap();
        match node {
            Node::Alt(branches) => assert_eq!(branches.len(), 2),
            other => panic!("expected Alt, got {other:?}"),
        }
    }

    #[test]
    fn counts_nested_explicit_capture_groups() {
        let node = parse("(a(b)c)(d)").unwrap();
        assert_eq!(max_group_index(&node), 3);
    }

    #[test]
    fn non_capturing_group_does_not_consume_a_group_slot() {
        let node = parse("(?:ab)(c)").unwrap();
        assert_eq!(max_group_index(&node), 1);
    }

    #[test]
    fn bounded_repeat_of_fixed_width_atom_has_fixed_width() {
        let node = parse("a{3}").unwrap();
        assert_eq!(fixed_width(&node), Some(3));
    }

    #[test]
    fn star_is_not_fixed_width() {
        let node = parse("a*").unwrap();
        assert_eq!(fixed_width(&node), None);
    }

    #[test]
    fn lookahead_is_zero_width() {
        let node = parse("(?=ab)").unwrap();
        assert_eq!(fixed_width(&node), Some(0));
    }
}
