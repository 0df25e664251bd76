use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PathwayParseError {
    #[error("unbalanced parentheses in pathway structure")]
    UnbalancedParentheses,
    #[error("empty group in pathway structure")]
    EmptyGroup,
    #[error("empty reaction id (token was only dashes)")]
    EmptyReactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    And,
    Or,
}

/// One node of a pathway's structure tree. Explicit tagged variants replace
/// the sentinel-token encoding of the flat text form, so evaluation never
/// has to ask whether an element is a marker or a child.
#[derive(Debug, Clone, PartialEq)]
pub enum PathwayNode {
    Leaf { reaction: String, optional: bool },
    Join { kind: JoinKind, children: Vec<PathwayNode> },
}

impl PathwayNode {
    /// True if any leaf under this node is non-optional.
    pub fn has_required_leaf(&self) -> bool {
        match self {
            PathwayNode::Leaf { optional, .. } => !optional,
            PathwayNode::Join { children, .. } => {
                children.iter().any(|c| c.has_required_leaf())
            }
        }
    }

    /// All reaction ids under this node, optional leaves included, in
    /// first-seen order.
    pub fn reactions(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_reactions(&mut out);
        out
    }

    fn collect_reactions(&self, out: &mut Vec<String>) {
        match self {
            PathwayNode::Leaf { reaction, .. } => {
                if !out.iter().any(|r| r == reaction) {
                    out.push(reaction.clone());
                }
            }
            PathwayNode::Join { children, .. } => {
                for child in children {
                    child.collect_reactions(out);
                }
            }
        }
    }

    fn collect_key_reactions(&self, out: &mut BTreeSet<String>) {
        match self {
            PathwayNode::Leaf { reaction, optional } => {
                if !optional {
                    out.insert(reaction.clone());
                }
            }
            PathwayNode::Join { children, .. } => {
                for child in children {
                    child.collect_key_reactions(out);
                }
            }
        }
    }
}

/// A pathway's parsed tree plus its precomputed key-reaction set (every
/// reaction reachable as a non-optional leaf, AND/OR flattened).
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayStructure {
    pub root: PathwayNode,
    pub key_reactions: BTreeSet<String>,
}

impl PathwayStructure {
    /// Parses the flat textual encoding:
    /// - whitespace-separated tokens; `(`, `)` and `,` are tokens even when
    ///   abutting a word
    /// - a bare token is a required reaction; a leading dash run marks it
    ///   optional (the dashes are stripped from the id, however many)
    /// - parentheses group a sub-list; a top-level comma inside a group
    ///   (leading or separating) makes it an OR over the comma-separated
    ///   sub-groups; a leading `+` (or no marker) means AND
    pub fn from_str(text: &str) -> Result<Self, PathwayParseError> {
        let tokens = tokenize(text);
        let mut pos = 0;
        let root = parse_group(&tokens, &mut pos, false)?;
        if pos != tokens.len() {
            return Err(PathwayParseError::UnbalancedParentheses);
        }
        let mut key_reactions = BTreeSet::new();
        root.collect_key_reactions(&mut key_reactions);
        Ok(PathwayStructure { root, key_reactions })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    Word(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' | ',' => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
                tokens.push(match c {
                    '(' => Token::Open,
                    ')' => Token::Close,
                    _ => Token::Comma,
                });
            }
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
            }
            c => word.push(c),
        }
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }
    tokens
}

fn leaf_from_word(word: &str) -> Result<PathwayNode, PathwayParseError> {
    // optionality is only inferred from a literal leading dash run directly
    // abutting the token; dashes inside the id are part of the id
    let stripped = word.trim_start_matches('-');
    if stripped.is_empty() {
        return Err(PathwayParseError::EmptyReactionId);
    }
    Ok(PathwayNode::Leaf {
        reaction: stripped.to_string(),
        optional: stripped.len() != word.len(),
    })
}

/// Parses one group (the top level, or the contents of a parenthesized
/// sub-list up to its `)`), advancing `pos` past everything consumed.
///
/// Items are collected into comma-separated alternatives. A group with any
/// top-level comma is an OR over its alternatives; otherwise it is an AND
/// sequence. `+` tokens are join markers, not reactions, and are dropped.
fn parse_group(
    tokens: &[Token],
    pos: &mut usize,
    parenthesized: bool,
) -> Result<PathwayNode, PathwayParseError> {
    let mut alternatives: Vec<Vec<PathwayNode>> = Vec::new();
    let mut items: Vec<PathwayNode> = Vec::new();
    let mut saw_comma = false;

    loop {
        match tokens.get(*pos) {
            None => {
                if parenthesized {
                    return Err(PathwayParseError::UnbalancedParentheses);
                }
                break;
            }
            Some(Token::Close) => {
                if !parenthesized {
                    return Err(PathwayParseError::UnbalancedParentheses);
                }
                *pos += 1;
                break;
            }
            Some(Token::Comma) => {
                *pos += 1;
                saw_comma = true;
                alternatives.push(std::mem::take(&mut items));
            }
            Some(Token::Open) => {
                *pos += 1;
                items.push(parse_group(tokens, pos, true)?);
            }
            Some(Token::Word(w)) => {
                let word = w.clone();
                *pos += 1;
                if word != "+" {
                    items.push(leaf_from_word(&word)?);
                }
            }
        }
    }
    alternatives.push(items);

    if saw_comma {
        // a leading comma produces an empty first alternative; drop it
        let children: Vec<PathwayNode> = alternatives
            .into_iter()
            .filter(|alt| !alt.is_empty())
            .map(join_sequence)
            .collect();
        if children.is_empty() {
            return Err(PathwayParseError::EmptyGroup);
        }
        // a single-alternative OR is kept as a degenerate join; max over
        // one element is the element, so evaluation is unaffected
        Ok(PathwayNode::Join {
            kind: JoinKind::Or,
            children,
        })
    } else {
        let items = alternatives.pop().expect("one alternative");
        if items.is_empty() {
            return Err(PathwayParseError::EmptyGroup);
        }
        Ok(join_sequence(items))
    }
}

/// An AND over a sequence of items; a single-item sequence collapses to the
/// item itself.
fn join_sequence(mut items: Vec<PathwayNode>) -> PathwayNode {
    if items.len() == 1 {
        items.pop().expect("one item")
    } else {
        PathwayNode::Join {
            kind: JoinKind::And,
            children: items,
        }
    }
}
