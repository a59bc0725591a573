use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::syntax::ast::{Ast, BinaryOp, RefOrigin, UnaryOp};
use crate::syntax::error::SyntaxError;
use crate::syntax::lexer::Lexer;
use crate::syntax::token::{POSTFIX_PRIORITY, Token, TokenKind, operator_info};

/// Parse formula text into an [`Ast`].
pub fn parse(text: &str) -> Result<Ast, SyntaxError> {
    Parser::new(text).parse()
}

/// Resolves a token stream by folding pending operator tokens, highest
/// priority first, over a doubly linked sequence of operand slots.
///
/// Equal priorities fold left to right; unary operators fold right to left
/// so chained negation nests correctly. Bracketed groups recurse into the
/// same routine. After the fold heap drains, adjacent operands combine via
/// implicit multiplication and separator tokens split the remainder into
/// vector legs.
pub struct Parser {
    text: String,
    tokens: Vec<Token>,
    pos: usize,
}

enum Item {
    Operand(Ast),
    Pending(Token),
    /// A bracketed index expression waiting to fold with the operand to
    /// its left.
    PendingIndex(Ast, Token),
    Separator(Token),
}

struct Slot {
    item: Option<Item>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Vec-backed doubly linked list; folded slots unlink in place so the
/// neighbors of a pending operator are always current.
struct Sequence {
    slots: Vec<Slot>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Sequence {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn push(&mut self, item: Item) -> usize {
        let idx = self.slots.len();
        self.slots.push(Slot {
            item: Some(item),
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        idx
    }

    fn item(&self, idx: usize) -> Option<&Item> {
        self.slots[idx].item.as_ref()
    }

    fn tail_item(&self) -> Option<&Item> {
        self.tail.and_then(|idx| self.item(idx))
    }

    fn prev(&self, idx: usize) -> Option<usize> {
        self.slots[idx].prev
    }

    fn next(&self, idx: usize) -> Option<usize> {
        self.slots[idx].next
    }

    fn is_operand(&self, idx: usize) -> bool {
        matches!(self.item(idx), Some(Item::Operand(_)))
    }

    fn remove(&mut self, idx: usize) -> Option<Item> {
        let item = self.slots[idx].item.take();
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
        item
    }

    fn take_operand(&mut self, idx: usize) -> Ast {
        match self.remove(idx) {
            Some(Item::Operand(ast)) => ast,
            _ => unreachable!("slot checked to hold an operand"),
        }
    }

    fn set(&mut self, idx: usize, item: Item) {
        self.slots[idx].item = Some(item);
    }
}

/// Pending operator ordering: highest priority first, ties by sequence
/// index (right-to-left for unary operators).
#[derive(Debug, PartialEq, Eq)]
struct HeapEntry {
    priority: u8,
    right_to_left: bool,
    seq: u32,
    slot: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| {
                if self.right_to_left {
                    self.seq.cmp(&other.seq)
                } else {
                    other.seq.cmp(&self.seq)
                }
            })
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The separator-split result of one bracketed (or top) level: rows of
/// comma-separated operands, with `;` starting a new row.
struct Legs {
    rows: Vec<Vec<Ast>>,
    had_separator: bool,
}

impl Legs {
    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn single(mut self) -> Option<Ast> {
        if self.rows.len() == 1 && self.rows[0].len() == 1 {
            self.rows.pop().and_then(|mut row| row.pop())
        } else {
            None
        }
    }

    /// Vector elements: one per comma item, or one nested vector per row
    /// when `;` produced several rows.
    fn into_elements(mut self) -> Vec<Ast> {
        if self.rows.len() <= 1 {
            self.rows.pop().unwrap_or_default()
        } else {
            self.rows
                .into_iter()
                .map(|row| Ast::Vector { elements: row })
                .collect()
        }
    }

    /// All operands in order, rows flattened; used for call arguments.
    fn flatten(self) -> Vec<Ast> {
        self.rows.into_iter().flatten().collect()
    }
}

impl Parser {
    pub fn new(text: &str) -> Self {
        let mut lexer = Lexer::new(text);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Self {
            text: text.to_string(),
            tokens,
            pos: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Ast, SyntaxError> {
        trace!(text = %self.text, "parse");
        let legs = self.parse_sequence(None)?;
        if legs.is_empty() {
            let eof = self.tokens.last().expect("token stream ends with eof").clone();
            return Err(self.empty_expression(eof));
        }
        if legs.had_separator {
            return Ok(Ast::Vector {
                elements: legs.into_elements(),
            });
        }
        let eof = self.tokens.last().expect("token stream ends with eof").clone();
        legs.single().ok_or_else(|| self.empty_expression(eof))
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn parse_sequence(
        &mut self,
        closer: Option<(TokenKind, Token)>,
    ) -> Result<Legs, SyntaxError> {
        let mut seq = Sequence::new();
        let mut heap = BinaryHeap::new();
        let mut counter: u32 = 0;

        loop {
            let token = self.current().clone();
            if token.kind == TokenKind::Eof {
                if let Some((_, opener)) = closer {
                    return Err(self.unmatched(opener));
                }
                break;
            }
            if let Some((close_kind, _)) = &closer
                && token.kind == *close_kind
            {
                self.advance();
                break;
            }
            match token.kind {
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    return Err(self.unexpected(token));
                }
                TokenKind::Number => {
                    let n: f64 = token
                        .literal
                        .parse()
                        .map_err(|_| self.invalid_number(token.clone()))?;
                    seq.push(Item::Operand(Ast::Number(n)));
                    self.advance();
                }
                TokenKind::Str => {
                    seq.push(Item::Operand(Ast::Str(token.literal.clone())));
                    self.advance();
                }
                TokenKind::True => {
                    seq.push(Item::Operand(Ast::Bool(true)));
                    self.advance();
                }
                TokenKind::False => {
                    seq.push(Item::Operand(Ast::Bool(false)));
                    self.advance();
                }
                TokenKind::Null => {
                    seq.push(Item::Operand(Ast::Null));
                    self.advance();
                }
                TokenKind::Ident => {
                    self.advance();
                    if self.current().kind == TokenKind::LParen {
                        let opener = self.current().clone();
                        self.advance();
                        let legs =
                            self.parse_sequence(Some((TokenKind::RParen, opener)))?;
                        seq.push(Item::Operand(Ast::Call {
                            name: token.literal.clone(),
                            args: legs.flatten(),
                        }));
                    } else {
                        seq.push(Item::Operand(Ast::Reference {
                            origin: RefOrigin::Root,
                            path: vec![token.literal.clone()],
                        }));
                    }
                }
                TokenKind::LParen => {
                    self.advance();
                    let legs =
                        self.parse_sequence(Some((TokenKind::RParen, token.clone())))?;
                    let ast = if legs.had_separator {
                        Ast::Vector {
                            elements: legs.into_elements(),
                        }
                    } else {
                        legs.single()
                            .ok_or_else(|| self.empty_expression(token.clone()))?
                    };
                    seq.push(Item::Operand(ast));
                }
                TokenKind::LBrace => {
                    self.advance();
                    let legs =
                        self.parse_sequence(Some((TokenKind::RBrace, token.clone())))?;
                    let elements = if legs.is_empty() {
                        Vec::new()
                    } else if legs.had_separator {
                        legs.into_elements()
                    } else {
                        vec![
                            legs.single()
                                .ok_or_else(|| self.empty_expression(token.clone()))?,
                        ]
                    };
                    seq.push(Item::Operand(Ast::Vector { elements }));
                }
                TokenKind::LBracket => {
                    self.advance();
                    let legs =
                        self.parse_sequence(Some((TokenKind::RBracket, token.clone())))?;
                    let index = legs
                        .single()
                        .ok_or_else(|| self.empty_expression(token.clone()))?;
                    let slot = seq.push(Item::PendingIndex(index, token.clone()));
                    heap.push(HeapEntry {
                        priority: POSTFIX_PRIORITY,
                        right_to_left: false,
                        seq: counter,
                        slot,
                    });
                    counter += 1;
                }
                TokenKind::Comma | TokenKind::Semicolon => {
                    seq.push(Item::Separator(token.clone()));
                    self.advance();
                }
                TokenKind::Illegal => return Err(self.unrecognized(token)),
                _ => {
                    // An operator. A `-` with no operand to its left is
                    // unary negation.
                    let mut kind = token.kind;
                    if kind == TokenKind::Minus
                        && !matches!(seq.tail_item(), Some(Item::Operand(_)))
                    {
                        kind = TokenKind::Negate;
                    }
                    let Some(info) = operator_info(kind) else {
                        return Err(self.unexpected(token));
                    };
                    let mut pending = token.clone();
                    pending.kind = kind;
                    let slot = seq.push(Item::Pending(pending));
                    heap.push(HeapEntry {
                        priority: info.priority,
                        right_to_left: info.right_to_left,
                        seq: counter,
                        slot,
                    });
                    counter += 1;
                    self.advance();
                }
            }
        }

        self.drain(&mut seq, &mut heap, &mut counter)?;
        self.implicit_multiply(&mut seq);
        self.split_legs(seq)
    }

    /// Fold pending tokens highest priority first. A token that mutates
    /// into a different operator is re-enqueued instead of resolved.
    fn drain(
        &mut self,
        seq: &mut Sequence,
        heap: &mut BinaryHeap<HeapEntry>,
        counter: &mut u32,
    ) -> Result<(), SyntaxError> {
        while let Some(entry) = heap.pop() {
            let pending = match seq.item(entry.slot) {
                Some(Item::Pending(token)) => Some(token.clone()),
                Some(Item::PendingIndex(..)) => None,
                _ => continue,
            };
            let Some(token) = pending else {
                self.fold_index(seq, entry.slot)?;
                continue;
            };
            match token.kind {
                TokenKind::Dot => self.fold_dot(seq, entry.slot, &token)?,
                TokenKind::Negate | TokenKind::Bang | TokenKind::Tilde => {
                    self.fold_unary(seq, entry.slot, &token)?
                }
                TokenKind::Colon => self.fold_range(seq, entry.slot, &token)?,
                TokenKind::Question => {
                    if !self.fold_question(seq, entry.slot, &token)? {
                        heap.push(HeapEntry {
                            priority: POSTFIX_PRIORITY,
                            right_to_left: false,
                            seq: *counter,
                            slot: entry.slot,
                        });
                        *counter += 1;
                    }
                }
                TokenKind::QuestionPostfix => self.fold_evaluate(seq, entry.slot, &token)?,
                _ => self.fold_binary(seq, entry.slot, &token)?,
            }
        }
        Ok(())
    }

    fn fold_binary(
        &self,
        seq: &mut Sequence,
        slot: usize,
        token: &Token,
    ) -> Result<(), SyntaxError> {
        let op = binary_op(token.kind)
            .unwrap_or_else(|| unreachable!("fold_binary on non-binary token"));
        let (Some(li), Some(ri)) = (seq.prev(slot), seq.next(slot)) else {
            return Err(self.missing_operand(token.clone()));
        };
        if !seq.is_operand(li) || !seq.is_operand(ri) {
            return Err(self.missing_operand(token.clone()));
        }
        let left = seq.take_operand(li);
        let right = seq.take_operand(ri);
        seq.set(
            slot,
            Item::Operand(Ast::Binary {
                op,
                left: left.boxed(),
                right: right.boxed(),
            }),
        );
        Ok(())
    }

    fn fold_unary(
        &self,
        seq: &mut Sequence,
        slot: usize,
        token: &Token,
    ) -> Result<(), SyntaxError> {
        let op = match token.kind {
            TokenKind::Negate => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => unreachable!("fold_unary on non-unary token"),
        };
        let Some(ri) = seq.next(slot) else {
            return Err(self.missing_operand(token.clone()));
        };
        if !seq.is_operand(ri) {
            return Err(self.missing_operand(token.clone()));
        }
        let operand = seq.take_operand(ri);
        seq.set(
            slot,
            Item::Operand(Ast::Unary {
                op,
                operand: operand.boxed(),
            }),
        );
        Ok(())
    }

    fn fold_range(
        &self,
        seq: &mut Sequence,
        slot: usize,
        token: &Token,
    ) -> Result<(), SyntaxError> {
        let (Some(li), Some(ri)) = (seq.prev(slot), seq.next(slot)) else {
            return Err(self.missing_operand(token.clone()));
        };
        if !seq.is_operand(li) || !seq.is_operand(ri) {
            return Err(self.missing_operand(token.clone()));
        }
        let from = seq.take_operand(li);
        let to = seq.take_operand(ri);
        seq.set(
            slot,
            Item::Operand(Ast::Range {
                from: from.boxed(),
                to: to.boxed(),
            }),
        );
        Ok(())
    }

    /// `a.b` merges reference paths; `expr.b` walks the evaluated context
    /// of `expr`; a leading `.` marks the reference relative.
    fn fold_dot(
        &self,
        seq: &mut Sequence,
        slot: usize,
        token: &Token,
    ) -> Result<(), SyntaxError> {
        let Some(ri) = seq.next(slot) else {
            return Err(self.missing_operand(token.clone()));
        };
        let right_is_name = matches!(
            seq.item(ri),
            Some(Item::Operand(Ast::Reference {
                origin: RefOrigin::Root,
                ..
            }))
        );
        if !right_is_name {
            return Err(self.expected_identifier(token.clone()));
        }
        let right_path = match seq.take_operand(ri) {
            Ast::Reference { path, .. } => path,
            _ => unreachable!("checked above"),
        };
        let folded = match seq.prev(slot) {
            Some(li) if seq.is_operand(li) => match seq.take_operand(li) {
                Ast::Reference { origin, mut path } => {
                    path.extend(right_path);
                    Ast::Reference { origin, path }
                }
                base => Ast::Reference {
                    origin: RefOrigin::Expr(base.boxed()),
                    path: right_path,
                },
            },
            _ => Ast::Reference {
                origin: RefOrigin::Relative,
                path: right_path,
            },
        };
        seq.set(slot, Item::Operand(folded));
        Ok(())
    }

    /// Ternary when a folded `Range` sits to the right; otherwise the token
    /// mutates into the postfix evaluation operator (returns `false` so the
    /// caller re-enqueues it).
    fn fold_question(
        &self,
        seq: &mut Sequence,
        slot: usize,
        token: &Token,
    ) -> Result<bool, SyntaxError> {
        let range_to_right = seq
            .next(slot)
            .is_some_and(|ri| matches!(seq.item(ri), Some(Item::Operand(Ast::Range { .. }))));
        if !range_to_right {
            let mut mutated = token.clone();
            mutated.kind = TokenKind::QuestionPostfix;
            seq.set(slot, Item::Pending(mutated));
            return Ok(false);
        }

        let Some(ci) = seq.prev(slot) else {
            return Err(self.missing_operand(token.clone()));
        };
        if !seq.is_operand(ci) {
            return Err(self.missing_operand(token.clone()));
        }
        let condition = seq.take_operand(ci);
        let ri = seq.next(slot).expect("checked above");
        let (then_branch, else_branch) = match seq.take_operand(ri) {
            Ast::Range { from, to } => (from, to),
            _ => unreachable!("checked above"),
        };
        seq.set(
            slot,
            Item::Operand(Ast::Ternary {
                condition: condition.boxed(),
                then_branch,
                else_branch,
            }),
        );
        Ok(true)
    }

    fn fold_evaluate(
        &self,
        seq: &mut Sequence,
        slot: usize,
        token: &Token,
    ) -> Result<(), SyntaxError> {
        let Some(li) = seq.prev(slot) else {
            return Err(self.missing_operand(token.clone()));
        };
        if !seq.is_operand(li) {
            return Err(self.missing_operand(token.clone()));
        }
        let operand = seq.take_operand(li);
        seq.set(
            slot,
            Item::Operand(Ast::Evaluate {
                operand: operand.boxed(),
            }),
        );
        Ok(())
    }

    fn fold_index(&self, seq: &mut Sequence, slot: usize) -> Result<(), SyntaxError> {
        let Some(Item::PendingIndex(_, bracket)) = seq.item(slot) else {
            unreachable!("fold_index on non-index slot");
        };
        let bracket = bracket.clone();
        let Some(li) = seq.prev(slot) else {
            return Err(self.missing_operand(bracket));
        };
        if !seq.is_operand(li) {
            return Err(self.missing_operand(bracket));
        }
        let base = seq.take_operand(li);
        let Some(Item::PendingIndex(index, _)) = seq.slots[slot].item.take() else {
            unreachable!()
        };
        seq.set(
            slot,
            Item::Operand(Ast::Index {
                base: base.boxed(),
                index: index.boxed(),
            }),
        );
        Ok(())
    }

    /// Two adjacent operands with nothing between them multiply.
    fn implicit_multiply(&self, seq: &mut Sequence) {
        let mut current = seq.head;
        while let Some(i) = current {
            let next = seq.next(i);
            if let Some(j) = next
                && seq.is_operand(i)
                && seq.is_operand(j)
            {
                let right = seq.take_operand(j);
                let left = match seq.slots[i].item.take() {
                    Some(Item::Operand(ast)) => ast,
                    _ => unreachable!(),
                };
                seq.set(
                    i,
                    Item::Operand(Ast::Binary {
                        op: BinaryOp::Multiply,
                        left: left.boxed(),
                        right: right.boxed(),
                    }),
                );
                continue;
            }
            current = next;
        }
    }

    fn split_legs(&self, seq: Sequence) -> Result<Legs, SyntaxError> {
        let mut rows: Vec<Vec<Ast>> = Vec::new();
        let mut row: Vec<Ast> = Vec::new();
        let mut had_separator = false;
        let mut need_operand = false;
        let mut saw_any = false;

        let mut current = seq.head;
        while let Some(idx) = current {
            current = seq.next(idx);
            match &seq.slots[idx].item {
                Some(Item::Operand(ast)) => {
                    row.push(ast.clone());
                    need_operand = false;
                    saw_any = true;
                }
                Some(Item::Separator(token)) => {
                    if row.is_empty() || need_operand {
                        return Err(self.missing_operand(token.clone()));
                    }
                    had_separator = true;
                    need_operand = true;
                    if token.kind == TokenKind::Semicolon {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                Some(Item::Pending(token)) | Some(Item::PendingIndex(_, token)) => {
                    return Err(self.missing_operand(token.clone()));
                }
                None => unreachable!("linked slot holds no item"),
            }
        }
        if need_operand {
            // Trailing separator.
            let eof = self.tokens.last().expect("token stream ends with eof").clone();
            return Err(self.empty_expression(eof));
        }
        if !row.is_empty() {
            rows.push(row);
        }
        if !saw_any {
            rows.clear();
        }
        Ok(Legs {
            rows,
            had_separator,
        })
    }

    fn parsed_before(&self, token: &Token) -> String {
        self.text
            .get(..token.offset)
            .unwrap_or(&self.text)
            .to_string()
    }

    fn unexpected(&self, token: Token) -> SyntaxError {
        SyntaxError::UnexpectedToken {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }

    fn unmatched(&self, token: Token) -> SyntaxError {
        SyntaxError::UnmatchedBracket {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }

    fn missing_operand(&self, token: Token) -> SyntaxError {
        SyntaxError::MissingOperand {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }

    fn expected_identifier(&self, token: Token) -> SyntaxError {
        SyntaxError::ExpectedIdentifier {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }

    fn unrecognized(&self, token: Token) -> SyntaxError {
        SyntaxError::UnrecognizedToken {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }

    fn invalid_number(&self, token: Token) -> SyntaxError {
        SyntaxError::InvalidNumber {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }

    fn empty_expression(&self, token: Token) -> SyntaxError {
        SyntaxError::EmptyExpression {
            parsed: self.parsed_before(&token),
            lexeme: token.literal,
            position: token.position,
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Caret => BinaryOp::Power,
        TokenKind::And | TokenKind::Amp => BinaryOp::And,
        TokenKind::Or | TokenKind::Bar => BinaryOp::Or,
        TokenKind::Xor => BinaryOp::Xor,
        TokenKind::Gt => BinaryOp::Greater,
        TokenKind::Lt => BinaryOp::Less,
        TokenKind::Ge => BinaryOp::GreaterEq,
        TokenKind::Le => BinaryOp::LessEq,
        TokenKind::Eq => BinaryOp::Equal,
        TokenKind::NotEq => BinaryOp::NotEqual,
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &str) -> String {
        parse(input).expect("parse failed").to_string()
    }

    #[test]
    fn test_operator_precedence() {
        let tests = vec![
            ("3+4*2", "(3 + (4 * 2))"),
            ("(3+4)*2", "((3 + 4) * 2)"),
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a = b and c > d", "((a = b) and (c > d))"),
            ("2^3^2", "((2 ^ 3) ^ 2)"),
            ("--3", "(-(-3))"),
            ("1 + 2 < 3 * 4", "((1 + 2) < (3 * 4))"),
        ];
        for (input, expected) in tests {
            assert_eq!(parsed(input), expected, "failed for: {}", input);
        }
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(parsed("2(3+4)"), "(2 * (3 + 4))");
        assert_eq!(parsed("2 x"), "(2 * x)");
        assert_eq!(parsed("2 x y"), "((2 * x) * y)");
    }

    #[test]
    fn test_references() {
        assert_eq!(parsed("a.b.c"), "a.b.c");
        assert_eq!(parsed(".x"), ".x");
        assert_eq!(parsed("a.b + 1"), "(a.b + 1)");
    }

    #[test]
    fn test_vector_literals() {
        assert_eq!(parsed("{1, 2, 3}"), "{1, 2, 3}");
        assert_eq!(parsed("{1, 2; 3, 4}"), "{{1, 2}, {3, 4}}");
        assert_eq!(parsed("{}"), "{}");
        assert_eq!(parsed("{5}"), "{5}");
    }

    #[test]
    fn test_top_level_separators_build_a_vector() {
        assert_eq!(parsed("1, 2"), "{1, 2}");
        assert_eq!(parsed("1; 2"), "{{1}, {2}}");
    }

    #[test]
    fn test_indexing() {
        assert_eq!(parsed("v[0]"), "(v[0])");
        assert_eq!(parsed("v[1+1]"), "(v[(1 + 1)])");
        assert_eq!(parsed("v[0].x"), "((v[0])).x");
    }

    #[test]
    fn test_calls() {
        assert_eq!(parsed("min(1, 2)"), "min(1, 2)");
        assert_eq!(parsed("max()"), "max()");
        assert_eq!(parsed("sum(1, 2+3, x)"), "sum(1, (2 + 3), x)");
    }

    #[test]
    fn test_ternary_and_range() {
        assert_eq!(parsed("1:5"), "(1:5)");
        assert_eq!(parsed("a ? 1 : 2"), "(a ? 1 : 2)");
        assert_eq!(parsed("a ? b+1 : c"), "(a ? (b + 1) : c)");
        assert_eq!(parsed("x?"), "(x?)");
    }

    #[test]
    fn test_unmatched_bracket() {
        let err = parse("(1+2").unwrap_err();
        assert!(matches!(err, SyntaxError::UnmatchedBracket { .. }));
        assert_eq!(err.lexeme(), "(");

        let err = parse("1+2)").unwrap_err();
        assert!(matches!(err, SyntaxError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_missing_operand() {
        let err = parse("1+").unwrap_err();
        assert!(matches!(err, SyntaxError::MissingOperand { .. }));
        assert_eq!(err.lexeme(), "+");
        assert_eq!(err.parsed(), "1");
    }

    #[test]
    fn test_unrecognized_token() {
        let err = parse("1 # 2").unwrap_err();
        assert!(matches!(err, SyntaxError::UnrecognizedToken { .. }));
        assert_eq!(err.parsed(), "1 ");
    }

    #[test]
    fn test_empty_expression() {
        assert!(matches!(parse(""), Err(SyntaxError::EmptyExpression { .. })));
        assert!(matches!(parse("()"), Err(SyntaxError::EmptyExpression { .. })));
    }
}
