//! Operator precedence for Pratt parsing.

use crate::lexer::TokenKind;

/// Operator precedence levels (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Assignment = 1, // =
    Or = 2,         // ||
    And = 3,        // &&
    BitOr = 4,      // |
    BitXor = 5,     // ^
    BitAnd = 6,     // &
    Equality = 7,   // == !=
    Comparison = 8, // < > <= >=
    Shift = 9,      // << >>
    Term = 10,      // + -
    Factor = 11,    // * / %
    Exponent = 12,  // **
    Unary = 13,     // ! - ~
    Call = 14,      // . () []
    Primary = 15,
}

impl Precedence {
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Shift,
            Precedence::Shift => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Exponent,
            Precedence::Exponent => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

/// Infix binding power of a token.
pub fn get_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::PipePipe => Precedence::Or,
        TokenKind::AmpAmp => Precedence::And,
        TokenKind::Pipe => Precedence::BitOr,
        TokenKind::Caret => Precedence::BitXor,
        TokenKind::Amp => Precedence::BitAnd,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::Comparison
        }
        TokenKind::ShiftLeft | TokenKind::ShiftRight => Precedence::Shift,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::StarStar => Precedence::Exponent,
        TokenKind::LeftParen | TokenKind::Dot | TokenKind::LeftBracket => Precedence::Call,
        _ => Precedence::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Precedence::Assignment < Precedence::Or);
        assert!(Precedence::BitAnd < Precedence::Equality);
        assert!(Precedence::Shift < Precedence::Term);
        assert!(Precedence::Exponent > Precedence::Factor);
        assert_eq!(Precedence::Unary.next(), Precedence::Call);
    }

    #[test]
    fn test_token_precedence() {
        assert_eq!(get_precedence(TokenKind::StarStar), Precedence::Exponent);
        assert_eq!(get_precedence(TokenKind::Caret), Precedence::BitXor);
        assert_eq!(get_precedence(TokenKind::Equal), Precedence::None);
        assert_eq!(get_precedence(TokenKind::LeftBracket), Precedence::Call);
    }
}
