use crate::{
    ast::{BinaryOp, UnaryOp},
    lex::TokenKind,
};

/// Operator fusion passes, from the tightest binding to the loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Unary,  // -
    Factor, // * / %
    Term,   // + -
}

impl Precedence {
    pub const PASSES: [Precedence; 3] = [Precedence::Unary, Precedence::Factor, Precedence::Term];

    /// The prefix operator `kind` denotes in this pass, if any.
    pub fn unary(self, kind: TokenKind) -> Option<UnaryOp> {
        match (self, kind) {
            (Precedence::Unary, TokenKind::Minus) => Some(UnaryOp::Negate),
            _ => None,
        }
    }

    /// The infix operator `kind` denotes in this pass, if any.
    pub fn binary(self, kind: TokenKind) -> Option<BinaryOp> {
        match (self, kind) {
            (Precedence::Factor, TokenKind::Star) => Some(BinaryOp::Multiply),
            (Precedence::Factor, TokenKind::Slash) => Some(BinaryOp::Divide),
            (Precedence::Factor, TokenKind::Percent) => Some(BinaryOp::Modulo),
            (Precedence::Term, TokenKind::Plus) => Some(BinaryOp::Add),
            (Precedence::Term, TokenKind::Minus) => Some(BinaryOp::Subtract),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operator_belongs_to_exactly_one_pass() {
        let operators = [
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
        ];
        for kind in operators {
            let binary = Precedence::PASSES
                .iter()
                .filter(|prec| prec.binary(kind).is_some())
                .count();
            assert_eq!(binary, 1, "{kind} should be infix in one pass");
        }
        assert_eq!(Precedence::Unary.unary(TokenKind::Minus), Some(UnaryOp::Negate));
        assert_eq!(Precedence::Term.unary(TokenKind::Minus), None);
    }
}
