use crate::js::error::SyntaxError;
use crate::js::error::SyntaxErrorType;
use crate::js::token::TT;

/// A location within the current source text expressed as UTF-8 byte offsets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Loc(pub usize, pub usize);

impl Loc {
  pub fn error(self, typ: SyntaxErrorType, actual_token: Option<TT>) -> SyntaxError {
    SyntaxError::new(typ, self, actual_token)
  }

  /// Grows this location to cover `other`.
  pub fn extend(&mut self, other: Loc) {
    self.0 = self.0.min(other.0);
    self.1 = self.1.max(other.1);
  }

  pub fn to(self, other: Loc) -> Loc {
    let mut loc = self;
    loc.extend(other);
    loc
  }
}
