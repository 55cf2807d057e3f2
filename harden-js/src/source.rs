use std::fmt::Display;
use std::rc::Rc;

/// Evaluated source text with precomputed line starts.
#[derive(Debug, Clone)]
pub struct SourceText {
  pub name: Rc<str>,
  pub text: Rc<str>,
  line_starts: Vec<u32>,
}

impl SourceText {
  pub fn new(name: impl Into<Rc<str>>, text: impl Into<Rc<str>>) -> Self {
    let name = name.into();
    let text = text.into();
    let mut line_starts = vec![0u32];

    for (idx, ch) in text.char_indices() {
      if ch == '\n' {
        let next = (idx + 1).min(text.len());
        if let Ok(next) = u32::try_from(next) {
          line_starts.push(next);
        }
      }
    }

    Self {
      name,
      text,
      line_starts,
    }
  }

  /// Convert a UTF-8 byte offset into 1-based `(line, col)` numbers.
  ///
  /// Offsets that fall outside the text are clamped; offsets that fall inside a
  /// UTF-8 sequence are clamped backwards to the nearest valid char boundary.
  pub fn line_col(&self, offset: usize) -> (u32, u32) {
    let mut offset = offset.min(self.text.len());
    while offset > 0 && !self.text.is_char_boundary(offset) {
      offset -= 1;
    }

    let offset_u32 = u32::try_from(offset).unwrap_or(u32::MAX);
    let line_idx = match self.line_starts.binary_search(&offset_u32) {
      Ok(idx) => idx,
      Err(0) => 0,
      Err(idx) => idx - 1,
    };
    let line_start = self.line_starts.get(line_idx).copied().unwrap_or(0) as usize;
    let col0 = self.text[line_start..offset].chars().count() as u32;
    (line_idx as u32 + 1, col0 + 1)
  }

  pub fn frame(&self, function: Option<Rc<str>>, offset: usize) -> StackFrame {
    let (line, col) = self.line_col(offset);
    StackFrame {
      function,
      source: self.name.clone(),
      line,
      col,
    }
  }
}

/// A single captured call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
  pub function: Option<Rc<str>>,
  pub source: Rc<str>,
  pub line: u32,
  pub col: u32,
}

impl Display for StackFrame {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.function {
      Some(function) => write!(
        f,
        "{function} ({source}:{line}:{col})",
        function = function,
        source = self.source,
        line = self.line,
        col = self.col
      ),
      None => write!(
        f,
        "{source}:{line}:{col}",
        source = self.source,
        line = self.line,
        col = self.col
      ),
    }
  }
}
