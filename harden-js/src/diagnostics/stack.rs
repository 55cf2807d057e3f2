use crate::source::StackFrame;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

/// How much of a captured stack is shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackFiltering {
  /// Drop infrastructure frames and shorten package paths.
  #[default]
  Concise,
  Verbose,
}

static FILENAME_CENSORS: Lazy<[Regex; 4]> = Lazy::new(|| {
  [
    Regex::new(r"/node_modules/").unwrap(),
    Regex::new(r"^(?:node:)?internal/").unwrap(),
    Regex::new(r"/packages/ses/src/error/assert\.js$").unwrap(),
    Regex::new(r"/packages/eventual-send/src/").unwrap(),
  ]
});

static CALLSITE_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
  [
    // Everything up to a `/.../` elision.
    Regex::new(r"^((?:.*[( ])?)[:/\w_-]*/\.\.\./(.+)$").unwrap(),
    // Everything up to the last `packages/` directory.
    Regex::new(r"^((?:.*[( ])?)[:/\w_-]*/(packages/.+)$").unwrap(),
  ]
});

/// Whether frames from `file_name` survive concise filtering.
pub fn is_shown_file(file_name: &str) -> bool {
  !FILENAME_CENSORS.iter().any(|censor| censor.is_match(file_name))
}

pub fn shorten_call_site(call_site: &str) -> String {
  for pattern in CALLSITE_PATTERNS.iter() {
    if let Some(captures) = pattern.captures(call_site) {
      return captures
        .iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str())
        .collect();
    }
  }
  call_site.to_string()
}

/// Renders `frames` as consecutive `"\n  at {frame}"` lines.
pub fn render_frames(frames: &[StackFrame], filtering: StackFiltering) -> String {
  let mut out = String::new();
  for frame in frames {
    let line = match filtering {
      StackFiltering::Verbose => frame.to_string(),
      StackFiltering::Concise => {
        if !is_shown_file(&frame.source) {
          continue;
        }
        shorten_call_site(&frame.to_string())
      }
    };
    out.push_str("\n  at ");
    out.push_str(&line);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::render_frames;
  use super::shorten_call_site;
  use super::StackFiltering;
  use crate::source::StackFrame;
  use std::rc::Rc;

  fn frame(function: Option<&str>, source: &str) -> StackFrame {
    StackFrame {
      function: function.map(Rc::from),
      source: Rc::from(source),
      line: 3,
      col: 7,
    }
  }

  #[test]
  fn shortens_package_paths() {
    assert_eq!(
      shorten_call_site("foo (/home/me/src/agoric/packages/zoe/src/zoe.js:1:2)"),
      "foo (packages/zoe/src/zoe.js:1:2)"
    );
    assert_eq!(shorten_call_site("/a/b/.../c/d.js:1:1"), "c/d.js:1:1");
    assert_eq!(shorten_call_site("main.js:1:1"), "main.js:1:1");
  }

  #[test]
  fn concise_drops_censored_frames() {
    let frames = vec![
      frame(Some("f"), "app.js"),
      frame(None, "/x/node_modules/dep/index.js"),
      frame(None, "node:internal/process"),
      frame(Some("g"), "/repo/packages/eventual-send/src/E.js"),
    ];
    assert_eq!(render_frames(&frames, StackFiltering::Concise), "\n  at f (app.js:3:7)");
    assert_eq!(render_frames(&frames, StackFiltering::Verbose).matches("\n  at ").count(), 4);
  }
}
